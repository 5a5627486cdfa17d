// src/utils/geo.rs
//! Distance and fare arithmetic shared by ride requests, driver search and
//! the compliance engine.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const BASE_FARE_KES: f64 = 50.0;
pub const PER_KM_RATE_KES: f64 = 25.0;
pub const PER_MINUTE_RATE_KES: f64 = 2.0;
pub const MINUTES_PER_KM: f64 = 3.0;
pub const RUSH_HOUR_MULTIPLIER: f64 = 1.5;
pub const MINIMUM_FARE_KES: f64 = 100.0;

/// Nairobi is UTC+3 all year round.
const NAIROBI_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// Great-circle distance in kilometres between two WGS84 points.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

pub fn estimate_fare(distance_km: f64) -> f64 {
    BASE_FARE_KES + PER_KM_RATE_KES * distance_km
}

/// Crude linear estimate of three minutes per kilometre; not traffic aware.
pub fn estimate_duration_minutes(distance_km: f64) -> i64 {
    (distance_km * MINUTES_PER_KM).round() as i64
}

/// Time-and-distance fare with rush-hour surge, floored at [`MINIMUM_FARE_KES`].
pub fn calculate_fare_with_time(distance_km: f64, duration_minutes: i64, is_rush_hour: bool) -> f64 {
    let mut fare = BASE_FARE_KES
        + distance_km * PER_KM_RATE_KES
        + duration_minutes as f64 * PER_MINUTE_RATE_KES;

    if is_rush_hour {
        fare *= RUSH_HOUR_MULTIPLIER;
    }

    fare.max(MINIMUM_FARE_KES)
}

/// Morning (07–09h) and evening (17–19h) peaks, Nairobi local time.
pub fn is_rush_hour(at: DateTime<Utc>) -> bool {
    let hour = to_nairobi_time(at).hour();
    (7..=9).contains(&hour) || (17..=19).contains(&hour)
}

pub fn to_nairobi_time(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    // A constant 3h offset is always in range.
    let offset = FixedOffset::east_opt(NAIROBI_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    at.with_timezone(&offset)
}
