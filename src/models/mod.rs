// src/models/mod.rs
pub mod compliance;
pub mod driver;
pub mod outcome;
pub mod payment;
pub mod review;
pub mod ride;
pub mod user;

pub use compliance::*;
pub use driver::*;
pub use outcome::*;
pub use payment::*;
pub use review::*;
pub use ride::*;
pub use user::*;
