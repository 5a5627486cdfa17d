// src/utils/mod.rs
pub mod geo;
pub mod id_generator;
pub mod phone;
