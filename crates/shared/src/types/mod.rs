//! Common types used across the application.

pub mod amount;
pub mod rut;

pub use amount::{round_peso, to_peso_string};
pub use rut::Rut;
