//! Request handlers.

pub mod health;
pub mod well_known;
