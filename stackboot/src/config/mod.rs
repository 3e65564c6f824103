//! Environment file configuration

pub mod env;
pub mod resolve;
