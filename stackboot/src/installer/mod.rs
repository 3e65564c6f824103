//! Host preparation and the installation sequence

pub mod fsm;
pub mod host;
pub mod prereqs;
pub mod repository;
pub mod runtime;
