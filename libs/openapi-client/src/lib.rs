//! Wire models shared with the application service

pub mod models;
