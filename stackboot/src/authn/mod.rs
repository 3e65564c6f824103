//! Credential bootstrap against the application service

pub mod bootstrap;
pub mod handshake;
