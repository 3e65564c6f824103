//! HTTP plumbing

pub mod client;
