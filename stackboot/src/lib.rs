//! stackboot library
//!
//! Brings up a containerised application stack on a single Linux host and
//! issues the first client access key against it.

pub mod app;
pub mod authn;
pub mod config;
pub mod errors;
pub mod filesys;
pub mod health;
pub mod http;
pub mod installer;
pub mod logs;
pub mod secrets;
pub mod storage;
pub mod topology;
pub mod utils;
