//! Command line application

pub mod options;
pub mod prompt;
pub mod report;
pub mod run;
