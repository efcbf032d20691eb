//! Configuration and output for the `mcdaq` command-line tool

pub mod config;
pub mod output;
