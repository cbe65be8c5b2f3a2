//! Configuration and demo collaborators for driving an `ExchangeController`
//! from the command line.

pub mod config;
pub mod sink;
pub mod source;
