//! overspill - streaming surface controller
//!
//! Consumes an NDJSON stream of generated text, renders it into a fixed
//! container and restarts the stream whenever the container fills up or
//! the user asks for new parameters.

pub mod buffer;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod ndjson;
pub mod overflow;
pub mod params;
pub mod printer;
pub mod session;
pub mod traces;
pub mod ui;
