pub mod code;
pub mod config;
pub mod deck;
pub mod error;
pub mod mirror;
pub mod protocol;
pub mod room;
pub mod telemetry;
pub mod ws;
