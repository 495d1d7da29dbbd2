//! Core library for agent runs
//!
//! This crate contains the persisted side of a conversational turn:
//! - Messages and their reserved extension keys
//! - Run records, usage and run status
//! - Wire items streamed to clients
//! - Store traits plus a JSON file backed implementation

pub mod error;
pub mod message;
pub mod run;
mod clock;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
