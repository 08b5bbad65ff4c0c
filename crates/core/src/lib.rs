//! Core messaging logic: message store, live connection registry,
//! delivery dispatcher and the ingest pipeline tying them together.

pub mod services;

pub use services::*;
