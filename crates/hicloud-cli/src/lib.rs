//! # hicloud-cli
//!
//! The `hicloud` binary: configuration, the per-resource command handlers and
//! the startup wiring that plugs them into the console engine.

pub mod app;
pub mod config;
pub mod handlers;

pub use app::{App, Startup};
