// Library surface for the CLI and headless/integration tests.
// Terminal drawing stays in the binary.
pub mod app_dirs;
pub mod config;
pub mod controller;
pub mod deck;
pub mod error;
pub mod identity;
pub mod navigator;
pub mod pdf;
pub mod runtime;
pub mod store;
pub mod time_format;
pub mod timing;
pub mod warning;

pub use error::{Error, Result};
