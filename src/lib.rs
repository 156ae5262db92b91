//! imgrelay - image generation relay
//!
//! A caching proxy in front of a text-to-image task API. Prompts are served
//! from a content-addressed disk cache when possible; otherwise images are
//! generated remotely, stored, and served back over HTTP. An expired session
//! token is renewed once per request by logging in through a headless browser.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod server;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, RelayError, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
