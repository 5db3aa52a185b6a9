//! The `utils` module provides a collection of utility functions and common
//! definitions used across `switchyard`.
//!
//! It centralizes the error types, logging bootstrap and the clock helpers
//! every component uses for expiry arithmetic.

pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, JoynrException, Result};
