//! Testing utilities and mock implementations
//!
//! This module provides mock collaborators for testing the adapter without a
//! broker, a network interface or persistent storage.

pub mod mocks;

pub use mocks::*;
