//! Testing utilities and mock implementations
//!
//! Lets the session core run against a scripted broker, without a
//! network connection.

pub mod mocks;

pub use mocks::*;
