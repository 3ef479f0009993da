//! Common utilities and types shared across the ESP auth crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (structural checks, claims, validity window)
pub mod jwt;
