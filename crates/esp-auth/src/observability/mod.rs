//! Observability for ESP auth.
//!
//! Logging goes through `tracing` with `esp_auth.*` targets; subscribers are
//! installed by the embedding binary. Metrics use the `metrics` facade.

pub mod metrics;
