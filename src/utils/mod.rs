/// Tracing subscriber setup.
pub mod logging;
/// Retry helpers for transient failures.
pub mod retry;
/// TOML configuration with hot reload.
pub mod toml_config;
