//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! that stops the engine from starting.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: multiverse_core::config::ConfigError,
    },

    /// The tick driver could not be built.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: multiverse_core::runner::RunnerError,
    },

    /// The HTTP server failed to start.
    #[error("server error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: multiverse_observer::StartupError,
    },
}
