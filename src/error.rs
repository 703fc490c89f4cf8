//! Crate-level error types.
//!
//! [`GridError`] unifies every error source the crate actually produces
//! (configuration, adapter transport, market lookup) behind a single enum
//! so callers can match on the variant they care about while still using
//! the `?` operator for easy propagation. The pure numeric core (lattice,
//! position algebra, grid construction) never returns `Err` — see the
//! module docs on [`crate::grid`] for why.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GridError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// A configuration file could not be found, read, or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A configuration value deserialized fine but violates a semantic
    /// invariant the core requires (e.g. `secondary_allocation >= 1.0`).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested symbol is missing, inactive, non-linear, or not a
    /// swap market. The caller excludes it from the approved set and
    /// continues; this variant exists so callers that want to treat it as
    /// fatal still can.
    #[error("market unavailable: {symbol}")]
    MarketUnavailable { symbol: String },

    /// A transient failure from the exchange adapter (network, rate
    /// limit, deserialization). The live driver retries indefinitely and
    /// treats the associated fetch as "no update this cycle."
    #[error("adapter error: {0}")]
    Adapter(#[source] anyhow::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure reading a config or tick-data file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
