//! Error types for the essentia grid.
//!
//! Transfers and reads never fail: they report through sentinel amounts.
//! These errors only surface from the tick's inner call and from
//! configuration loading.

/// Errors raised while bringing the cache in line with the backing store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// The backing store could not produce a storage listing
    #[error("Backing store listing unavailable")]
    StoreUnavailable,

    /// A collaborator panicked while the cache was being refreshed
    #[error("Collaborator panicked: {0}")]
    CollaboratorPanic(String),
}

/// Errors from loading or validating a [`GridConfig`](crate::GridConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
