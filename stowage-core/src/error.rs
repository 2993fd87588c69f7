//! Error types for the stowage core library.

use thiserror::Error;

use crate::types::ItemTypeId;

/// Top-level error type for all stowage operations.
///
/// Containment rejections are deliberately *not* part of this enum: refusing
/// an item is a classified result ([`crate::pocket::Rejection`]), not a fault.
#[derive(Error, Debug)]
pub enum StowageError {
    /// Malformed static template or pocket-set configuration. Fatal only to
    /// loading that one definition.
    #[error("Configuration error: {reason}")]
    Config {
        /// What was wrong with the definition.
        reason: String,
    },

    /// Persisted state is inconsistent with the current definitions.
    /// Surfaced as a localized load failure for the affected item.
    #[error("Data integrity error: {reason}")]
    DataIntegrity {
        /// What the saved record disagreed about.
        reason: String,
    },

    /// A persisted record references an item type that no longer exists and
    /// the migration map offered no substitute.
    #[error("Unknown item type: {0}")]
    UnknownItemType(ItemTypeId),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite save-store error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StowageError {
    /// Shorthand for a [`StowageError::Config`] with a formatted reason.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`StowageError::DataIntegrity`] with a formatted reason.
    #[must_use]
    pub fn integrity(reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            reason: reason.into(),
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, StowageError>;
