//! Error types for `rfp-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unrecognised evidence payload: {0}")]
  UnrecognisedEvidence(String),

  #[error("invalid pattern for rule {category:?}: {source}")]
  InvalidPattern {
    category: String,
    #[source]
    source:   regex::Error,
  },

  #[error("invalid rule {category:?}: {reason}")]
  InvalidRule { category: String, reason: String },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
