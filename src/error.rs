//! Error types.
//!
//! Only construction and configuration can fail. A field without a bounding
//! box is a normal result, not an error.

use crate::config::ResolverStrategy;
use thiserror::Error;

/// Invalid resolver configuration, reported when options are parsed,
/// validated or turned into a resolver.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("edit distance threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("max candidates per field must be greater than zero")]
    ZeroMaxCandidates,
    #[error("unknown distance algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("unknown resolver strategy `{0}`")]
    UnknownStrategy(String),
    #[error("resolver strategy order is empty")]
    EmptyStrategyOrder,
    #[error("resolver strategy `{0}` is listed more than once")]
    DuplicateStrategy(ResolverStrategy),
    #[error("resolver strategy `{strategy}` can never run because `legacy` resolves every remaining field")]
    UnreachableStrategy { strategy: ResolverStrategy },
    #[error("invalid word id format `{template}`: {reason}")]
    InvalidWordIdFormat { template: String, reason: String },
    #[error("confidence setting `{name}` must be within [0, 1], got {value}")]
    InvalidConfidence { name: &'static str, value: f64 },
    #[error("failed to build resolver thread pool: {0}")]
    ThreadPool(String),
    #[error("failed to parse resolver options: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a whole resolution pass.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("resolver task failed: {0}")]
    TaskFailed(String),
}
