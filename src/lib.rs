pub mod config;
pub mod distance;
pub mod error;
pub mod geo;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod pointer;
pub mod resolver;
pub mod search_index;
pub mod text_view;

pub use config::{
    ConfidenceOptions, DistanceAlgorithm, LabelOptions, PointerMode, PointerOptions,
    ResolverOptions, ResolverStrategy, StrategyOrder,
};
pub use error::{ConfigError, ResolveError};
pub use geo::BBox;
pub use model::{
    BBoxResolveResult, ExtractedField, LabelEvidence, Pointer, SourcePage, SourceWord,
    SpanEvidence, WordRef,
};
pub use orchestrator::{CancellationToken, ResolverOrchestrator};
pub use search_index::{DocumentIndex, DocumentIndexBuilder};
pub use text_view::{PlainTextView, PlainTextViewBuilder, WordIdFormat, WordIdMap, WordIdMapBuilder};

use logging::ORCHESTRATOR;
use tracing::event;

/// Locate every extracted field on the document in one pass.
///
/// # Arguments
/// * `pages` - Page dimensions from the conversion pipeline
/// * `words` - Words in reading order, with normalized coordinates
/// * `fields` - Values produced by the extraction step
/// * `options` - Resolver configuration, validated before anything runs
///
/// # Returns
/// One result per field, sorted by field name. Fields that could not be
/// placed carry their original confidence and no spans.
pub fn resolve_fields(
    pages: &[SourcePage],
    words: &[SourceWord],
    fields: &[ExtractedField],
    options: ResolverOptions,
) -> Result<Vec<BBoxResolveResult>, ResolveError> {
    let orchestrator = ResolverOrchestrator::new(options)?;
    let index = DocumentIndex::build(pages, words);
    event!(
        target: ORCHESTRATOR,
        tracing::Level::DEBUG,
        pages = index.pages().len(),
        words = index.word_count(),
        fields = fields.len(),
        "resolving fields"
    );
    Ok(orchestrator.resolve(&index, fields))
}

/// Same as [`resolve_fields`], returning the results as pretty-printed JSON.
pub fn resolve_to_json(
    pages: &[SourcePage],
    words: &[SourceWord],
    fields: &[ExtractedField],
    options: ResolverOptions,
) -> anyhow::Result<String> {
    let results = resolve_fields(pages, words, fields, options)?;
    let json = serde_json::to_string_pretty(&results)?;
    Ok(json)
}
