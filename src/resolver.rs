//! Text-matching resolution strategies.
//!
//! All of them fan out over fields with rayon; a field only ever reads the
//! shared [`DocumentIndex`], and results come back in input order.

use rayon::prelude::*;
use tracing::debug;

use crate::config::{ConfidenceOptions, LabelOptions, ResolverOptions};
use crate::error::ConfigError;
use crate::geo::BBox;
use crate::logging::STRATEGY;
use crate::matcher::{CandidateFinder, CandidateRefiner};
use crate::model::{BBoxResolveResult, ExtractedField, LabelEvidence, Page, SpanEvidence};
use crate::normalize::{normalize, tokenize_normalized};
use crate::orchestrator::CancellationToken;
use crate::search_index::DocumentIndex;

/// Trigram retrieval followed by edit-distance refinement.
#[derive(Debug, Clone, Copy)]
struct FuzzyMatch {
    refiner: CandidateRefiner,
    max_candidates: usize,
}

impl FuzzyMatch {
    fn new(options: &ResolverOptions) -> Self {
        Self {
            refiner: CandidateRefiner::new(
                options.distance_algorithm,
                options.edit_distance_threshold,
            ),
            max_candidates: options.max_candidates,
        }
    }

    fn find(&self, index: &DocumentIndex, value: &str) -> Option<SpanEvidence> {
        let candidates = CandidateFinder::new(index).find(value, self.max_candidates);
        self.refiner.refine(index, value, &candidates)
    }
}

/// Blends the span score into the field confidence and attaches label
/// evidence. Shared by every strategy that produces a span.
#[derive(Debug, Clone)]
pub(crate) struct SpanFinisher {
    confidence: ConfidenceOptions,
    label: LabelOptions,
}

impl SpanFinisher {
    pub(crate) fn new(options: &ResolverOptions) -> Self {
        Self {
            confidence: options.confidence.clone(),
            label: options.label.clone(),
        }
    }

    fn blended(
        &self,
        index: &DocumentIndex,
        field: &ExtractedField,
        span: SpanEvidence,
    ) -> BBoxResolveResult {
        let confidence = self
            .confidence
            .blend(span.score, field.confidence)
            .clamp(0.0, 1.0);
        self.fixed(index, field, confidence, span)
    }

    pub(crate) fn fixed(
        &self,
        index: &DocumentIndex,
        field: &ExtractedField,
        confidence: f64,
        mut span: SpanEvidence,
    ) -> BBoxResolveResult {
        if self.label.enabled {
            span.label = label_evidence(index, &span, self.label.max_words);
        }
        BBoxResolveResult::resolved(field, confidence, span)
    }
}

/// Words printed right before a span that end in a colon, e.g. the
/// "Total amount :" in front of a total. At most `max_words` words.
pub fn label_evidence(
    index: &DocumentIndex,
    span: &SpanEvidence,
    max_words: usize,
) -> Option<LabelEvidence> {
    let first = *span.word_indices.first()?;
    if first == 0 || max_words == 0 {
        return None;
    }
    let page = index.page(span.page)?;
    let closest = page.word(first - 1)?;
    if !closest.text.trim_end().ends_with(':') {
        return None;
    }

    let start = first.saturating_sub(max_words as u32);
    let words = &page.words[start as usize..first as usize];
    Some(LabelEvidence {
        text: words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        word_indices: (start..first).collect(),
        bbox: BBox::union_all(words.iter().map(|w| &w.bbox))?,
    })
}

/// Default single-pass resolver: fuzzy matching for every field, one result
/// per field whether or not a span was found.
#[derive(Debug, Clone)]
pub struct BBoxResolver {
    fuzzy: FuzzyMatch,
    finisher: SpanFinisher,
}

impl BBoxResolver {
    pub fn new(options: &ResolverOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            fuzzy: FuzzyMatch::new(options),
            finisher: SpanFinisher::new(options),
        })
    }

    pub fn resolve_field(
        &self,
        index: &DocumentIndex,
        field: &ExtractedField,
    ) -> Option<BBoxResolveResult> {
        let span = self.fuzzy.find(index, &field.value)?;
        Some(self.finisher.blended(index, field, span))
    }

    pub fn resolve(
        &self,
        index: &DocumentIndex,
        fields: &[ExtractedField],
        cancel: &CancellationToken,
    ) -> Vec<BBoxResolveResult> {
        fields
            .par_iter()
            .map(|field| {
                if cancel.is_cancelled() {
                    return BBoxResolveResult::unresolved(field);
                }
                self.resolve_field(index, field)
                    .unwrap_or_else(|| BBoxResolveResult::unresolved(field))
            })
            .collect()
    }
}

/// Terminal orchestrator stage: every field it starts is reported as
/// handled, resolved or not. Only fields skipped by cancellation come back
/// as `None`.
#[derive(Debug, Clone)]
pub struct LegacyBBoxResolver {
    inner: BBoxResolver,
}

impl LegacyBBoxResolver {
    pub fn new(options: &ResolverOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: BBoxResolver::new(options)?,
        })
    }

    pub fn resolve(
        &self,
        index: &DocumentIndex,
        fields: &[&ExtractedField],
        cancel: &CancellationToken,
    ) -> Vec<Option<BBoxResolveResult>> {
        fields
            .par_iter()
            .map(|field| {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = self
                    .inner
                    .resolve_field(index, field)
                    .unwrap_or_else(|| BBoxResolveResult::unresolved(field));
                debug!(
                    target: STRATEGY,
                    strategy = "legacy",
                    field = %field.key,
                    resolved = result.is_resolved(),
                    confidence = result.confidence,
                    "legacy resolution finished"
                );
                Some(result)
            })
            .collect()
    }
}

/// Exact token run first, fuzzy matching second. Fields neither pass can
/// place come back as `None` so a later strategy may try them.
#[derive(Debug, Clone)]
pub struct TokenFirstBBoxResolver {
    fuzzy: FuzzyMatch,
    finisher: SpanFinisher,
    exact_score: f64,
}

impl TokenFirstBBoxResolver {
    pub fn new(options: &ResolverOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            fuzzy: FuzzyMatch::new(options),
            finisher: SpanFinisher::new(options),
            exact_score: options.confidence.exact_match_score,
        })
    }

    pub fn resolve(
        &self,
        index: &DocumentIndex,
        fields: &[&ExtractedField],
        cancel: &CancellationToken,
    ) -> Vec<Option<BBoxResolveResult>> {
        fields
            .par_iter()
            .map(|field| {
                if cancel.is_cancelled() {
                    return None;
                }
                self.resolve_field(index, field)
            })
            .collect()
    }

    pub fn resolve_field(
        &self,
        index: &DocumentIndex,
        field: &ExtractedField,
    ) -> Option<BBoxResolveResult> {
        let (span, exact) = match self.exact_span(index, &field.value) {
            Some(span) => (span, true),
            None => (self.fuzzy.find(index, &field.value)?, false),
        };
        debug!(
            target: STRATEGY,
            strategy = "token_first",
            field = %field.key,
            exact,
            page = span.page,
            score = span.score,
            "resolved field"
        );
        Some(self.finisher.blended(index, field, span))
    }

    /// First run of words, in document order, whose tokens spell out the
    /// value's tokens exactly.
    pub fn exact_span(&self, index: &DocumentIndex, value: &str) -> Option<SpanEvidence> {
        let tokens = tokenize_normalized(&normalize(value));
        let first = tokens.first()?;

        for &at in index.token_postings(first) {
            let Some(page) = index.page(at.page) else {
                continue;
            };
            let Some(start_word) = page.word(at.word) else {
                continue;
            };
            // a single-token start word must be followed by the second token
            if start_word.tokens.len() == 1
                && tokens.len() >= 2
                && !index.has_bigram_at(first, &tokens[1], at)
            {
                continue;
            }
            if let Some(end) = match_token_run(page, at.word, &tokens) {
                let span = index.span(at.page, at.word, end)?;
                return Some(SpanEvidence {
                    page: span.page,
                    word_indices: span.word_indices(),
                    bbox: span.bbox,
                    text: span.text,
                    score: self.exact_score,
                    label: None,
                });
            }
        }
        None
    }
}

/// Consumes `tokens` word by word from `start`; each token-bearing word must
/// match its whole token list. Tokenless words between them are absorbed.
/// Returns the index of the word that completes the run.
fn match_token_run(page: &Page, start: u32, tokens: &[String]) -> Option<u32> {
    let mut consumed = 0;
    let mut idx = start;
    loop {
        let word = page.word(idx)?;
        if word.has_tokens() {
            let n = word.tokens.len();
            let expected = tokens.get(consumed..consumed + n)?;
            if word.tokens.iter().zip(expected).any(|(a, b)| a != b) {
                return None;
            }
            consumed += n;
            if consumed == tokens.len() {
                return Some(idx);
            }
        } else if idx == start {
            return None;
        }
        idx += 1;
    }
}
