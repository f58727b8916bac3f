use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::debug;

use crate::config::{PointerOptions, ResolverOptions};
use crate::error::ConfigError;
use crate::geo::BBox;
use crate::logging::POINTER_RESOLVE;
use crate::model::{BBoxResolveResult, ExtractedField, Pointer, SpanEvidence, WordRef};
use crate::orchestrator::CancellationToken;
use crate::resolver::SpanFinisher;
use crate::search_index::DocumentIndex;
use crate::text_view::{PlainTextView, PlainTextViewBuilder, WordIdFormat};

/// Words picked out by a pointer, reduced to a single page.
#[derive(Debug, Clone, PartialEq)]
struct Selection {
    page: u32,
    words: Vec<u32>,
    has_gap: bool,
    dropped_words: bool,
}

/// Resolves fields that carry a pointer (word ids or character offsets)
/// straight to the words it names, without any text matching.
#[derive(Debug, Clone)]
pub struct PointerResolver {
    options: PointerOptions,
    format: WordIdFormat,
    finisher: SpanFinisher,
}

impl PointerResolver {
    pub fn new(options: &ResolverOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            format: WordIdFormat::new(&options.pointer.word_id_format)?,
            options: options.pointer.clone(),
            finisher: SpanFinisher::new(options),
        })
    }

    /// `None` when the field has no usable pointer; the caller then falls
    /// through to text matching.
    pub fn try_resolve(
        &self,
        index: &DocumentIndex,
        field: &ExtractedField,
    ) -> Option<BBoxResolveResult> {
        self.try_resolve_with_view(index, None, field)
    }

    /// Same as [`try_resolve`](Self::try_resolve) but reuses a prebuilt text
    /// view for offset pointers.
    pub fn try_resolve_with_view(
        &self,
        index: &DocumentIndex,
        view: Option<&PlainTextView>,
        field: &ExtractedField,
    ) -> Option<BBoxResolveResult> {
        let pointer = field.pointer.as_ref()?;
        if !self.options.mode.accepts(pointer) {
            debug!(target: POINTER_RESOLVE, field = %field.key, mode = ?self.options.mode, "pointer kind not enabled");
            return None;
        }

        let refs = match pointer {
            Pointer::WordIds(ids) => self.refs_from_ids(index, ids),
            Pointer::Offsets { start, end } => match view {
                Some(view) => refs_from_offsets(view, *start, *end),
                None => refs_from_offsets(&PlainTextViewBuilder::build(index), *start, *end),
            },
        };
        let Some(refs) = refs else {
            debug!(target: POINTER_RESOLVE, field = %field.key, "pointer does not name existing words");
            return None;
        };
        let Some(selection) = self.select(&refs) else {
            debug!(
                target: POINTER_RESOLVE,
                field = %field.key,
                strict = self.options.strict,
                "pointer rejected by strictness rules"
            );
            return None;
        };

        let confidence = self.confidence_for(&selection);
        let (first, last) = (*selection.words.first()?, *selection.words.last()?);
        let hull = index.span(selection.page, first, last)?;
        let page = index.page(selection.page)?;
        let picked: Vec<_> = selection
            .words
            .iter()
            .filter_map(|&i| page.word(i))
            .collect();
        // with gaps the span covers only the named words, not the hull
        let (bbox, text) = if selection.has_gap {
            (
                BBox::union_all(picked.iter().map(|w| &w.bbox))?,
                picked
                    .iter()
                    .map(|w| w.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        } else {
            (hull.bbox, hull.text)
        };

        debug!(
            target: POINTER_RESOLVE,
            field = %field.key,
            page = selection.page,
            words = selection.words.len(),
            gap = selection.has_gap,
            dropped = selection.dropped_words,
            confidence,
            "resolved pointer"
        );
        let span = SpanEvidence {
            page: selection.page,
            word_indices: selection.words,
            bbox,
            text,
            score: confidence,
            label: None,
        };
        Some(self.finisher.fixed(index, field, confidence, span))
    }

    /// Pointer pass over a batch of fields. The text view is built once, and
    /// only when some field carries offsets.
    pub fn resolve(
        &self,
        index: &DocumentIndex,
        fields: &[&ExtractedField],
        cancel: &CancellationToken,
    ) -> Vec<Option<BBoxResolveResult>> {
        let needs_view = fields
            .iter()
            .any(|f| matches!(f.pointer, Some(Pointer::Offsets { .. })));
        let view = needs_view.then(|| PlainTextViewBuilder::build(index));

        fields
            .par_iter()
            .map(|field| {
                if cancel.is_cancelled() {
                    return None;
                }
                self.try_resolve_with_view(index, view.as_ref(), field)
            })
            .collect()
    }

    /// Every id must parse and name an existing word.
    fn refs_from_ids(&self, index: &DocumentIndex, ids: &[String]) -> Option<Vec<WordRef>> {
        if ids.is_empty() {
            return None;
        }
        ids.iter()
            .map(|id| {
                self.format
                    .parse(id)
                    .filter(|at| index.word(*at).is_some())
            })
            .collect()
    }

    fn select(&self, refs: &[WordRef]) -> Option<Selection> {
        let mut by_page: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        for at in refs {
            by_page.entry(at.page).or_default().insert(at.word);
        }
        if self.options.strict && by_page.len() != 1 {
            return None;
        }

        let page_count = by_page.len();
        // dominant page, lowest page number on ties
        let mut chosen: Option<(u32, BTreeSet<u32>)> = None;
        for (page, words) in by_page {
            if chosen.as_ref().map_or(true, |(_, best)| words.len() > best.len()) {
                chosen = Some((page, words));
            }
        }
        let (page, words) = chosen?;
        let words: Vec<u32> = words.into_iter().collect();

        let max_gap = words
            .windows(2)
            .map(|pair| pair[1] - pair[0] - 1)
            .max()
            .unwrap_or(0);
        if self.options.strict && max_gap > self.options.max_gap_between_ids {
            return None;
        }

        Some(Selection {
            page,
            words,
            has_gap: max_gap > 0,
            dropped_words: page_count > 1,
        })
    }

    fn confidence_for(&self, selection: &Selection) -> f64 {
        let (base, penalized) = if self.options.strict {
            (self.options.confidence_when_strict, selection.has_gap)
        } else {
            (
                self.options.confidence_when_relaxed,
                selection.has_gap || selection.dropped_words,
            )
        };
        let penalty = if penalized { self.options.gap_penalty } else { 0.0 };
        (base - penalty).clamp(0.0, 1.0)
    }
}

fn refs_from_offsets(view: &PlainTextView, start: usize, end: usize) -> Option<Vec<WordRef>> {
    if start >= end || end > view.char_len() {
        return None;
    }
    let refs = view.words_within(start, end);
    (!refs.is_empty()).then_some(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PointerMode;
    use crate::model::{SourcePage, SourceWord};
    use pretty_assertions::assert_eq;

    fn index() -> DocumentIndex {
        let pages = [
            SourcePage { page: 0, width: 1.0, height: 1.0 },
            SourcePage { page: 1, width: 1.0, height: 1.0 },
        ];
        let words: Vec<SourceWord> = [
            (0, "Invoice"),
            (0, "number"),
            (0, ":"),
            (0, "A-17"),
            (1, "Total"),
            (1, "99"),
        ]
        .iter()
        .enumerate()
        .map(|(i, (page, text))| SourceWord {
            page: *page,
            text: text.to_string(),
            x_norm: 0.1 * (i % 4) as f32,
            y_norm: 0.1,
            width_norm: 0.08,
            height_norm: 0.02,
            from_ocr: false,
        })
        .collect();
        DocumentIndex::build(&pages, &words)
    }

    fn ids(ids: &[&str]) -> Pointer {
        Pointer::WordIds(ids.iter().map(|s| s.to_string()).collect())
    }

    fn resolver(strict: bool) -> PointerResolver {
        let mut options = ResolverOptions::default();
        options.pointer.strict = strict;
        PointerResolver::new(&options).unwrap()
    }

    #[test]
    fn contiguous_ids_resolve_strictly() {
        let index = index();
        let field = ExtractedField::new("number", "A-17", 0.7).with_pointer(ids(&["p0_w3"]));
        let result = resolver(true).try_resolve(&index, &field).unwrap();
        assert_eq!(result.confidence, 0.98);
        assert_eq!(result.spans[0].word_indices, vec![3]);
        assert_eq!(result.spans[0].score, 0.98);
        assert_eq!(result.spans[0].label.as_ref().unwrap().text, "Invoice number :");
    }

    #[test]
    fn gap_is_penalized_and_bounded() {
        let index = index();
        let field = ExtractedField::new("k", "v", 0.5).with_pointer(ids(&["p0_w1", "p0_w3"]));
        let result = resolver(true).try_resolve(&index, &field).unwrap();
        assert!((result.confidence - 0.93).abs() < 1e-9);
        assert_eq!(result.spans[0].text, "number A-17");

        let wide = ExtractedField::new("k", "v", 0.5).with_pointer(ids(&["p0_w0", "p0_w3"]));
        assert!(resolver(true).try_resolve(&index, &wide).is_none());
    }

    #[test]
    fn cross_page_ids_need_relaxed_mode() {
        let index = index();
        let field = ExtractedField::new("k", "v", 0.5)
            .with_pointer(ids(&["p0_w3", "p1_w0", "p1_w1"]));
        assert!(resolver(true).try_resolve(&index, &field).is_none());

        let result = resolver(false).try_resolve(&index, &field).unwrap();
        assert_eq!(result.spans[0].page, 1);
        assert_eq!(result.spans[0].word_indices, vec![0, 1]);
        assert!((result.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn unknown_or_malformed_ids_decline() {
        let index = index();
        for pointer in [ids(&[]), ids(&["p0_w9"]), ids(&["word-3"])] {
            let field = ExtractedField::new("k", "v", 0.5).with_pointer(pointer);
            assert!(resolver(true).try_resolve(&index, &field).is_none());
        }
        let plain = ExtractedField::new("k", "v", 0.5);
        assert!(resolver(true).try_resolve(&index, &plain).is_none());
    }

    #[test]
    fn offsets_select_fully_covered_words() {
        let index = index();
        // "Invoice number : A-17\nTotal 99"
        let field = ExtractedField::new("k", "A-17", 0.5)
            .with_pointer(Pointer::Offsets { start: 17, end: 21 });
        let result = resolver(true).try_resolve(&index, &field).unwrap();
        assert_eq!(result.spans[0].text, "A-17");

        for (start, end) in [(5, 5), (21, 17), (0, 500)] {
            let field = ExtractedField::new("k", "v", 0.5)
                .with_pointer(Pointer::Offsets { start, end });
            assert!(resolver(true).try_resolve(&index, &field).is_none());
        }
    }

    #[test]
    fn mode_filters_pointer_kinds() {
        let index = index();
        let mut options = ResolverOptions::default();
        options.pointer.mode = PointerMode::Offsets;
        let resolver = PointerResolver::new(&options).unwrap();
        let field = ExtractedField::new("k", "v", 0.5).with_pointer(ids(&["p0_w3"]));
        assert!(resolver.try_resolve(&index, &field).is_none());
    }
}
