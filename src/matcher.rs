use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use ordered_float::OrderedFloat;
use tracing::trace;

use crate::config::DistanceAlgorithm;
use crate::distance::similarity;
use crate::logging::CANDIDATES;
use crate::model::{SpanEvidence, Word, WordRef, WordSpan};
use crate::normalize::{normalize, tokenize_normalized, trigrams};
use crate::search_index::DocumentIndex;

/// Tolerance on the threshold comparison so that a similarity sitting exactly
/// on `1 - threshold` is not lost to rounding.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Retrieves candidate word windows for a query through the trigram index.
#[derive(Debug, Clone, Copy)]
pub struct CandidateFinder<'a> {
    index: &'a DocumentIndex,
}

impl<'a> CandidateFinder<'a> {
    pub fn new(index: &'a DocumentIndex) -> Self {
        Self { index }
    }

    /// At most `max_candidates` windows, best first.
    ///
    /// Every word sharing a trigram with the normalized query seeds a window
    /// of `tokens + 2` words starting one word before the seed. Windows are
    /// ranked by how many distinct query trigrams their words carry, then by
    /// how close their best-fitting run of words comes to the query's length,
    /// then by longer text, then by position.
    pub fn find(&self, query: &str, max_candidates: usize) -> Vec<WordSpan> {
        let normalized = normalize(query);
        let grams: BTreeSet<String> = trigrams(&normalized).into_iter().collect();
        if grams.is_empty() || max_candidates == 0 {
            return Vec::new();
        }
        let query_len = normalized.chars().count();
        let token_count = tokenize_normalized(&normalized).len();
        let window_len = token_count as u32 + 2;

        // query trigrams carried by each seed word, as slots into `grams`
        let mut seeds: BTreeMap<WordRef, Vec<usize>> = BTreeMap::new();
        for (slot, gram) in grams.iter().enumerate() {
            for &at in self.index.trigram_postings(gram) {
                seeds.entry(at).or_default().push(slot);
            }
        }

        let mut windows: BTreeSet<(u32, u32, u32)> = BTreeSet::new();
        for seed in seeds.keys() {
            let Some(page) = self.index.page(seed.page) else {
                continue;
            };
            let last = page.len().saturating_sub(1) as u32;
            let start = seed.word.saturating_sub(1);
            let end = (start + window_len - 1).min(last);
            windows.insert((seed.page, start, end));
        }

        let mut ranked: Vec<(WindowRank, WordSpan)> = windows
            .into_iter()
            .filter_map(|(page, start, end)| {
                let span = self.index.span(page, start, end)?;
                let words = self.index.page(page)?.words.get(start as usize..=end as usize)?;
                let covered: BTreeSet<usize> = (start..=end)
                    .filter_map(|word| seeds.get(&WordRef::new(page, word)))
                    .flatten()
                    .copied()
                    .collect();
                let rank = (
                    Reverse(covered.len()),
                    closest_run_gap(&normalized_lens(words), query_len),
                    Reverse(span.text.chars().count()),
                    page,
                    start,
                );
                Some((rank, span))
            })
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.truncate(max_candidates);

        trace!(
            target: CANDIDATES,
            query = %normalized,
            seeds = seeds.len(),
            candidates = ranked.len(),
            "collected candidate windows"
        );
        ranked.into_iter().map(|(_, span)| span).collect()
    }
}

/// Distinct trigram hits, length gap, text length, page, start word.
type WindowRank = (Reverse<usize>, usize, Reverse<usize>, u32, u32);

fn normalized_lens(words: &[Word]) -> Vec<usize> {
    words.iter().map(|w| w.normalized_text.chars().count()).collect()
}

/// Char length of the non-empty texts joined by single spaces.
fn joined_len(lens: &[usize]) -> usize {
    let (chars, parts) = lens
        .iter()
        .filter(|&&len| len > 0)
        .fold((0usize, 0usize), |(chars, parts), &len| (chars + len, parts + 1));
    chars + parts.saturating_sub(1)
}

fn joined_text(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.normalized_text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// Smallest length difference between `target` and any contiguous run.
fn closest_run_gap(lens: &[usize], target: usize) -> usize {
    (0..lens.len())
        .flat_map(|from| {
            (from + 1..=lens.len()).map(move |to| joined_len(&lens[from..to]).abs_diff(target))
        })
        .min()
        .unwrap_or(usize::MAX)
}

/// Scores candidate windows by edit-distance similarity and keeps the best
/// one that clears the threshold.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRefiner {
    algorithm: DistanceAlgorithm,
    threshold: f64,
}

impl CandidateRefiner {
    pub fn new(algorithm: DistanceAlgorithm, threshold: f64) -> Self {
        Self {
            algorithm,
            threshold,
        }
    }

    /// `1 - distance / max(len)` over normalized text; 1.0 for two empty
    /// strings.
    pub fn similarity(&self, value: &str, candidate: &str) -> f64 {
        similarity(self.algorithm, &normalize(value), &normalize(candidate))
    }

    pub fn accepts(&self, similarity: f64) -> bool {
        1.0 - similarity <= self.threshold + THRESHOLD_EPSILON
    }

    /// Best accepted span over all candidates, or `None`.
    ///
    /// Each window is scored by its best contiguous sub-run (shortest runs
    /// first, then left to right), so slack words around a hit do not dilute
    /// its score. A run is compared as the normalized texts of its words
    /// joined by single spaces. Ties keep the first span seen.
    pub fn refine(
        &self,
        index: &DocumentIndex,
        value: &str,
        candidates: &[WordSpan],
    ) -> Option<SpanEvidence> {
        let value_norm = normalize(value);
        let value_len = value_norm.chars().count();
        // score, page, first word, last word
        let mut best: Option<(OrderedFloat<f64>, u32, u32, u32)> = None;

        'windows: for window in candidates {
            let Some(words) = index
                .page(window.page)
                .and_then(|p| p.words.get(window.start as usize..=window.end as usize))
            else {
                continue;
            };
            let lens = normalized_lens(words);

            for run_len in 1..=words.len() {
                for offset in 0..=(words.len() - run_len) {
                    let run = offset..offset + run_len;
                    if !self.may_accept(value_len, joined_len(&lens[run.clone()])) {
                        continue;
                    }
                    let run_norm = joined_text(&words[run]);
                    let sim = OrderedFloat(similarity(
                        self.algorithm,
                        &value_norm,
                        &run_norm,
                    ));
                    if !self.accepts(sim.0) {
                        continue;
                    }
                    if best.map_or(true, |(b, ..)| sim > b) {
                        let start = window.start + offset as u32;
                        best = Some((sim, window.page, start, start + run_len as u32 - 1));
                        if sim.0 >= 1.0 {
                            break 'windows;
                        }
                    }
                }
            }
        }

        let (score, page, start, end) = best?;
        let span = index.span(page, start, end)?;
        trace!(
            target: CANDIDATES,
            value = %value_norm,
            page,
            start,
            end,
            score = score.0,
            "refined candidate"
        );
        Some(SpanEvidence {
            page: span.page,
            word_indices: span.word_indices(),
            bbox: span.bbox,
            text: span.text,
            score: score.0,
            label: None,
        })
    }

    // Distance is at least the length difference, so skip runs that cannot
    // reach the threshold.
    fn may_accept(&self, a_len: usize, b_len: usize) -> bool {
        let max_len = a_len.max(b_len);
        if max_len == 0 {
            return true;
        }
        let best_possible = 1.0 - a_len.abs_diff(b_len) as f64 / max_len as f64;
        self.accepts(best_possible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourcePage, SourceWord};
    use pretty_assertions::assert_eq;

    fn index_of(texts: &[&str]) -> DocumentIndex {
        let words: Vec<SourceWord> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| SourceWord {
                page: 0,
                text: t.to_string(),
                x_norm: 0.05 + i as f32 * 0.1,
                y_norm: 0.2,
                width_norm: 0.08,
                height_norm: 0.02,
                from_ocr: false,
            })
            .collect();
        DocumentIndex::build(&[SourcePage { page: 0, width: 1.0, height: 1.0 }], &words)
    }

    #[test]
    fn finder_returns_nothing_for_empty_query() {
        let index = index_of(&["total", "amount"]);
        assert!(CandidateFinder::new(&index).find("", 10).is_empty());
        assert!(CandidateFinder::new(&index).find("   ", 10).is_empty());
    }

    #[test]
    fn finder_orders_by_length_and_caps() {
        let index = index_of(&["a", "total", "amount", "due", "now", "total", "x"]);
        let found = CandidateFinder::new(&index).find("total", 10);
        assert_eq!(found.len(), 2);
        assert!(found[0].text.len() >= found[1].text.len());
        assert_eq!(found[0].text, "a total amount");

        let capped = CandidateFinder::new(&index).find("total", 1);
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn refiner_picks_exact_sub_run_inside_window() {
        let index = index_of(&["total", "amount", ":", "1234.56"]);
        let candidates = CandidateFinder::new(&index).find("1.234,56", 16);
        assert!(!candidates.is_empty());

        let refiner = CandidateRefiner::new(DistanceAlgorithm::BitParallelMyers, 0.25);
        let span = refiner.refine(&index, "1.234,56", &candidates).unwrap();
        assert_eq!(span.word_indices, vec![3]);
        assert_eq!(span.score, 1.0);
        assert_eq!(span.text, "1234.56");
    }

    #[test]
    fn finder_ranks_trigram_coverage_before_length() {
        let index = index_of(&["capitalization", "x", "y", "z", "total", "amount"]);
        let found = CandidateFinder::new(&index).find("total amount", 10);
        assert_eq!(found.last().unwrap().text, "capitalization x y z");

        // the long window sharing only "tal" must not survive the cap
        let capped = CandidateFinder::new(&index).find("total amount", 1);
        assert_eq!(capped.len(), 1);
        assert!(capped[0].text.ends_with("total amount"));
    }

    #[test]
    fn finder_breaks_coverage_ties_by_closest_run_length() {
        let mut texts = vec!["capitalization"; 5];
        texts.push("T0tal");
        let index = index_of(&texts);
        let found = CandidateFinder::new(&index).find("Total", 1);
        assert_eq!(found.len(), 1);
        assert!(found[0].text.ends_with("T0tal"));
    }

    #[test]
    fn refiner_threshold_boundary() {
        let refiner = CandidateRefiner::new(DistanceAlgorithm::Levenshtein, 0.25);
        // one edit in four chars sits exactly on the boundary
        let at_boundary = refiner.similarity("abcd", "abcx");
        assert_eq!(at_boundary, 0.75);
        assert!(refiner.accepts(at_boundary));
        // two edits in seven chars is just below it
        let below = refiner.similarity("abcdefg", "abcdexy");
        assert!(below < 0.75);
        assert!(!refiner.accepts(below));
    }

    #[test]
    fn refine_accepts_span_on_the_threshold() {
        let index = index_of(&["abcx"]);
        let candidates = CandidateFinder::new(&index).find("abcd", 8);
        let refiner = CandidateRefiner::new(DistanceAlgorithm::Levenshtein, 0.25);
        let span = refiner.refine(&index, "abcd", &candidates).unwrap();
        assert_eq!(span.word_indices, vec![0]);
        assert_eq!(span.score, 0.75);
    }

    #[test]
    fn refine_rejects_span_just_below_the_threshold() {
        let index = index_of(&["abcdexy"]);
        let candidates = CandidateFinder::new(&index).find("abcdefg", 8);
        assert!(!candidates.is_empty());
        for algorithm in [DistanceAlgorithm::Levenshtein, DistanceAlgorithm::BitParallelMyers] {
            let refiner = CandidateRefiner::new(algorithm, 0.25);
            assert!(refiner.refine(&index, "abcdefg", &candidates).is_none());
        }
    }

    #[test]
    fn refiner_measures_runs_by_normalized_length() {
        // "Acme S.p.A." is 11 chars raw but "acme spa" once normalized
        let index = index_of(&["Acme", "S.p.A.", "Milano"]);
        let candidates = CandidateFinder::new(&index).find("acme spa", 8);
        let refiner = CandidateRefiner::new(DistanceAlgorithm::Levenshtein, 0.25);
        let span = refiner.refine(&index, "acme spa", &candidates).unwrap();
        assert_eq!(span.word_indices, vec![0, 1]);
        assert_eq!(span.score, 1.0);

        let index = index_of(&["Total", "1.234,56", "EUR"]);
        let candidates = CandidateFinder::new(&index).find("total 1234.56", 8);
        let span = refiner.refine(&index, "total 1234.56", &candidates).unwrap();
        assert_eq!(span.word_indices, vec![0, 1]);
        assert_eq!(span.score, 1.0);
    }

    #[test]
    fn refiner_returns_none_when_nothing_survives() {
        let index = index_of(&["invoice", "number"]);
        let candidates = CandidateFinder::new(&index).find("invoice", 8);
        let refiner = CandidateRefiner::new(DistanceAlgorithm::Levenshtein, 0.0);
        assert!(refiner.refine(&index, "invoize", &candidates).is_none());
    }
}
