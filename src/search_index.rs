use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use crate::geo::BBox;
use crate::logging::INDEX_BUILD;
use crate::model::{Page, SourcePage, SourceWord, Word, WordRef, WordSpan};
use crate::normalize::{normalize, tokenize_normalized, trigrams};

/// Separates the two tokens of a bigram key.
pub const BIGRAM_SEPARATOR: char = '\u{1F}';

pub fn bigram_key(prev: &str, next: &str) -> String {
    let mut key = String::with_capacity(prev.len() + next.len() + 1);
    key.push_str(prev);
    key.push(BIGRAM_SEPARATOR);
    key.push_str(next);
    key
}

/// Immutable per-document index: pages of words plus three inverted maps.
///
/// Words are addressed by `(page, word)` pairs. Nothing is mutated after
/// [`DocumentIndexBuilder::build`], so a shared reference can be read from any
/// number of worker threads.
#[derive(Debug, Default)]
pub struct DocumentIndex {
    pages: Vec<Page>,
    trigram_index: HashMap<String, Vec<WordRef>>,
    token_index: HashMap<String, Vec<WordRef>>,
    bigram_index: HashMap<String, Vec<WordRef>>,
    word_count: usize,
}

impl DocumentIndex {
    /// Shorthand for building from the conversion pipeline's output.
    pub fn build(pages: &[SourcePage], words: &[SourceWord]) -> Self {
        DocumentIndexBuilder::from_source(pages, words).build()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, page: u32) -> Option<&Page> {
        self.pages
            .binary_search_by_key(&page, |p| p.page_index)
            .ok()
            .map(|slot| &self.pages[slot])
    }

    pub fn word(&self, at: WordRef) -> Option<&Word> {
        self.page(at.page).and_then(|p| p.word(at.word))
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// All words in document order.
    pub fn words(&self) -> impl Iterator<Item = &Word> {
        self.pages.iter().flat_map(|p| p.words.iter())
    }

    pub fn trigram_postings(&self, trigram: &str) -> &[WordRef] {
        self.trigram_index.get(trigram).map_or(&[], Vec::as_slice)
    }

    /// Words whose first token is `token`.
    pub fn token_postings(&self, token: &str) -> &[WordRef] {
        self.token_index.get(token).map_or(&[], Vec::as_slice)
    }

    /// Words whose first token is `prev` and whose next token-bearing
    /// neighbour on the same page starts with `next`.
    pub fn bigram_postings(&self, prev: &str, next: &str) -> &[WordRef] {
        self.bigram_index
            .get(&bigram_key(prev, next))
            .map_or(&[], Vec::as_slice)
    }

    pub fn has_bigram_at(&self, prev: &str, next: &str, at: WordRef) -> bool {
        // postings are emitted in document order
        self.bigram_postings(prev, next).binary_search(&at).is_ok()
    }

    /// Materializes words `[start, end]` of a page as a span with the union
    /// of their boxes and their texts joined by single spaces.
    pub fn span(&self, page: u32, start: u32, end: u32) -> Option<WordSpan> {
        if start > end {
            return None;
        }
        let page_ref = self.page(page)?;
        let words = page_ref.words.get(start as usize..=end as usize)?;
        let bbox = BBox::union_all(words.iter().map(|w| &w.bbox))?;
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Some(WordSpan {
            page,
            start,
            end,
            bbox,
            text,
        })
    }
}

#[derive(Debug, Default)]
struct PageDraft {
    width: f32,
    height: f32,
    words: Vec<SourceWord>,
}

/// Collects pages and words, then builds a [`DocumentIndex`] in one pass.
///
/// Words keep their insertion order within a page; that order is taken to be
/// reading order and is never re-sorted.
#[derive(Debug, Default)]
pub struct DocumentIndexBuilder {
    pages: BTreeMap<u32, PageDraft>,
}

impl DocumentIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_source(pages: &[SourcePage], words: &[SourceWord]) -> Self {
        let mut builder = Self::new();
        for page in pages {
            builder.add_page(page);
        }
        for word in words {
            builder.add_word(word.clone());
        }
        builder
    }

    pub fn add_page(&mut self, page: &SourcePage) -> &mut Self {
        let draft = self.pages.entry(page.page).or_default();
        draft.width = page.width;
        draft.height = page.height;
        self
    }

    /// Appends a word to its page. Pages that were never declared are
    /// created with zero dimensions.
    pub fn add_word(&mut self, word: SourceWord) -> &mut Self {
        self.pages.entry(word.page).or_default().words.push(word);
        self
    }

    pub fn build(self) -> DocumentIndex {
        let pages: Vec<Page> = self
            .pages
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(page_index, draft)| build_page(page_index, draft))
            .collect();

        let mut trigram_index: HashMap<String, Vec<WordRef>> = HashMap::new();
        let mut token_index: HashMap<String, Vec<WordRef>> = HashMap::new();
        let mut bigram_index: HashMap<String, Vec<WordRef>> = HashMap::new();
        let mut word_count = 0;

        for page in &pages {
            let mut prev: Option<(&str, WordRef)> = None;
            for word in &page.words {
                let at = word.word_ref();
                word_count += 1;

                for tri in trigrams(&word.normalized_text) {
                    let postings = trigram_index.entry(tri).or_default();
                    if postings.last() != Some(&at) {
                        postings.push(at);
                    }
                }

                if let Some(first) = word.first_token() {
                    token_index.entry(first.to_string()).or_default().push(at);
                    if let Some((prev_token, prev_at)) = prev {
                        bigram_index
                            .entry(bigram_key(prev_token, first))
                            .or_default()
                            .push(prev_at);
                    }
                    prev = Some((first, at));
                }
            }
        }

        debug!(
            target: INDEX_BUILD,
            pages = pages.len(),
            words = word_count,
            trigrams = trigram_index.len(),
            tokens = token_index.len(),
            bigrams = bigram_index.len(),
            "built document index"
        );

        DocumentIndex {
            pages,
            trigram_index,
            token_index,
            bigram_index,
            word_count,
        }
    }
}

fn build_page(page_index: u32, draft: PageDraft) -> Page {
    let words = draft
        .words
        .into_iter()
        .enumerate()
        .map(|(i, source)| {
            let normalized_text = normalize(&source.text);
            let tokens: SmallVec<[String; 2]> = tokenize_normalized(&normalized_text);
            Word {
                page_index,
                word_index: i as u32,
                bbox: BBox::new(
                    source.x_norm,
                    source.y_norm,
                    source.width_norm,
                    source.height_norm,
                ),
                text: source.text,
                normalized_text,
                tokens,
                from_ocr: source.from_ocr,
            }
        })
        .collect();

    Page {
        page_index,
        width: draft.width,
        height: draft.height,
        words,
    }
}
