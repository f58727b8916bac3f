//! Flat views over a [`DocumentIndex`] used when prompting the extraction
//! model and when resolving the pointers it sends back.

use std::collections::HashMap;

use regex::Regex;

use crate::error::ConfigError;
use crate::model::WordRef;
use crate::search_index::DocumentIndex;

pub const WORD_SEPARATOR: char = ' ';
pub const PAGE_SEPARATOR: char = '\n';

const PAGE_PLACEHOLDER: &str = "{page}";
const WORD_PLACEHOLDER: &str = "{word}";

/// Template for stable word identifiers, e.g. `p{page}_w{word}` → `p0_w12`.
#[derive(Debug, Clone)]
pub struct WordIdFormat {
    template: String,
    pattern: Regex,
}

impl WordIdFormat {
    pub const DEFAULT_TEMPLATE: &'static str = "p{page}_w{word}";

    pub fn new(template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidWordIdFormat {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        if template.matches(PAGE_PLACEHOLDER).count() != 1 {
            return Err(invalid("`{page}` must appear exactly once"));
        }
        if template.matches(WORD_PLACEHOLDER).count() != 1 {
            return Err(invalid("`{word}` must appear exactly once"));
        }
        if template.contains("{page}{word}") || template.contains("{word}{page}") {
            return Err(invalid("placeholders need a separator between them"));
        }

        let pattern = format!(
            "^{}$",
            regex::escape(template)
                .replace(&regex::escape(PAGE_PLACEHOLDER), r"(?P<page>\d+)")
                .replace(&regex::escape(WORD_PLACEHOLDER), r"(?P<word>\d+)")
        );
        let pattern = Regex::new(&pattern).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            pattern,
        })
    }

    pub fn format(&self, at: WordRef) -> String {
        self.template
            .replace(PAGE_PLACEHOLDER, &at.page.to_string())
            .replace(WORD_PLACEHOLDER, &at.word.to_string())
    }

    /// Parses an identifier. Does not check that the word exists.
    pub fn parse(&self, id: &str) -> Option<WordRef> {
        let caps = self.pattern.captures(id.trim())?;
        let page = caps.name("page")?.as_str().parse().ok()?;
        let word = caps.name("word")?.as_str().parse().ok()?;
        Some(WordRef::new(page, word))
    }
}

impl Default for WordIdFormat {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TEMPLATE).expect("default word id template is valid")
    }
}

/// Character range `[start, end)` of one word inside a [`PlainTextView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordOffset {
    pub at: WordRef,
    pub start: usize,
    pub end: usize,
}

/// The document as one string: words joined by a space, pages by a newline.
/// Offsets count chars, not bytes.
#[derive(Debug, Clone, Default)]
pub struct PlainTextView {
    text: String,
    char_len: usize,
    offsets: Vec<WordOffset>,
}

impl PlainTextView {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn offset_of(&self, at: WordRef) -> Option<WordOffset> {
        self.offsets
            .binary_search_by_key(&at, |o| o.at)
            .ok()
            .map(|i| self.offsets[i])
    }

    /// Words lying entirely inside `[start, end)`, in document order.
    pub fn words_within(&self, start: usize, end: usize) -> Vec<WordRef> {
        let first = self.offsets.partition_point(|o| o.start < start);
        self.offsets[first..]
            .iter()
            .take_while(|o| o.end <= end)
            .map(|o| o.at)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct PlainTextViewBuilder;

impl PlainTextViewBuilder {
    pub fn build(index: &DocumentIndex) -> PlainTextView {
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(index.word_count());
        let mut cursor = 0usize;

        for (page_pos, page) in index.pages().iter().enumerate() {
            if page_pos > 0 {
                text.push(PAGE_SEPARATOR);
                cursor += 1;
            }
            for (word_pos, word) in page.words.iter().enumerate() {
                if word_pos > 0 {
                    text.push(WORD_SEPARATOR);
                    cursor += 1;
                }
                let len = word.text.chars().count();
                offsets.push(WordOffset {
                    at: word.word_ref(),
                    start: cursor,
                    end: cursor + len,
                });
                text.push_str(&word.text);
                cursor += len;
            }
        }

        PlainTextView {
            text,
            char_len: cursor,
            offsets,
        }
    }
}

/// Bidirectional mapping between words and their formatted identifiers.
#[derive(Debug, Clone)]
pub struct WordIdMap {
    format: WordIdFormat,
    ids: Vec<(String, WordRef)>,
    by_id: HashMap<String, WordRef>,
    by_ref: HashMap<WordRef, usize>,
}

impl WordIdMap {
    pub fn format(&self) -> &WordIdFormat {
        &self.format
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id_for(&self, at: WordRef) -> Option<&str> {
        self.by_ref.get(&at).map(|&i| self.ids[i].0.as_str())
    }

    /// Looks an identifier up, accepting non-canonical spellings such as
    /// zero-padded numbers as long as they name an existing word.
    pub fn resolve(&self, id: &str) -> Option<WordRef> {
        if let Some(at) = self.by_id.get(id.trim()) {
            return Some(*at);
        }
        self.format
            .parse(id)
            .filter(|at| self.by_ref.contains_key(at))
    }

    /// `[id] text` pairs, one line per page, for inclusion in a prompt.
    pub fn render_tagged_text(&self, index: &DocumentIndex) -> String {
        index
            .pages()
            .iter()
            .map(|page| {
                page.words
                    .iter()
                    .filter_map(|w| {
                        self.id_for(w.word_ref())
                            .map(|id| format!("[{id}] {}", w.text))
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Default)]
pub struct WordIdMapBuilder {
    format: WordIdFormat,
}

impl WordIdMapBuilder {
    pub fn new(format: WordIdFormat) -> Self {
        Self { format }
    }

    pub fn build(self, index: &DocumentIndex) -> WordIdMap {
        let ids: Vec<(String, WordRef)> = index
            .words()
            .map(|w| (self.format.format(w.word_ref()), w.word_ref()))
            .collect();
        let by_id = ids.iter().map(|(id, at)| (id.clone(), *at)).collect();
        let by_ref = ids.iter().enumerate().map(|(i, (_, at))| (*at, i)).collect();
        WordIdMap {
            format: self.format,
            ids,
            by_id,
            by_ref,
        }
    }
}
