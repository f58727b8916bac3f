use crate::geo::BBox;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Page metadata handed over by the conversion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePage {
    pub page: u32,
    pub width: f32,
    pub height: f32,
}

/// A positioned word as produced by PDF text extraction or OCR.
/// Coordinates are already normalized to the page size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceWord {
    pub page: u32,
    pub text: String,
    pub x_norm: f32,
    pub y_norm: f32,
    pub width_norm: f32,
    pub height_norm: f32,
    #[serde(default)]
    pub from_ocr: bool,
}

/// Address of a word inside a `DocumentIndex`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WordRef {
    pub page: u32,
    pub word: u32,
}

impl WordRef {
    pub fn new(page: u32, word: u32) -> Self {
        Self { page, word }
    }
}

/// An indexed word. Immutable once the index is built.
#[derive(Debug, Clone)]
pub struct Word {
    pub page_index: u32,
    pub word_index: u32,
    pub text: String,
    pub normalized_text: String,
    pub tokens: SmallVec<[String; 2]>,
    pub bbox: BBox,
    pub from_ocr: bool,
}

impl Word {
    #[inline]
    pub fn word_ref(&self) -> WordRef {
        WordRef::new(self.page_index, self.word_index)
    }

    pub fn first_token(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn has_tokens(&self) -> bool {
        !self.tokens.is_empty()
    }
}

/// A page with its words in reading order. The position of a word in
/// `words` is its `word_index`.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_index: u32,
    pub width: f32,
    pub height: f32,
    pub words: Vec<Word>,
}

impl Page {
    pub fn word(&self, idx: u32) -> Option<&Word> {
        self.words.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Model-supplied reference to a text region. Carries no geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pointer {
    WordIds(Vec<String>),
    Offsets { start: usize, end: usize },
}

/// A field value produced by the extraction model. Never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    pub key: String,
    pub value: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<Pointer>,
}

impl ExtractedField {
    pub fn new(key: impl Into<String>, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            confidence,
            pointer: None,
        }
    }

    pub fn with_pointer(mut self, pointer: Pointer) -> Self {
        self.pointer = Some(pointer);
        self
    }
}

/// Candidate contiguous run of words `[start, end]` (inclusive) on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct WordSpan {
    pub page: u32,
    pub start: u32,
    pub end: u32,
    pub bbox: BBox,
    pub text: String,
}

impl WordSpan {
    pub fn word_count(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn word_indices(&self) -> Vec<u32> {
        (self.start..=self.end).collect()
    }
}

/// Words that look like the printed label of a value ("Total amount:").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelEvidence {
    pub text: String,
    pub word_indices: Vec<u32>,
    pub bbox: BBox,
}

/// A scored, resolved span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvidence {
    pub page: u32,
    pub word_indices: Vec<u32>,
    pub bbox: BBox,
    pub text: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelEvidence>,
}

/// Terminal output for one field. `spans` is empty when no box was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BBoxResolveResult {
    pub field_name: String,
    pub value: String,
    pub confidence: f64,
    pub spans: Vec<SpanEvidence>,
}

impl BBoxResolveResult {
    /// Result that carries the original extraction unchanged.
    pub fn unresolved(field: &ExtractedField) -> Self {
        Self {
            field_name: field.key.clone(),
            value: field.value.clone(),
            confidence: field.confidence,
            spans: Vec::new(),
        }
    }

    pub fn resolved(field: &ExtractedField, confidence: f64, span: SpanEvidence) -> Self {
        Self {
            field_name: field.key.clone(),
            value: field.value.clone(),
            confidence,
            spans: vec![span],
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.spans.is_empty()
    }
}
