#![allow(dead_code)]

use std::sync::OnceLock;

use fieldbox::logging::init_logging;
use fieldbox::{DocumentIndex, SourcePage, SourceWord};
use tracing_appender::non_blocking::WorkerGuard;

static GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Installs the stdout subscriber once per test binary; `RUST_LOG` controls
/// what is shown.
pub fn setup() {
    GUARD.get_or_init(init_logging);
}

/// Lays words out left to right, one line per call to [`line`](Self::line),
/// on US-letter pages.
pub struct DocumentBuilder {
    pages: Vec<SourcePage>,
    words: Vec<SourceWord>,
    page: u32,
    line: u32,
    ocr: bool,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        DocumentBuilder {
            pages: vec![SourcePage {
                page: 0,
                width: 612.0,
                height: 792.0,
            }],
            words: Vec::new(),
            page: 0,
            line: 0,
            ocr: false,
        }
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ocr(mut self) -> Self {
        self.ocr = true;
        self
    }

    pub fn line(mut self, texts: &[&str]) -> Self {
        let y = 0.05 + self.line as f32 * 0.03;
        let mut x = 0.05;
        for text in texts {
            let width = 0.012 * text.chars().count().max(1) as f32;
            self.words.push(SourceWord {
                page: self.page,
                text: text.to_string(),
                x_norm: x,
                y_norm: y,
                width_norm: width,
                height_norm: 0.02,
                from_ocr: self.ocr,
            });
            x += width + 0.01;
        }
        self.line += 1;
        self
    }

    pub fn next_page(mut self) -> Self {
        self.page += 1;
        self.line = 0;
        self.pages.push(SourcePage {
            page: self.page,
            width: 612.0,
            height: 792.0,
        });
        self
    }

    pub fn pages(&self) -> &[SourcePage] {
        &self.pages
    }

    pub fn words(&self) -> &[SourceWord] {
        &self.words
    }

    pub fn build(&self) -> DocumentIndex {
        DocumentIndex::build(&self.pages, &self.words)
    }
}
