mod common;

use common::{setup, DocumentBuilder};
use fieldbox::search_index::bigram_key;
use fieldbox::{DocumentIndexBuilder, SourcePage, SourceWord, WordRef};
use pretty_assertions::assert_eq;

fn invoice() -> DocumentBuilder {
    DocumentBuilder::new()
        .line(&["ACME", "S.p.A."])
        .line(&["Invoice", "number", ":", "INV-2025-001"])
        .next_page()
        .line(&["Total", "amount", ":", "1.234,56"])
}

#[test]
fn words_keep_reading_order_and_normalized_text() {
    setup();
    let index = invoice().build();
    assert_eq!(index.pages().len(), 2);
    assert_eq!(index.word_count(), 10);

    let page0 = index.page(0).unwrap();
    let texts: Vec<&str> = page0.words.iter().map(|w| w.normalized_text.as_str()).collect();
    assert_eq!(texts, vec!["acme", "spa", "invoice", "number", ":", "inv-2025-001"]);

    let amount = index.word(WordRef::new(1, 3)).unwrap();
    assert_eq!(amount.text, "1.234,56");
    assert_eq!(amount.normalized_text, "1234.56");
    assert_eq!(amount.tokens.as_slice(), ["1234", "56"]);
}

#[test]
fn token_index_keys_first_token() {
    let index = invoice().build();
    assert_eq!(index.token_postings("inv"), &[WordRef::new(0, 5)]);
    assert!(index.token_postings("2025").is_empty());
    assert_eq!(index.token_postings("total"), &[WordRef::new(1, 0)]);
}

#[test]
fn bigrams_skip_tokenless_words() {
    let index = invoice().build();
    assert!(index.has_bigram_at("number", "inv", WordRef::new(0, 3)));
    assert!(index.has_bigram_at("amount", "1234", WordRef::new(1, 1)));
    // the chain does not cross pages
    assert!(index.bigram_postings("inv", "total").is_empty());
    assert_eq!(bigram_key("a", "b"), "a\u{1F}b");
}

#[test]
fn trigram_postings_are_unique_per_word() {
    let index = DocumentBuilder::new().line(&["aaaaa", "baaa"]).build();
    assert_eq!(
        index.trigram_postings("aaa"),
        &[WordRef::new(0, 0), WordRef::new(0, 1)]
    );
}

#[test]
fn short_words_are_their_own_trigram() {
    let index = DocumentBuilder::new().line(&["No", "42"]).build();
    assert_eq!(index.trigram_postings("no"), &[WordRef::new(0, 0)]);
    assert_eq!(index.trigram_postings("42"), &[WordRef::new(0, 1)]);
}

#[test]
fn undeclared_pages_are_created_and_sorted() {
    let word = |page: u32, text: &str| SourceWord {
        page,
        text: text.to_string(),
        x_norm: 1.4,
        y_norm: -0.2,
        width_norm: -1.0,
        height_norm: 0.1,
        from_ocr: true,
    };
    let mut builder = DocumentIndexBuilder::new();
    builder
        .add_word(word(3, "late"))
        .add_page(&SourcePage {
            page: 1,
            width: 100.0,
            height: 200.0,
        })
        .add_word(word(1, "early"));
    let index = builder.build();

    let order: Vec<u32> = index.pages().iter().map(|p| p.page_index).collect();
    assert_eq!(order, vec![1, 3]);
    let implicit = index.page(3).unwrap();
    assert_eq!((implicit.width, implicit.height), (0.0, 0.0));

    let bbox = implicit.words[0].bbox;
    assert_eq!((bbox.x, bbox.y, bbox.w), (1.0, 0.0, 0.0));
    assert!(index.page(2).is_none());
}

#[test]
fn spans_join_original_text_and_union_boxes() {
    let index = invoice().build();
    let span = index.span(1, 0, 1).unwrap();
    assert_eq!(span.text, "Total amount");
    assert_eq!(span.word_count(), 2);
    let first = index.word(WordRef::new(1, 0)).unwrap().bbox;
    let second = index.word(WordRef::new(1, 1)).unwrap().bbox;
    assert!(span.bbox.contains(&first) && span.bbox.contains(&second));

    assert!(index.span(1, 2, 1).is_none());
    assert!(index.span(1, 0, 9).is_none());
}
