//! Edit distance and end-to-end resolution benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fieldbox::distance::{bit_parallel_myers, levenshtein};
use fieldbox::{DocumentIndex, ExtractedField, ResolverOptions, ResolverOrchestrator, SourcePage, SourceWord};

/// Deterministic lowercase ASCII text of `len` chars.
fn pseudo_text(len: usize, mut seed: u64) -> String {
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            (b'a' + ((seed >> 33) % 26) as u8) as char
        })
        .collect()
}

fn bench_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("edit_distance");

    for len in [8, 16, 32, 64] {
        let a = pseudo_text(len, 7);
        let b = pseudo_text(len, 11);

        group.bench_with_input(BenchmarkId::new("levenshtein", len), &(&a, &b), |bench, (a, b)| {
            bench.iter(|| black_box(levenshtein(black_box(a), black_box(b))))
        });
        group.bench_with_input(BenchmarkId::new("myers", len), &(&a, &b), |bench, (a, b)| {
            bench.iter(|| black_box(bit_parallel_myers(black_box(a), black_box(b))))
        });
    }

    group.finish();
}

fn synthetic_document(pages: u32, words_per_page: usize) -> DocumentIndex {
    let source_pages: Vec<SourcePage> = (0..pages)
        .map(|page| SourcePage {
            page,
            width: 612.0,
            height: 792.0,
        })
        .collect();
    let words: Vec<SourceWord> = (0..pages)
        .flat_map(|page| {
            (0..words_per_page).map(move |i| SourceWord {
                page,
                text: pseudo_text(3 + i % 8, (page as u64) << 32 | i as u64),
                x_norm: (i % 10) as f32 * 0.1,
                y_norm: (i / 10) as f32 * 0.01,
                width_norm: 0.08,
                height_norm: 0.01,
                from_ocr: i % 3 == 0,
            })
        })
        .collect();
    DocumentIndex::build(&source_pages, &words)
}

fn bench_resolve(c: &mut Criterion) {
    let index = synthetic_document(4, 400);
    let orchestrator = ResolverOrchestrator::new(ResolverOptions::default()).unwrap();
    let fields: Vec<ExtractedField> = index
        .words()
        .step_by(97)
        .enumerate()
        .map(|(i, w)| ExtractedField::new(format!("field_{i}"), w.text.clone(), 0.8))
        .collect();

    c.bench_function("resolve_fields_4_pages", |b| {
        b.iter(|| black_box(orchestrator.resolve(black_box(&index), black_box(&fields))))
    });
}

criterion_group!(benches, bench_distance, bench_resolve);
criterion_main!(benches);
