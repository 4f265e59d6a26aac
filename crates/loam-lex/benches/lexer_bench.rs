//! Lexer throughput benchmark.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loam_lex::Lexer;

/// Builds a representative source file of roughly `lines` lines.
fn sample_source(lines: usize) -> String {
    let mut source = String::new();
    for i in 0..lines {
        source.push_str(&format!(
            "var value{i} = {i} * 2 + 1; // accumulate\n\
             if (value{i} >= 10) {{ print \"big {i}\"; }} else {{ print value{i}; }}\n"
        ));
    }
    source
}

fn scan_whole_source(source: &str) -> usize {
    let mut lexer = Lexer::new(source);
    let mut count = 0;
    while !lexer.scan_token().is_eof() {
        count += 1;
    }
    count
}

fn bench_lexer(c: &mut Criterion) {
    let small = sample_source(10);
    let large = sample_source(1000);

    c.bench_function("lex_small_program", |b| {
        b.iter(|| scan_whole_source(black_box(&small)))
    });

    c.bench_function("lex_large_program", |b| {
        b.iter(|| scan_whole_source(black_box(&large)))
    });
}

criterion_group!(benches, bench_lexer);
criterion_main!(benches);
