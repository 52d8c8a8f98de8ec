use criterion::{criterion_group, criterion_main, Criterion};
use wikiqa_core::corpus::DocumentReader;
use wikiqa_core::tokenizer::tokenize;

const ARTICLE: &str = "[[Paris]]
Paris is the capital and most populous city of France, with an estimated population of 2,102,650 residents.
Since the 17th century, Paris has been one of the world's major centres of finance, diplomacy, commerce, fashion and science.
==History==
The Parisii, a sub-tribe of the Celtic Senones, inhabited the Paris area from around the middle of the 3rd century BC.
[[File:Paris skyline.jpg]]
CATEGORIES: Capitals in Europe, Cities in France
";

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_article", |b| b.iter(|| tokenize(ARTICLE)));
}

fn bench_parse(c: &mut Criterion) {
    let corpus = ARTICLE.repeat(200);
    c.bench_function("parse_200_articles", |b| b.iter(|| DocumentReader::new(corpus.as_bytes()).count()));
}

criterion_group!(benches, bench_tokenize, bench_parse);
criterion_main!(benches);
