use criterion::{Criterion, criterion_group, criterion_main};
use hybrid_rec::behavior::ScoreTable;
use hybrid_rec::catalog::{CatalogSnapshot, Product};
use hybrid_rec::profile::UserProfile;
use hybrid_rec::ranking::HybridRanker;
use std::collections::HashSet;
use std::hint::black_box;

const PRODUCTS: usize = 5_000;
const DIMENSION: usize = 384;

/// Deterministic vectors so runs are comparable
fn vector(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    (0..DIMENSION)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) as f32 / u32::MAX as f32) - 0.25
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let products: Vec<Product> = (0..PRODUCTS)
        .map(|i| Product {
            id: format!("p{i:05}"),
            title: format!("Product {i}"),
            category: format!("c{}", i % 20),
            description: None,
            tags: Vec::new(),
            price: None,
            metadata: None,
            embedding: vector(i as u64),
        })
        .collect();
    let catalog = CatalogSnapshot::build(DIMENSION, "bench", products).expect("valid catalog");

    let profile = UserProfile {
        user_id: "u1".to_string(),
        vector: vector(u64::MAX),
        history: Vec::new(),
        interest_terms: Vec::new(),
    };
    let mut behavior = ScoreTable::new();
    for i in (0..PRODUCTS).step_by(50) {
        behavior.insert("u1", &format!("p{i:05}"), 0.5);
    }
    let ranker = HybridRanker::new(&catalog, &profile, &behavior);
    let exclusions = HashSet::new();

    c.bench_function("rank_top_10", |b| {
        b.iter(|| ranker.rank(black_box("u1"), black_box(10), black_box(0.2), &exclusions))
    });

    c.bench_function("nearest_10", |b| {
        b.iter(|| catalog.nearest(black_box(&profile.vector), black_box(10), None))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
