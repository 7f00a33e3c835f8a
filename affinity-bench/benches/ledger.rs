//! Affinity Benchmark Suite
//!
//! Hot paths exercised on every inbound message or maintenance pass:
//!   gain_compute ..................... per message
//!   tier_lookup_full_range ........... per message, per decay sweep
//!   decay_sweep_1000_users ........... every 6 h
//!   cosine_rank_top5_from_500 ........ per recall
//!   hash_embed_sentence .............. per archived fact (offline backend)

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use affinity_core::behavior::Behavior;
use affinity_core::decay::decay_amount;
use affinity_core::embedding::{HashEmbedder, cosine_similarity};
use affinity_core::ledger::{GainInputs, compute_gain};
use affinity_core::mood::Mood;
use affinity_core::vector::SimilarityPolicy;
use affinity_core::{InteractionKind, MAX_AFFECTION, Tier};

fn bench_gain(c: &mut Criterion) {
    let inputs = GainInputs {
        kind: InteractionKind::DirectMessage,
        text_chars: 140,
        shared_personal: true,
        shared_interest: true,
        late_night: false,
        behavior: Behavior::Affectionate,
        mood: Mood::Playful,
        streak: 12,
    };
    c.bench_function("gain_compute", |b| {
        b.iter(|| black_box(compute_gain(black_box(&inputs), 30)));
    });
}

fn bench_tier_lookup(c: &mut Criterion) {
    c.bench_function("tier_lookup_full_range", |b| {
        b.iter(|| {
            let mut top = Tier::Stranger;
            for score in (0..=MAX_AFFECTION).step_by(250) {
                top = top.max(Tier::from_score(black_box(score)));
            }
            black_box(top)
        });
    });
}

fn bench_decay_sweep(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let users: Vec<(u32, f64)> = (0..1000)
        .map(|_| (rng.gen_range(0..=MAX_AFFECTION), rng.gen_range(0.0..30.0)))
        .collect();
    c.bench_function("decay_sweep_1000_users", |b| {
        b.iter(|| {
            let total: i64 = users.iter().map(|(a, d)| decay_amount(*a, *d)).sum();
            black_box(total)
        });
    });
}

fn bench_cosine_rank(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let policy = SimilarityPolicy {
        duplicate_threshold: 0.8,
        similarity_threshold: 0.0,
    };
    let mut group = c.benchmark_group("cosine_rank_top5");
    for dims in [64_usize, 384, 768] {
        let items: Vec<(String, Vec<f32>)> = (0..500)
            .map(|i| {
                let v: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
                (format!("fact {i}"), v)
            })
            .collect();
        let query: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(dims), &dims, |b, _| {
            b.iter(|| {
                let hits = policy.rank(
                    items.iter().map(|(t, e)| (t.as_str(), e.as_slice())),
                    black_box(&query),
                    5,
                );
                black_box(hits)
            });
        });
    }
    group.finish();

    let a: Vec<f32> = (0..768).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let b_vec: Vec<f32> = (0..768).map(|_| rng.gen_range(-1.0..1.0)).collect();
    c.bench_function("cosine_similarity_768", |b| {
        b.iter(|| black_box(cosine_similarity(black_box(&a), black_box(&b_vec))));
    });
}

fn bench_hash_embed(c: &mut Criterion) {
    let embedder = HashEmbedder::new(384);
    c.bench_function("hash_embed_sentence", |b| {
        b.iter(|| black_box(embedder.embed_sync(black_box("Lives in Osaka and works as a nurse on night shifts"))));
    });
}

criterion_group!(
    benches,
    bench_gain,
    bench_tier_lookup,
    bench_decay_sweep,
    bench_cosine_rank,
    bench_hash_embed,
);
criterion_main!(benches);
