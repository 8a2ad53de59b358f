use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use slot_tagger::{EncoderKind, Initializer, ModelConfig, ModelSpec, SequenceTransform};

// Random embedded sequence, [len, dim]
fn random_sequence(len: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((len, dim), || rng.gen_range(-1.0f32..1.0))
}

fn benchmark_encoders(c: &mut Criterion) {
    let mut group = c.benchmark_group("Encoder");

    // ATIS queries are rarely longer than 40 tokens.
    let lengths = [8, 20, 40];
    let kinds = [
        EncoderKind::Recurrent,
        EncoderKind::Lookahead,
        EncoderKind::Bidirectional,
    ];

    for kind in kinds {
        let spec = ModelSpec::new(ModelConfig {
            encoder: kind,
            ..ModelConfig::default()
        })
        .expect("default config is valid");
        let model = spec
            .bind(&mut Initializer::new(0))
            .expect("initializer binds every parameter");
        let encoder = model.encoder();

        for &len in &lengths {
            let x = random_sequence(len, encoder.input_dim(), len as u64);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", kind), len),
                &x,
                |bencher, x| bencher.iter(|| black_box(encoder.forward(x.view()).unwrap())),
            );
        }
    }
    group.finish();
}

fn benchmark_tag_batch(c: &mut Criterion) {
    let spec = ModelSpec::new(ModelConfig {
        encoder: EncoderKind::Bidirectional,
        ..ModelConfig::default()
    })
    .expect("default config is valid");
    let model = spec
        .bind(&mut Initializer::new(1))
        .expect("initializer binds every parameter");

    let mut rng = StdRng::seed_from_u64(7);
    let batch: Vec<Vec<u32>> = (0..64)
        .map(|_| (0..rng.gen_range(5..30)).map(|_| rng.gen_range(0..943)).collect())
        .collect();

    c.bench_function("tag_batch 64 queries", |bencher| {
        bencher.iter(|| black_box(model.tag_batch(&batch).unwrap()))
    });
}

criterion_group!(benches, benchmark_encoders, benchmark_tag_batch);
criterion_main!(benches);
