use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use metropolis_rs::{
    test_logps::NormalLogp, Chain, MetropolisSettings, Model, NormalPrior, ParamKind,
    TwoGroupNormal,
};
use rand::SeedableRng;

fn make_chain(dim: usize, mu: f64) -> impl Chain {
    let settings = MetropolisSettings {
        num_tune: 0,
        ..Default::default()
    };
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut chain = settings
        .new_chain(0, NormalLogp::new(dim, mu), vec![ParamKind::Location; dim], &mut rng)
        .unwrap();
    chain.set_position(&vec![3.5; dim]).unwrap();
    chain
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("make chain 10", |b| {
        b.iter(|| make_chain(black_box(10), black_box(3.)))
    });

    for dim in [10, 1000] {
        let mut chain = make_chain(dim, 3.);
        c.bench_function(&format!("draw normal {}", dim), |b| {
            b.iter(|| chain.draw().unwrap())
        });
    }

    let model = TwoGroupNormal::new(
        (0..100).map(|i| (i % 7) as f64).collect(),
        (0..100).map(|i| (i % 5) as f64 + 2.).collect(),
        NormalPrior::default(),
    )
    .unwrap();
    let kinds = model.params().iter().map(|p| p.kind).collect::<Vec<_>>();
    let settings = MetropolisSettings {
        num_tune: 0,
        ..Default::default()
    };
    c.bench_function("two group normal 100 draws", |b| {
        b.iter_batched(
            || rand::rngs::StdRng::seed_from_u64(42),
            |mut rng| {
                let mut chain = settings
                    .new_chain(0, model.density().unwrap(), kinds.clone(), &mut rng)
                    .unwrap();
                chain.set_position(&[3., 4., 4.]).unwrap();
                for _ in 0..100 {
                    black_box(chain.draw().unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
