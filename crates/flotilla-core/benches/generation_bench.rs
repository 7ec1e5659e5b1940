use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use flotilla_core::{Cohort, FlotillaConfig, Simulation};
use std::time::Duration;

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn bench_generations(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");
    group.sample_size(env_usize("FLOTILLA_BENCH_SAMPLES", 20));
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(8));
    let ticks = env_usize("FLOTILLA_BENCH_TICKS", 120);
    for fleet in [10_usize, 50, 200] {
        group.bench_function(format!("ticks{ticks}_fleet{fleet}"), |b| {
            b.iter_batched(
                || {
                    let mut config = FlotillaConfig {
                        rng_seed: Some(0xF1EE7),
                        generation_ticks: ticks as u32,
                        ..FlotillaConfig::default()
                    };
                    for cohort in Cohort::ALL {
                        config.cohort_mut(cohort).count = fleet;
                    }
                    config.resources.box_count = fleet * 4;
                    let mut sim = Simulation::new(config).expect("simulation");
                    sim.start().expect("start");
                    sim
                },
                |mut sim| {
                    for _ in 0..ticks {
                        sim.step().expect("step");
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_generations);
criterion_main!(benches);
