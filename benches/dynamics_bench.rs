use criterion::{criterion_group, criterion_main, Criterion};
use linkage_dynamics::*;
use std::hint::black_box;

fn bench_assembly(c: &mut Criterion) {
    c.bench_function("four_bar_state_space", |b| {
        b.iter(|| {
            let mut model = four_bar(&FourBarParameters::default()).unwrap();
            black_box(model.system.state_space().unwrap());
        })
    });
}

fn bench_derivative(c: &mut Criterion) {
    let mut model = four_bar(&FourBarParameters::default()).unwrap();
    let space = model.system.state_space().unwrap();
    let state = model.system.initial_state();
    let constants = model.system.constants().clone();

    c.bench_function("four_bar_derivative", |b| {
        b.iter(|| black_box(space.derivative(black_box(&state), 0.0, &constants).unwrap()))
    });
}

fn bench_integration(c: &mut Criterion) {
    let mut group = c.benchmark_group("four_bar_integration");
    group.sample_size(10);

    let params = FourBarParameters {
        damping: 1.0,
        stiffness: 10.0,
        ..FourBarParameters::default()
    };
    let mut model = four_bar(&params).unwrap();
    let simulation = Simulation::new(&mut model.system).unwrap();
    let grid = TimeGrid::frames(0.0, 10.0).unwrap();

    group.bench_function("ten_seconds", |b| {
        b.iter(|| black_box(simulation.run(&grid).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_assembly, bench_derivative, bench_integration);
criterion_main!(benches);
