use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graceful_shutdown::{Config, Lifecycle, ShutdownCoordinator};
use std::time::Duration;

fn bench_registration(c: &mut Criterion) {
    c.bench_function("tracker_registration", |b| {
        b.iter(|| {
            let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
            for _ in 0..16 {
                coordinator.track("bench", |_| async {});
            }
            black_box(coordinator);
        });
    });
}

fn bench_config_building(c: &mut Criterion) {
    c.bench_function("config_building", |b| {
        b.iter(|| {
            let config = Config::builder()
                .name("bench")
                .shutdown_timeout(Duration::from_secs(5))
                .unwrap()
                .build()
                .unwrap();
            black_box(config);
        });
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("fan_out");

    for trackers in [1_usize, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(trackers), &trackers, |b, &n| {
            b.to_async(&rt).iter(|| async move {
                let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
                for _ in 0..n {
                    coordinator.track("noop", |_| async {});
                }

                let trigger = Lifecycle::new();
                trigger.cancel();
                coordinator.wait_on(&trigger).await.unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_registration, bench_config_building, bench_fan_out);
criterion_main!(benches);
