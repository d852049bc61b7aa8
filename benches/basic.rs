use criterion::{criterion_group, criterion_main, Criterion};
use serialbowl::{
    ConfigValue, Connection, ConnectionParameters, Flow, MockTransport, Snapshot, Timings,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

pub fn bench_snapshot_normalization(c: &mut Criterion) {
    let ports: Vec<String> = (0..64)
        .rev()
        .map(|i| format!("/dev/ttyUSB{}", i % 48))
        .collect();
    c.bench_function("snapshot_new_64", |b| {
        b.iter(|| black_box(Snapshot::new(black_box(ports.iter().cloned()))))
    });
}

pub fn bench_dispatch(c: &mut Criterion) {
    let timings = Timings {
        registry_poll: Duration::from_secs(3600),
        reconnect_poll: Duration::from_secs(3600),
    };
    let mut conn = Connection::with_timings(
        Arc::new(MockTransport::new()),
        ConnectionParameters::default(),
        timings,
    );
    conn.subscribe(|n| {
        black_box(n);
    });
    let sender = conn.sender();

    c.bench_function("dispatch_1000_settings", |b| {
        b.iter(|| {
            for i in 0..1000u32 {
                sender.apply_setting("baud-rate", ConfigValue::from(9600 + i % 2));
            }
            assert_eq!(conn.process_pending(), Flow::Continue);
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_snapshot_normalization, bench_dispatch
}
criterion_main!(benches);
