use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use easel_core::{DrawableObject, EditPhase, ObjectId};
use easel_sync::{ManualClock, ReplicatedDocument, SyncConfig, SyncSession, UpdateEnvelope};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn synced_session(objects: usize) -> (SyncSession, ManualClock) {
    let clock = ManualClock::new();
    let config = SyncConfig::default();
    let mut session = SyncSession::with_clock(config.clone(), Arc::new(clock.clone()));
    session.attach(ReplicatedDocument::new(&config)).unwrap();
    for i in 0..objects {
        let mut obj = DrawableObject::rectangle(i as f64, i as f64, 20.0, 20.0);
        obj.assign_id(ObjectId::new(format!("obj-{i}")));
        session.create_or_update_object(obj).unwrap();
    }
    session.drain_outbound();
    (session, clock)
}

fn bench_envelope(c: &mut Criterion) {
    let peer = Uuid::new_v4();
    let doc = Uuid::new_v4();
    let envelope = UpdateEnvelope::update(peer, doc, 1, vec![0u8; 64]);
    let encoded = envelope.encode().unwrap();

    c.bench_function("envelope_encode_64B", |b| {
        b.iter(|| black_box(black_box(&envelope).encode().unwrap()))
    });
    c.bench_function("envelope_decode_64B", |b| {
        b.iter(|| black_box(UpdateEnvelope::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_drag_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sync");
    group.throughput(Throughput::Elements(60));

    // One second of pointer moves at 60 Hz, collapsed into one write.
    let (mut session, clock) = synced_session(500);
    group.bench_function("drag_60_steps_then_flush", |b| {
        b.iter(|| {
            for step in 0..60 {
                session
                    .modify_object("obj-250", EditPhase::Continuous, |p| p.base.left = step as f64)
                    .unwrap();
            }
            clock.advance(Duration::from_millis(300));
            black_box(session.run_due_timers());
            session.drain_outbound();
        })
    });

    group.finish();
}

fn bench_remote_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sync");
    group.throughput(Throughput::Elements(100));

    let (mut source, _) = synced_session(0);
    for i in 0..100 {
        let mut obj = DrawableObject::ellipse(i as f64, 0.0, 5.0, 5.0);
        obj.assign_id(ObjectId::new(format!("remote-{i}")));
        source.create_or_update_object(obj).unwrap();
    }
    let payloads = source.drain_outbound();

    group.bench_function("apply_100_remote_adds", |b| {
        b.iter_batched(
            || synced_session(0).0,
            |mut session| {
                for payload in &payloads {
                    session.apply_remote_update(payload).unwrap();
                }
                black_box(session.scene().len())
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_hydration(c: &mut Criterion) {
    let (source, _) = synced_session(1_000);
    let state = source.encode_state().unwrap();
    let config = SyncConfig::default();

    c.bench_function("hydrate_1k_objects", |b| {
        b.iter_batched(
            || {
                let mut doc = ReplicatedDocument::new(&config);
                doc.apply_update(&state, easel_core::TxOrigin::Hydration).unwrap();
                (SyncSession::new(config.clone()), doc)
            },
            |(mut session, doc)| black_box(session.attach(doc).unwrap()),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_envelope, bench_drag_burst, bench_remote_apply, bench_hydration);
criterion_main!(benches);
