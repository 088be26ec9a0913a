use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use easel_core::{DrawableObject, EditPhase, ObjectId, ObjectProps, SceneStore, TxOrigin};
use std::hint::black_box;

fn populated_scene(n: usize) -> SceneStore {
    let mut scene = SceneStore::new();
    for i in 0..n {
        let mut obj = DrawableObject::rectangle(i as f64, i as f64, 50.0, 50.0);
        obj.assign_id(ObjectId::new(format!("obj-{i}")));
        scene.add(obj).unwrap();
    }
    scene.drain_events();
    scene
}

fn bench_local_modify(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scene");
    group.throughput(Throughput::Elements(1));

    let mut scene = populated_scene(1_000);
    group.bench_function("modify_continuous", |b| {
        b.iter(|| {
            scene
                .modify(black_box("obj-500"), EditPhase::Continuous, |p| p.base.left += 1.0)
                .unwrap();
            scene.drain_events();
        })
    });

    group.finish();
}

fn bench_wire_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scene");
    let props = DrawableObject::text(10.0, 10.0, "Hello, world").serialize();
    let json = props.to_json().unwrap();

    group.bench_function("props_encode", |b| {
        b.iter(|| black_box(black_box(&props).to_json().unwrap()))
    });
    group.bench_function("props_decode", |b| {
        b.iter(|| black_box(ObjectProps::from_json(black_box(&json)).unwrap()))
    });

    group.finish();
}

fn bench_remote_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scene");
    group.throughput(Throughput::Elements(1));

    let mut scene = populated_scene(1_000);
    let props = scene.serialize("obj-10").unwrap();
    group.bench_function("remote_patch", |b| {
        b.iter(|| {
            scene
                .apply_remote_upsert(ObjectId::new("obj-10"), black_box(props.clone()), TxOrigin::Remote)
                .unwrap();
            scene.drain_events();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_local_modify, bench_wire_codec, bench_remote_upsert);
criterion_main!(benches);
