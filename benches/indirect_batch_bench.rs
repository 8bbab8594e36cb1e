//! CPU cost of building one frame's indirect batch.
//!
//! Run with: cargo bench --bench indirect_batch_bench

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use glam::{Mat4, Vec3};
use slotmap::SlotMap;

use tessera::DrawRequest;
use tessera::renderer::core::resources::{MaterialData, MeshData, MeshId, MeshLayout};
use tessera::renderer::graph::batch::{BatchView, DrawBatch};
use tessera::renderer::settings::BatchSettings;

fn view() -> BatchView {
    let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 40.0, 120.0), Vec3::ZERO, Vec3::Y);
    BatchView::new(projection * view, 0)
}

fn scene(mesh_count: usize, instances: u32) -> (SlotMap<MeshId, MeshLayout>, Vec<DrawRequest>) {
    let mut meshes = SlotMap::with_key();
    let ids: Vec<MeshId> = (0..mesh_count)
        .map(|_| meshes.insert(MeshData::cube(MaterialData::default()).layout()))
        .collect();

    let side = (f64::from(instances).sqrt().ceil()) as u32;
    let requests = (0..instances)
        .map(|i| {
            let position = Vec3::new((i % side) as f32 * 2.0, 0.0, (i / side) as f32 * -2.0);
            DrawRequest::new(ids[i as usize % ids.len()], Mat4::from_translation(position), i)
        })
        .collect();
    (meshes, requests)
}

fn bench_build(c: &mut Criterion) {
    let capacity = BatchSettings {
        max_commands: 1024,
        max_instance_records: 1 << 20,
        max_materials: 1024,
        max_bones: 0,
    };

    let mut group = c.benchmark_group("draw_batch_build");
    for &(meshes, instances) in &[(1usize, 10_000u32), (64, 10_000), (256, 100_000)] {
        let (layouts, requests) = scene(meshes, instances);
        let mut batch = DrawBatch::new(capacity);
        let view = view();

        group.throughput(Throughput::Elements(u64::from(instances)));
        group.bench_with_input(
            BenchmarkId::new(format!("{meshes}_meshes"), instances),
            &requests,
            |b, requests| {
                b.iter(|| {
                    batch.build(black_box(requests), &layouts, &view);
                    black_box(batch.stats())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
