//! Indirect Batching Tests
//!
//! Tests for:
//! - Mesh grouping in first-seen order
//! - Prefix-sum offsets across groups (commands, materials, instances)
//! - Empty frames
//! - Capacity overflow: whole groups dropped, counters stay consistent
//! - Unknown meshes skipped
//!
//! Batches are built against a CPU-only `SlotMap<MeshId, MeshLayout>`.

use glam::{Mat4, Vec3};
use slotmap::SlotMap;

use tessera::renderer::core::resources::{MaterialData, MeshData, MeshId, MeshLayout, Submesh};
use tessera::renderer::graph::batch::{BatchView, DrawBatch, IndirectDraw};
use tessera::renderer::settings::BatchSettings;
use tessera::DrawRequest;

type Meshes = SlotMap<MeshId, MeshLayout>;

fn camera() -> BatchView {
    let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 5.0, 40.0), Vec3::ZERO, Vec3::Y);
    BatchView::new(projection * view, 0)
}

/// A cube split into `submeshes` draw ranges, each with its own material.
fn split_cube(submeshes: u32) -> MeshLayout {
    let mut mesh = MeshData::cube(MaterialData::default());
    let per = 36 / submeshes;
    mesh.submeshes = (0..submeshes)
        .map(|i| Submesh {
            base_index: i * per,
            index_count: per,
            base_vertex: 0,
            transform: Mat4::IDENTITY,
            material_index: i,
        })
        .collect();
    mesh.materials = (0..submeshes)
        .map(|i| MaterialData {
            albedo_slot: i + 1,
            ..Default::default()
        })
        .collect();
    mesh.layout()
}

fn requests(mesh: MeshId, count: u32, first_entity: u32) -> Vec<DrawRequest> {
    (0..count)
        .map(|i| {
            let x = (i % 10) as f32 * 2.0 - 9.0;
            let z = (i / 10) as f32 * -2.0;
            DrawRequest::new(mesh, Mat4::from_translation(Vec3::new(x, 0.0, z)), first_entity + i)
        })
        .collect()
}

// ============================================================================
// Grouping & Offsets
// ============================================================================

#[test]
fn groups_follow_first_seen_order_with_prefix_sums() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(2));
    let b = meshes.insert(split_cube(3));
    let c = meshes.insert(split_cube(1));

    // Interleaved submission; b appears first.
    let mut frame = Vec::new();
    frame.extend(requests(b, 2, 0));
    frame.extend(requests(a, 4, 100));
    frame.extend(requests(b, 3, 200));
    frame.extend(requests(c, 5, 300));

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&frame, &meshes, &camera());

    let groups = batch.groups();
    assert_eq!(groups.iter().map(|g| g.mesh).collect::<Vec<_>>(), vec![b, a, c]);
    assert_eq!(groups.iter().map(|g| g.instance_count).collect::<Vec<_>>(), vec![5, 4, 5]);

    // command_offset(k) = sum of submesh counts before k, and so on.
    assert_eq!(groups.iter().map(|g| g.command_offset).collect::<Vec<_>>(), vec![0, 3, 5]);
    assert_eq!(groups.iter().map(|g| g.material_offset).collect::<Vec<_>>(), vec![0, 3, 5]);
    assert_eq!(groups.iter().map(|g| g.instance_offset).collect::<Vec<_>>(), vec![0, 15, 23]);

    assert_eq!(batch.commands().len(), 6);
    assert_eq!(batch.records().len(), 15 + 8 + 5);
    assert_eq!(batch.materials().len(), 6);

    let stats = batch.stats();
    assert_eq!(stats.groups, 3);
    assert_eq!(stats.commands, 6);
    assert_eq!(stats.instance_records, 28);
    assert_eq!(stats.dropped_requests, 0);
}

#[test]
fn commands_address_their_record_ranges() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(2));
    let b = meshes.insert(split_cube(3));

    let mut frame = requests(a, 4, 0);
    frame.extend(requests(b, 3, 10));

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&frame, &meshes, &camera());

    let mut expected_first = 0;
    for (index, command) in batch.commands().iter().enumerate() {
        assert_eq!(command.first_instance, expected_first);
        let range = command.first_instance as usize..(command.first_instance + command.instance_count) as usize;
        for record in &batch.records()[range] {
            assert_eq!(record.command_index(), index as u32);
        }
        expected_first += command.instance_count;
    }
    assert_eq!(expected_first as usize, batch.records().len());

    // Group b's second submesh points at group b's second material.
    let b_group = batch.groups()[1];
    let record = batch.records()[(b_group.instance_offset + b_group.instance_count) as usize];
    assert_eq!(record.material_index(), b_group.material_offset + 1);
    assert_eq!(batch.materials()[record.material_index() as usize].albedo_slot, 2);
}

#[test]
fn command_ranges_match_submesh_index_ranges() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(3));

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&requests(a, 2, 0), &meshes, &camera());

    let commands = batch.commands();
    assert_eq!(commands.len(), 3);
    for (i, command) in commands.iter().enumerate() {
        assert_eq!(command.first_index, i as u32 * 12);
        assert_eq!(command.index_count, 12);
        assert_eq!(command.instance_count, 2);
    }
}

#[test]
fn one_multi_draw_per_group_over_its_command_range() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(2));
    let b = meshes.insert(split_cube(3));

    let mut frame = requests(a, 4, 0);
    frame.extend(requests(b, 2, 10));

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&frame, &meshes, &camera());

    let draws: Vec<IndirectDraw> = batch.indirect_draws().collect();
    assert_eq!(
        draws,
        vec![
            IndirectDraw {
                mesh: a,
                command_offset: 0,
                command_count: 2,
            },
            IndirectDraw {
                mesh: b,
                command_offset: 2,
                command_count: 3,
            },
        ]
    );
}

// ============================================================================
// Empty & Invalid Input
// ============================================================================

#[test]
fn empty_frame_produces_nothing() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(2));

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&requests(a, 3, 0), &meshes, &camera());
    assert!(!batch.commands().is_empty());

    batch.build(&[], &meshes, &camera());
    assert_eq!(batch.indirect_draws().count(), 0);
    assert!(batch.groups().is_empty());
    assert!(batch.commands().is_empty());
    assert!(batch.records().is_empty());
    assert!(batch.materials().is_empty());
    assert_eq!(batch.stats().groups, 0);
}

#[test]
fn mesh_without_submeshes_issues_no_draw() {
    let mut meshes = Meshes::with_key();
    let empty = meshes.insert(MeshLayout::default());
    let a = meshes.insert(split_cube(1));

    let mut frame = requests(empty, 3, 0);
    frame.extend(requests(a, 2, 10));

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&frame, &meshes, &camera());

    let draws: Vec<IndirectDraw> = batch.indirect_draws().collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mesh, a);
    assert_eq!(batch.commands().len(), 1);
}

#[test]
fn unknown_mesh_requests_are_skipped() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(1));
    let removed = meshes.insert(split_cube(1));
    meshes.remove(removed);

    let mut frame = requests(removed, 2, 0);
    frame.extend(requests(a, 3, 10));

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&frame, &meshes, &camera());

    assert_eq!(batch.groups().len(), 1);
    assert_eq!(batch.groups()[0].mesh, a);
    assert_eq!(batch.records().len(), 3);
    assert_eq!(batch.stats().dropped_requests, 2);
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn overflowing_group_is_dropped_whole() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(2));
    let b = meshes.insert(split_cube(2));
    let c = meshes.insert(split_cube(1));

    let mut frame = requests(a, 3, 0);
    frame.extend(requests(b, 3, 10));
    frame.extend(requests(c, 4, 20));

    // Room for group a only.
    let capacity = BatchSettings {
        max_commands: 3,
        ..Default::default()
    };
    let mut batch = DrawBatch::new(capacity);
    batch.build(&frame, &meshes, &camera());

    assert_eq!(batch.groups().len(), 1);
    assert_eq!(batch.commands().len(), 2);
    assert_eq!(batch.records().len(), 6);
    assert_eq!(batch.stats().dropped_requests, 7);

    // Everything that was emitted stays self-consistent.
    let last = batch.groups()[0];
    assert_eq!((last.command_offset + last.submesh_count) as usize, batch.commands().len());
    assert_eq!((last.instance_offset + last.record_count()) as usize, batch.records().len());
    assert_eq!((last.material_offset + last.material_count) as usize, batch.materials().len());
}

#[test]
fn record_capacity_is_enforced() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(2));

    let capacity = BatchSettings {
        max_instance_records: 10,
        ..Default::default()
    };
    let mut batch = DrawBatch::new(capacity);

    batch.build(&requests(a, 5, 0), &meshes, &camera());
    assert_eq!(batch.records().len(), 10);

    batch.build(&requests(a, 6, 0), &meshes, &camera());
    assert!(batch.records().is_empty());
    assert_eq!(batch.stats().dropped_requests, 6);
}

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn culled_instances_keep_their_command_slot() {
    let mut meshes = Meshes::with_key();
    let a = meshes.insert(split_cube(1));

    let frame = [
        DrawRequest::new(a, Mat4::IDENTITY, 0),
        DrawRequest::new(a, Mat4::from_translation(Vec3::new(0.0, 0.0, 100.0)), 1),
        DrawRequest::new(a, Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)), 2),
    ];

    let mut batch = DrawBatch::new(BatchSettings::default());
    batch.build(&frame, &meshes, &camera());

    let visible: Vec<bool> = batch.records().iter().map(|r| r.is_visible()).collect();
    assert_eq!(visible, vec![true, false, true]);
    assert_eq!(batch.commands()[0].instance_count, 3);
    assert_eq!(batch.stats().cpu_culled, 1);
}
