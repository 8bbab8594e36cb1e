//! Bindless Slot Table Tests
//!
//! Tests for:
//! - Slot 0 reservation (never allocated, release is a no-op)
//! - Reuse of released and expired slots
//! - Resolution to the default resource
//! - Exhaustion and out-of-range errors
//!
//! The table is generic over the resource type, so these run on plain
//! strings instead of GPU textures.

use std::sync::Arc;

use tessera::TesseraError;
use tessera::renderer::core::bindless::{DEFAULT_SLOT, SlotState, SlotTable};
use tessera::renderer::settings::BindlessSettings;

fn table(max_slots: u32, seed: u64) -> SlotTable<String> {
    SlotTable::new(
        Arc::new("default".to_string()),
        &BindlessSettings {
            max_slots,
            max_probe_attempts: 16,
            seed,
        },
    )
}

fn texture(name: &str) -> Arc<String> {
    Arc::new(name.to_string())
}

// ============================================================================
// Reserved Slot
// ============================================================================

#[test]
fn slot_zero_is_never_handed_out() {
    let mut table = table(16, 1);
    let held: Vec<_> = (0..15).map(|i| texture(&format!("t{i}"))).collect();
    let mut slots: Vec<u32> = held.iter().map(|t| table.allocate(t).unwrap()).collect();

    slots.sort_unstable();
    assert_eq!(slots, (1..16).collect::<Vec<_>>());
    assert_eq!(table.live_count(), 15);
}

#[test]
fn slot_zero_cannot_be_released_or_overwritten() {
    let mut table = table(8, 2);
    let t = texture("albedo");

    assert!(!table.release(DEFAULT_SLOT).unwrap());
    assert_eq!(table.state(DEFAULT_SLOT), Some(SlotState::Reserved));

    let err = table.allocate_at(&t, DEFAULT_SLOT).unwrap_err();
    assert!(matches!(err, TesseraError::ReservedSlot(0)));
    assert_eq!(*table.resolve(DEFAULT_SLOT), "default");
}

// ============================================================================
// Reuse
// ============================================================================

#[test]
fn released_slot_is_reused() {
    // Capacity 2 leaves exactly one allocatable slot.
    let mut table = table(2, 3);
    let first = texture("first");
    let second = texture("second");

    let slot = table.allocate(&first).unwrap();
    assert_eq!(slot, 1);
    assert!(table.allocate(&second).is_err());

    assert!(table.release(slot).unwrap());
    assert_eq!(table.state(slot), Some(SlotState::Vacant));
    assert_eq!(*table.resolve(slot), "default");

    assert_eq!(table.allocate(&second).unwrap(), 1);
    assert_eq!(*table.resolve(1), "second");
}

#[test]
fn expired_slot_is_reclaimed_by_allocation() {
    for seed in 0..20 {
        let mut table = table(8, seed);
        let live: Vec<_> = (0..7).map(|i| texture(&format!("t{i}"))).collect();
        for (slot, t) in (1..8).zip(&live) {
            if slot != 5 {
                table.allocate_at(t, slot).unwrap();
            }
        }

        let transient = texture("transient");
        table.allocate_at(&transient, 5).unwrap();
        drop(transient);
        assert_eq!(table.state(5), Some(SlotState::Expired));
        assert_eq!(*table.resolve(5), "default");

        let replacement = texture("replacement");
        assert_eq!(table.allocate(&replacement).unwrap(), 5, "seed {seed}");
        assert_eq!(*table.resolve(5), "replacement");
    }
}

#[test]
fn allocate_at_replaces_existing_mapping() {
    let mut table = table(8, 4);
    let old = texture("old");
    let new = texture("new");

    table.allocate_at(&old, 3).unwrap();
    table.allocate_at(&new, 3).unwrap();
    assert_eq!(*table.resolve(3), "new");
    assert_eq!(table.live_count(), 1);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn full_table_reports_exhaustion() {
    let mut table = table(4, 5);
    let held: Vec<_> = (0..3).map(|i| texture(&format!("t{i}"))).collect();
    for t in &held {
        table.allocate(t).unwrap();
    }

    let err = table.allocate(&texture("overflow")).unwrap_err();
    assert!(matches!(err, TesseraError::SlotTableExhausted { capacity: 4, .. }));
}

#[test]
fn out_of_range_slots_are_rejected() {
    let mut table = table(8, 6);
    let t = texture("t");

    assert!(matches!(
        table.allocate_at(&t, 8),
        Err(TesseraError::SlotOutOfRange { slot: 8, capacity: 8 })
    ));
    assert!(table.release(100).is_err());
    assert_eq!(table.state(8), None);
    assert_eq!(*table.resolve(100), "default");
}
