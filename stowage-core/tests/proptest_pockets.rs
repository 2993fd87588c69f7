//! Property-based tests for the stowage core.
//!
//! Uses `proptest` to verify structural invariants under random inputs:
//! capacity bounds, restack idempotence, insert/can_contain agreement, and
//! record round-trip fidelity.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use stowage_core::contents::ContainerTree;
use stowage_core::item::{Item, ItemType, ItemTypeRegistry};
use stowage_core::pocket::Pocket;
use stowage_core::save::{self, MigrationMap};
use stowage_core::template::{PocketKind, PocketTemplate};
use stowage_core::types::{Position, Volume, Weight};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn container_template(ml: i64, grams: i64) -> Arc<PocketTemplate> {
    Arc::new(PocketTemplate {
        kind: PocketKind::Container,
        max_volume: Volume::from_milliliters(ml),
        min_item_volume: Volume::ZERO,
        max_weight: Weight::from_grams(grams),
        spoil_multiplier: 1.0,
        weight_multiplier: 1.0,
        magazine_well: Volume::ZERO,
        base_move_cost: 100,
        fire_protection: false,
        watertight: true,
        gastight: false,
        open_container: false,
        resealable: true,
        rigid: false,
        flag_restriction: BTreeSet::new(),
        ammo_restriction: BTreeSet::new(),
        number_override: None,
    })
}

/// A small pool of solid item types so random items can collide into stacks.
fn type_pool() -> Vec<Arc<ItemType>> {
    vec![
        Arc::new(ItemType::new(
            "pebble",
            Volume::from_milliliters(20),
            Weight::from_grams(50),
        )),
        Arc::new(ItemType::new(
            "brick",
            Volume::from_milliliters(250),
            Weight::from_grams(800),
        )),
        // Charge-counted volumes/weights divide evenly by stack size, so
        // merge arithmetic stays exact under the remaining-capacity checks.
        Arc::new(
            ItemType::new("bead", Volume::from_milliliters(10), Weight::from_grams(10))
                .with_charges(10),
        ),
        Arc::new(
            ItemType::new("thread", Volume::from_milliliters(40), Weight::from_grams(16))
                .with_charges(4),
        ),
    ]
}

fn arb_item() -> impl Strategy<Value = Item> {
    (0..4usize, 1..12u32).prop_map(|(type_idx, charges)| {
        let ty = Arc::clone(&type_pool()[type_idx]);
        Item::new(ty).with_charges(charges)
    })
}

fn arb_items(max: usize) -> impl Strategy<Value = Vec<Item>> {
    proptest::collection::vec(arb_item(), 0..max)
}

// ---------------------------------------------------------------------------
// Property: insert succeeds exactly when can_contain allows it, and on
// success the remaining capacities shrink by the item's contribution.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn insert_agrees_with_can_contain(items in arb_items(24)) {
        let mut pocket = Pocket::new(container_template(1000, 3000));
        for item in items {
            let verdict = pocket.can_contain(&item);
            let volume_before = pocket.remaining_volume();
            let weight_before = pocket.remaining_weight();
            let contribution_volume = item.volume();
            let contribution_weight = item.weight();

            match pocket.insert_item(item) {
                Ok(()) => {
                    prop_assert!(verdict.is_ok());
                    prop_assert_eq!(
                        pocket.remaining_volume(),
                        volume_before.saturating_sub(contribution_volume)
                    );
                    prop_assert_eq!(
                        pocket.remaining_weight(),
                        weight_before.saturating_sub(contribution_weight)
                    );
                }
                Err(failure) => {
                    prop_assert_eq!(verdict, Err(failure.rejection));
                    prop_assert_eq!(pocket.remaining_volume(), volume_before);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: absent an overflow call, checked insertion never exceeds the
// template maxima.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn capacity_invariant_holds(items in arb_items(32)) {
        let mut pocket = Pocket::new(container_template(800, 2500));
        for item in items {
            let _ = pocket.insert_item(item);
            prop_assert!(pocket.contains_volume() <= pocket.volume_capacity());
            prop_assert!(pocket.contains_weight() <= pocket.weight_capacity());
        }
    }
}

// ---------------------------------------------------------------------------
// Property: restack is idempotent and conserves charges.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn restack_is_idempotent(items in arb_items(16)) {
        let mut pocket = Pocket::new(container_template(1_000_000, 1_000_000));
        let total_before: u64 = items.iter().map(|it| u64::from(it.count())).sum();
        for item in items {
            pocket.add_unchecked(item);
        }

        pocket.restack();
        let once: Vec<(String, u32)> = pocket
            .items()
            .iter()
            .map(|it| (it.type_id().0.clone(), it.charges()))
            .collect();
        let total_after: u64 = pocket.items().iter().map(|it| u64::from(it.count())).sum();
        prop_assert_eq!(total_before, total_after);

        pocket.restack();
        let twice: Vec<(String, u32)> = pocket
            .items()
            .iter()
            .map(|it| (it.type_id().0.clone(), it.charges()))
            .collect();
        prop_assert_eq!(once, twice);
    }
}

// ---------------------------------------------------------------------------
// Property: overflow restores the capacity invariant and reports exactly
// what it removed.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn overflow_reports_everything(items in arb_items(24)) {
        let mut pocket = Pocket::new(container_template(500, 1500));
        let mut expected_ids: BTreeSet<_> = BTreeSet::new();
        for item in items {
            expected_ids.insert(item.id());
            pocket.add_unchecked(item);
        }

        let spills = pocket.overflow(Position::new(0, 0, 0));
        prop_assert!(pocket.contains_volume() <= pocket.volume_capacity());
        prop_assert!(pocket.contains_weight() <= pocket.weight_capacity());

        // Every original item is either still inside or reported spilled.
        let mut seen = BTreeSet::new();
        for item in pocket.items() {
            seen.insert(item.id());
        }
        for spill in &spills {
            seen.insert(spill.item.id());
        }
        prop_assert_eq!(expected_ids, seen);
    }
}

// ---------------------------------------------------------------------------
// Property: record round-trip preserves traversal order, aggregates, and
// rejection behavior for a probe item.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn record_round_trip_is_faithful(items in arb_items(16), probe in arb_item()) {
        let mut registry = ItemTypeRegistry::new();
        for ty in type_pool() {
            registry.register((*ty).clone());
        }
        let holder_templates = vec![
            container_template(600, 2000),
            container_template(2000, 8000),
        ];
        let holder = registry.register(
            ItemType::new(
                "holder",
                Volume::from_milliliters(100),
                Weight::from_grams(100),
            )
            .with_pockets(holder_templates),
        );

        let mut original = Item::new(holder);
        {
            let tree = original.contents_mut().expect("tree");
            for item in items {
                let _ = tree.insert_item(item, PocketKind::Container);
            }
        }

        let bytes = save::serialize_item(&original).expect("serialize");
        let restored = save::deserialize_item(&bytes, &registry, &MigrationMap::new())
            .expect("deserialize");

        prop_assert_eq!(restored.volume(), original.volume());
        prop_assert_eq!(restored.weight(), original.weight());

        let original_tree = original.contents().expect("tree");
        let restored_tree = restored.contents().expect("tree");
        let original_order: Vec<_> = original_tree
            .all_items_top()
            .iter()
            .map(|it| it.id())
            .collect();
        let restored_order: Vec<_> = restored_tree
            .all_items_top()
            .iter()
            .map(|it| it.id())
            .collect();
        prop_assert_eq!(original_order, restored_order);
        prop_assert_eq!(
            original_tree.num_item_stacks(),
            restored_tree.num_item_stacks()
        );

        // Identical rejection behavior for an arbitrary probe item.
        for (a, b) in original_tree.pockets().iter().zip(restored_tree.pockets()) {
            prop_assert_eq!(a.can_contain(&probe), b.can_contain(&probe));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: best_pocket is deterministic and pure.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn best_pocket_is_pure(items in arb_items(12), probe in arb_item()) {
        let templates = vec![
            container_template(400, 1500),
            container_template(1500, 5000),
            container_template(300, 1000),
        ];
        let mut tree = ContainerTree::new(&templates);
        for item in items {
            let _ = tree.insert_item(item, PocketKind::Container);
        }

        let first = tree.best_pocket(&probe, false).map(Pocket::remaining_volume);
        let second = tree.best_pocket(&probe, false).map(Pocket::remaining_volume);
        prop_assert_eq!(first, second);
    }
}
