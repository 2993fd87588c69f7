//! Persistence records for items and their container trees.
//!
//! Runtime types hold shared `Arc` template/type handles, so they do not
//! round-trip through serde directly. Instead each pocket serializes to a
//! record of `{saved-kind tag, seal state, ordered item sub-records}`, and
//! container items recursively embed their own tree document. Rebuilding
//! consults the [`ItemTypeRegistry`] and fails with a localized
//! [`StowageError::DataIntegrity`] — never a panic, never silent loss —
//! when the saved structure no longer matches the current definitions.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contents::ContainerTree;
use crate::error::{Result, StowageError};
use crate::item::{Item, ItemType, ItemTypeRegistry};
use crate::pocket::Pocket;
use crate::process;
use crate::template::{PocketKind, PocketTemplate};
use crate::types::{ItemInstanceId, ItemTypeId};

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Persisted form of one container tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeRecord {
    /// One record per pocket, in pocket order.
    #[serde(default)]
    pub pockets: Vec<PocketRecord>,
}

/// Persisted form of one pocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PocketRecord {
    /// The saved kind tag; must match the template kind on reload.
    pub kind: PocketKind,
    /// Whether the pocket was sealed.
    #[serde(default)]
    pub sealed: bool,
    /// Contained items, in insertion order.
    #[serde(default)]
    pub items: Vec<ItemRecord>,
}

/// Persisted form of one item instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Instance id.
    pub id: ItemInstanceId,
    /// Item type id, resolved against the registry on load.
    pub type_id: ItemTypeId,
    /// Charge count.
    #[serde(default = "default_charges")]
    pub charges: u32,
    /// Accumulated rot.
    #[serde(default)]
    pub rot: f32,
    /// Temperature in degrees Celsius.
    #[serde(default = "default_temperature")]
    pub temperature_c: f32,
    /// The item's own tree, present exactly when the item is a container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<TreeRecord>,
}

fn default_charges() -> u32 {
    1
}
fn default_temperature() -> f32 {
    process::BASELINE_C
}

// ---------------------------------------------------------------------------
// Migration hook
// ---------------------------------------------------------------------------

/// Substitutions for item types that no longer exist, applied while loading
/// saved records and by [`ContainerTree::migrate_item`].
#[derive(Debug, Clone, Default)]
pub struct MigrationMap {
    map: HashMap<ItemTypeId, ItemTypeId>,
}

impl MigrationMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an obsolete type id to its replacement.
    pub fn add(&mut self, old: impl Into<String>, replacement: impl Into<String>) {
        self.map
            .insert(ItemTypeId::new(old), ItemTypeId::new(replacement));
    }

    /// Resolve a mapped id to a registered type, following substitution
    /// chains. Returns `None` when the id is unmapped or the chain never
    /// reaches a registered type (including cycles).
    #[must_use]
    pub fn resolve(&self, id: &ItemTypeId, registry: &ItemTypeRegistry) -> Option<Arc<ItemType>> {
        let mut current = self.map.get(id)?;
        let mut hops = 0;
        loop {
            if let Some(ty) = registry.get(current) {
                return Some(Arc::clone(ty));
            }
            hops += 1;
            if hops > self.map.len() {
                // Chain cycles without ever reaching a live type.
                return None;
            }
            current = self.map.get(current)?;
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Capture an item and everything inside it as a record.
#[must_use]
pub fn item_to_record(item: &Item) -> ItemRecord {
    ItemRecord {
        id: item.id(),
        type_id: item.type_id().clone(),
        charges: item.charges(),
        rot: item.rot(),
        temperature_c: item.temperature_c(),
        contents: item.contents().map(tree_to_record),
    }
}

/// Capture a container tree as a record.
#[must_use]
pub fn tree_to_record(tree: &ContainerTree) -> TreeRecord {
    TreeRecord {
        pockets: tree
            .pockets()
            .iter()
            .map(|p| PocketRecord {
                kind: p.saved_kind(),
                sealed: p.sealed(),
                items: p.items().iter().map(item_to_record).collect(),
            })
            .collect(),
    }
}

/// Rebuild an item from its record.
///
/// # Errors
///
/// [`StowageError::UnknownItemType`] when the type id is unregistered and
/// the migration map offers no live substitute;
/// [`StowageError::DataIntegrity`] when the saved structure contradicts the
/// (possibly substituted) type's pocket templates.
pub fn item_from_record(
    rec: ItemRecord,
    registry: &ItemTypeRegistry,
    migrations: &MigrationMap,
) -> Result<Item> {
    let item_type = match registry.get(&rec.type_id) {
        Some(ty) => Arc::clone(ty),
        None => {
            let substitute = migrations
                .resolve(&rec.type_id, registry)
                .ok_or_else(|| StowageError::UnknownItemType(rec.type_id.clone()))?;
            warn!(from = %rec.type_id, to = %substitute.id, "substituting migrated item type");
            substitute
        }
    };

    let contents = match rec.contents {
        Some(tree_rec) => {
            if item_type.pockets.is_empty() {
                return Err(StowageError::integrity(format!(
                    "saved contents for {}, which defines no pockets",
                    item_type.id
                )));
            }
            Some(tree_from_record(
                tree_rec,
                &item_type.pockets,
                registry,
                migrations,
            )?)
        }
        None if item_type.pockets.is_empty() => None,
        // A container item saved before it ever held anything.
        None => Some(ContainerTree::new(&item_type.pockets)),
    };

    Ok(Item::from_saved(
        rec.id,
        item_type,
        rec.charges,
        rec.rot,
        rec.temperature_c,
        contents,
    ))
}

/// Rebuild a container tree against a template list.
///
/// Missing trailing pocket records load as empty pockets (the template list
/// grew); surplus records or a kind mismatch are data-integrity errors.
///
/// # Errors
/// Returns [`StowageError::DataIntegrity`] as described above.
pub fn tree_from_record(
    rec: TreeRecord,
    templates: &[Arc<PocketTemplate>],
    registry: &ItemTypeRegistry,
    migrations: &MigrationMap,
) -> Result<ContainerTree> {
    if rec.pockets.len() > templates.len() {
        return Err(StowageError::integrity(format!(
            "{} saved pockets but only {} templates",
            rec.pockets.len(),
            templates.len()
        )));
    }
    let mut saved = rec.pockets.into_iter();
    let mut pockets = Vec::with_capacity(templates.len());
    for template in templates {
        match saved.next() {
            Some(p_rec) => {
                if p_rec.kind != template.kind {
                    return Err(StowageError::integrity(format!(
                        "saved pocket kind {} does not match template kind {}",
                        p_rec.kind, template.kind
                    )));
                }
                let mut items = Vec::with_capacity(p_rec.items.len());
                for item_rec in p_rec.items {
                    items.push(item_from_record(item_rec, registry, migrations)?);
                }
                pockets.push(Pocket::from_saved(
                    Arc::clone(template),
                    p_rec.sealed,
                    items,
                ));
            }
            None => pockets.push(Pocket::new(Arc::clone(template))),
        }
    }
    Ok(ContainerTree::from_pockets(pockets))
}

// ---------------------------------------------------------------------------
// Byte-level helpers for the save store
// ---------------------------------------------------------------------------

/// Serialize an item record to JSON bytes.
///
/// # Errors
/// Returns [`StowageError::Serialization`] on encoder failure.
pub fn serialize_item(item: &Item) -> Result<Vec<u8>> {
    serde_json::to_vec(&item_to_record(item))
        .map_err(|e| StowageError::Serialization(e.to_string()))
}

/// Deserialize JSON bytes back into an item.
///
/// # Errors
/// Returns [`StowageError::Serialization`] on malformed JSON, and the
/// [`item_from_record`] errors on structural mismatch.
pub fn deserialize_item(
    bytes: &[u8],
    registry: &ItemTypeRegistry,
    migrations: &MigrationMap,
) -> Result<Item> {
    let rec: ItemRecord =
        serde_json::from_slice(bytes).map_err(|e| StowageError::Serialization(e.to_string()))?;
    item_from_record(rec, registry, migrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::PocketKind;
    use crate::types::{Volume, Weight};
    use std::collections::BTreeSet;

    fn container_template(ml: i64) -> Arc<PocketTemplate> {
        Arc::new(PocketTemplate {
            kind: PocketKind::Container,
            max_volume: Volume::from_milliliters(ml),
            min_item_volume: Volume::ZERO,
            max_weight: Weight::from_kilograms(50),
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

    fn sample_registry() -> ItemTypeRegistry {
        let mut registry = ItemTypeRegistry::new();
        registry.register(
            ItemType::new(
                "canteen",
                Volume::from_milliliters(100),
                Weight::from_grams(150),
            )
            .with_pockets(vec![container_template(1500)]),
        );
        registry.register(ItemType::new(
            "ration",
            Volume::from_milliliters(200),
            Weight::from_grams(300),
        ));
        registry
    }

    fn sample_canteen(registry: &ItemTypeRegistry) -> Item {
        let canteen_ty = registry.get(&ItemTypeId::new("canteen")).expect("canteen");
        let ration_ty = registry.get(&ItemTypeId::new("ration")).expect("ration");
        let mut canteen = Item::new(Arc::clone(canteen_ty));
        canteen
            .contents_mut()
            .expect("tree")
            .insert_item(Item::new(Arc::clone(ration_ty)), PocketKind::Container)
            .expect("fits");
        canteen
    }

    #[test]
    fn round_trip_preserves_structure_and_aggregates() {
        let registry = sample_registry();
        let migrations = MigrationMap::new();
        let canteen = sample_canteen(&registry);

        let bytes = serialize_item(&canteen).expect("serialize");
        let loaded = deserialize_item(&bytes, &registry, &migrations).expect("deserialize");

        assert_eq!(loaded.id(), canteen.id());
        assert_eq!(loaded.volume(), canteen.volume());
        assert_eq!(loaded.weight(), canteen.weight());
        let original: Vec<_> = canteen
            .contents()
            .expect("tree")
            .all_items_top()
            .iter()
            .map(|it| it.id())
            .collect();
        let restored: Vec<_> = loaded
            .contents()
            .expect("tree")
            .all_items_top()
            .iter()
            .map(|it| it.id())
            .collect();
        assert_eq!(original, restored);
    }

    #[test]
    fn kind_mismatch_is_a_data_integrity_error() {
        let registry = sample_registry();
        let migrations = MigrationMap::new();
        let canteen = sample_canteen(&registry);

        let mut rec = item_to_record(&canteen);
        rec.contents.as_mut().expect("tree").pockets[0].kind = PocketKind::Magazine;
        let err = item_from_record(rec, &registry, &migrations).expect_err("mismatch");
        assert!(matches!(err, StowageError::DataIntegrity { .. }));
    }

    #[test]
    fn surplus_saved_pockets_rejected_missing_load_empty() {
        let registry = sample_registry();
        let migrations = MigrationMap::new();
        let canteen = sample_canteen(&registry);
        let templates = &registry
            .get(&ItemTypeId::new("canteen"))
            .expect("canteen")
            .pockets;

        let mut surplus = tree_to_record(canteen.contents().expect("tree"));
        surplus.pockets.push(surplus.pockets[0].clone());
        assert!(tree_from_record(surplus, templates, &registry, &migrations).is_err());

        let empty = TreeRecord { pockets: vec![] };
        let tree = tree_from_record(empty, templates, &registry, &migrations).expect("empty ok");
        assert_eq!(tree.num_pockets(), 1);
        assert!(tree.is_empty());
    }

    #[test]
    fn unknown_type_fails_unless_migrated() {
        let registry = sample_registry();
        let canteen = sample_canteen(&registry);
        let mut rec = item_to_record(&canteen);
        rec.contents.as_mut().expect("tree").pockets[0].items[0].type_id =
            ItemTypeId::new("mre_2019");

        let err = item_from_record(rec.clone(), &registry, &MigrationMap::new())
            .expect_err("unknown type");
        assert!(matches!(err, StowageError::UnknownItemType(_)));

        let mut migrations = MigrationMap::new();
        migrations.add("mre_2019", "ration");
        let loaded = item_from_record(rec, &registry, &migrations).expect("migrated");
        let inner = loaded.contents().expect("tree").all_items_top()[0]
            .type_id()
            .clone();
        assert_eq!(inner, ItemTypeId::new("ration"));
    }

    #[test]
    fn migration_chains_resolve_but_cycles_do_not() {
        let registry = sample_registry();
        let mut migrations = MigrationMap::new();
        migrations.add("a", "b");
        migrations.add("b", "ration");
        assert!(
            migrations
                .resolve(&ItemTypeId::new("a"), &registry)
                .is_some()
        );

        let mut cyclic = MigrationMap::new();
        cyclic.add("x", "y");
        cyclic.add("y", "x");
        assert!(cyclic.resolve(&ItemTypeId::new("x"), &registry).is_none());
    }

    #[test]
    fn sealed_state_round_trips() {
        let registry = sample_registry();
        let migrations = MigrationMap::new();
        let mut canteen = sample_canteen(&registry);
        assert!(
            canteen
                .contents_mut()
                .expect("tree")
                .pocket_mut(0)
                .expect("pocket")
                .seal()
        );

        let bytes = serialize_item(&canteen).expect("serialize");
        let loaded = deserialize_item(&bytes, &registry, &migrations).expect("deserialize");
        assert!(loaded.contents().expect("tree").pockets()[0].sealed());
    }
}
