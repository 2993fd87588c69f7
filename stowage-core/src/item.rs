//! Item type definitions and runtime item instances.
//!
//! An [`ItemType`] is immutable and shared (`Arc`) by every instance of that
//! type, exactly like pocket templates. An [`Item`] is one runtime instance:
//! its charges, rot, temperature, and — when the type defines pockets — its
//! own [`ContainerTree`], recursively.
//!
//! Acyclicity (no item type transitively containing itself) is a
//! precondition on whoever authors item definitions, not enforced here.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::contents::ContainerTree;
use crate::process;
use crate::template::{PocketKind, PocketTemplate};
use crate::types::{
    Ambient, AmmoTypeId, FlagId, ItemInstanceId, ItemTypeId, Phase, Volume, Weight,
};

// ---------------------------------------------------------------------------
// ItemType
// ---------------------------------------------------------------------------

/// Immutable definition of an item type.
///
/// For charge-counted types, `volume` and `weight` describe `stack_size`
/// charges; a partial stack scales down (rounding up, so it never reports
/// zero volume).
#[derive(Debug, Clone, PartialEq)]
pub struct ItemType {
    /// Type identifier.
    pub id: ItemTypeId,
    /// Volume of one item (or of `stack_size` charges).
    pub volume: Volume,
    /// Weight of one item (or of `stack_size` charges).
    pub weight: Weight,
    /// Physical phase.
    pub phase: Phase,
    /// Tags matched against pocket flag restrictions.
    pub flags: BTreeSet<FlagId>,
    /// Ammunition type, for items usable as ammo.
    pub ammo_type: Option<AmmoTypeId>,
    /// Whether instances merge by charge count rather than existing as
    /// separate entries.
    pub counts_by_charges: bool,
    /// Charges described by `volume`/`weight` when charge-counted.
    pub stack_size: u32,
    /// Shelf life in game ticks; `None` never spoils.
    pub spoils_in: Option<u64>,
    /// Whether this item is a weapon/tool modification.
    pub is_gunmod: bool,
    /// Pocket templates instantiated for every instance of this type.
    pub pockets: Vec<Arc<PocketTemplate>>,
}

impl ItemType {
    /// Create a plain solid item type with no pockets.
    #[must_use]
    pub fn new(id: impl Into<String>, volume: Volume, weight: Weight) -> Self {
        Self {
            id: ItemTypeId::new(id),
            volume,
            weight,
            phase: Phase::Solid,
            flags: BTreeSet::new(),
            ammo_type: None,
            counts_by_charges: false,
            stack_size: 1,
            spoils_in: None,
            is_gunmod: false,
            pockets: Vec::new(),
        }
    }

    /// Set the phase.
    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Add tags.
    #[must_use]
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(FlagId::new));
        self
    }

    /// Mark as ammunition of the given type.
    #[must_use]
    pub fn with_ammo_type(mut self, ammo: impl Into<String>) -> Self {
        self.ammo_type = Some(AmmoTypeId::new(ammo));
        self
    }

    /// Make the type charge-counted; `volume`/`weight` now describe
    /// `stack_size` charges.
    #[must_use]
    pub fn with_charges(mut self, stack_size: u32) -> Self {
        self.counts_by_charges = true;
        self.stack_size = stack_size.max(1);
        self
    }

    /// Give the type a shelf life in game ticks.
    #[must_use]
    pub fn with_spoils_in(mut self, ticks: u64) -> Self {
        self.spoils_in = Some(ticks);
        self
    }

    /// Mark as a weapon/tool modification.
    #[must_use]
    pub fn gunmod(mut self) -> Self {
        self.is_gunmod = true;
        self
    }

    /// Attach pocket templates; every instance gets a tree built from them.
    #[must_use]
    pub fn with_pockets(mut self, pockets: Vec<Arc<PocketTemplate>>) -> Self {
        self.pockets = pockets;
        self
    }

    /// Whether the type defines a pocket of the given kind.
    #[must_use]
    pub fn has_pocket_kind(&self, kind: PocketKind) -> bool {
        self.pockets.iter().any(|t| t.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Shared lookup of item types by id; deserialization consults it to rebuild
/// saved items.
#[derive(Debug, Default)]
pub struct ItemTypeRegistry {
    types: HashMap<ItemTypeId, Arc<ItemType>>,
}

impl ItemTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, returning the shared handle. A later registration
    /// under the same id replaces the earlier one.
    pub fn register(&mut self, item_type: ItemType) -> Arc<ItemType> {
        let arc = Arc::new(item_type);
        self.types.insert(arc.id.clone(), Arc::clone(&arc));
        arc
    }

    /// Look up a type by id.
    #[must_use]
    pub fn get(&self, id: &ItemTypeId) -> Option<&Arc<ItemType>> {
        self.types.get(id)
    }

    /// Whether a type with the given id is registered.
    #[must_use]
    pub fn contains(&self, id: &ItemTypeId) -> bool {
        self.types.contains_key(id)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One runtime item instance.
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemInstanceId,
    item_type: Arc<ItemType>,
    charges: u32,
    rot: f32,
    temperature_c: f32,
    contents: Option<ContainerTree>,
}

impl Item {
    /// Instantiate an item of the given type, with one charge and a fresh
    /// container tree when the type defines pockets.
    #[must_use]
    pub fn new(item_type: Arc<ItemType>) -> Self {
        let contents = if item_type.pockets.is_empty() {
            None
        } else {
            Some(ContainerTree::new(&item_type.pockets))
        };
        Self {
            id: ItemInstanceId::new(),
            item_type,
            charges: 1,
            rot: 0.0,
            temperature_c: process::BASELINE_C,
            contents,
        }
    }

    /// Set the charge count.
    #[must_use]
    pub fn with_charges(mut self, charges: u32) -> Self {
        self.charges = charges;
        self
    }

    /// Rebuild an instance from persisted state. Only the save layer should
    /// need this.
    #[must_use]
    pub(crate) fn from_saved(
        id: ItemInstanceId,
        item_type: Arc<ItemType>,
        charges: u32,
        rot: f32,
        temperature_c: f32,
        contents: Option<ContainerTree>,
    ) -> Self {
        Self {
            id,
            item_type,
            charges,
            rot,
            temperature_c,
            contents,
        }
    }

    /// Instance id.
    #[must_use]
    pub fn id(&self) -> ItemInstanceId {
        self.id
    }

    /// The shared type definition.
    #[must_use]
    pub fn item_type(&self) -> &Arc<ItemType> {
        &self.item_type
    }

    /// The type id.
    #[must_use]
    pub fn type_id(&self) -> &ItemTypeId {
        &self.item_type.id
    }

    /// Current charges.
    #[must_use]
    pub fn charges(&self) -> u32 {
        self.charges
    }

    /// How many units this entry represents: charges for charge-counted
    /// items, otherwise one.
    #[must_use]
    pub fn count(&self) -> u32 {
        if self.item_type.counts_by_charges {
            self.charges.max(1)
        } else {
            1
        }
    }

    /// Accumulated rot in `[0, 1]`-ish; the item is gone at 1.0.
    #[must_use]
    pub fn rot(&self) -> f32 {
        self.rot
    }

    /// Current temperature in degrees Celsius.
    #[must_use]
    pub fn temperature_c(&self) -> f32 {
        self.temperature_c
    }

    /// Physical phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.item_type.phase
    }

    /// Tags of the type.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<FlagId> {
        &self.item_type.flags
    }

    /// Ammo type, if the item is ammunition.
    #[must_use]
    pub fn ammo_type(&self) -> Option<&AmmoTypeId> {
        self.item_type.ammo_type.as_ref()
    }

    /// Whether instances merge by charges.
    #[must_use]
    pub fn counts_by_charges(&self) -> bool {
        self.item_type.counts_by_charges
    }

    /// Whether the item is a weapon/tool modification.
    #[must_use]
    pub fn is_gunmod(&self) -> bool {
        self.item_type.is_gunmod
    }

    /// The item's own container tree, when the type defines pockets.
    #[must_use]
    pub fn contents(&self) -> Option<&ContainerTree> {
        self.contents.as_ref()
    }

    /// Mutable access to the item's own container tree.
    pub fn contents_mut(&mut self) -> Option<&mut ContainerTree> {
        self.contents.as_mut()
    }

    /// Externally visible volume: the base (scaled by charges for
    /// charge-counted items) plus whatever non-rigid pockets add.
    #[must_use]
    pub fn volume(&self) -> Volume {
        let base = if self.item_type.counts_by_charges {
            self.item_type
                .volume
                .scaled(self.charges, self.item_type.stack_size)
        } else {
            self.item_type.volume
        };
        base + self
            .contents
            .as_ref()
            .map_or(Volume::ZERO, ContainerTree::item_size_modifier)
    }

    /// Externally visible weight: base plus contents, with per-pocket weight
    /// multipliers applied.
    #[must_use]
    pub fn weight(&self) -> Weight {
        let base = if self.item_type.counts_by_charges {
            self.item_type
                .weight
                .scaled(self.charges, self.item_type.stack_size)
        } else {
            self.item_type.weight
        };
        base + self
            .contents
            .as_ref()
            .map_or(Weight::ZERO, ContainerTree::item_weight_modifier)
    }

    /// Whether two items may share a stack: same type, same stack-relevant
    /// state, same contents. Charge counts are irrelevant — stacks merge
    /// their charges.
    ///
    /// Rot and temperature compare bitwise: entries in one stack must keep
    /// processing identically after the merge.
    #[must_use]
    pub fn stacks_with(&self, other: &Item) -> bool {
        self.item_type.id == other.item_type.id
            && self.rot.to_bits() == other.rot.to_bits()
            && self.temperature_c.to_bits() == other.temperature_c.to_bits()
            && match (&self.contents, &other.contents) {
                (None, None) => true,
                (Some(a), Some(b)) => a.stacks_with(b),
                _ => false,
            }
    }

    /// A one-charge copy with a fresh instance id, used when filling a
    /// container charge by charge.
    #[must_use]
    pub fn charge_increment(&self) -> Item {
        let mut unit = self.clone();
        unit.id = ItemInstanceId::new();
        unit.charges = 1;
        unit
    }

    /// Absorb another entry of the same stack.
    pub(crate) fn merge(&mut self, other: Item) {
        debug_assert!(self.stacks_with(&other));
        self.charges += other.charges;
    }

    /// Take `qty` charges out of this entry, leaving the rest.
    /// Returns how many were actually taken.
    pub(crate) fn draw_charges(&mut self, qty: u32) -> u32 {
        let taken = qty.min(self.charges);
        self.charges -= taken;
        taken
    }

    /// Advance rot and temperature for one pass; recurse into contents.
    /// Returns true when the item has rotted away and must be removed by its
    /// container. Nested casualties are pushed into `destroyed`.
    pub(crate) fn process(
        &mut self,
        ambient: &Ambient,
        spoil_multiplier: f32,
        destroyed: &mut Vec<Item>,
    ) -> bool {
        self.temperature_c = process::approach_ambient(self.temperature_c, ambient);
        if let Some(spoils_in) = self.item_type.spoils_in {
            let local = Ambient {
                temperature_c: self.temperature_c,
                ..*ambient
            };
            self.rot += process::rot_progress(&local, spoil_multiplier, spoils_in);
            if self.rot >= 1.0 {
                return true;
            }
        }
        if let Some(tree) = self.contents.as_mut() {
            tree.process_scaled(ambient, spoil_multiplier, destroyed);
        }
        false
    }

    /// Set the item and everything inside it to a temperature.
    pub fn heat_up(&mut self, temperature_c: f32) {
        self.temperature_c = temperature_c;
        if let Some(tree) = self.contents.as_mut() {
            tree.heat_up(temperature_c);
        }
    }

    /// Swap this item's type for a replacement, reshaping its tree when the
    /// pocket layouts differ. Contents that no longer fit anywhere are
    /// pushed into `displaced` rather than dropped.
    pub(crate) fn migrate_to(&mut self, new_type: Arc<ItemType>, displaced: &mut Vec<Item>) {
        let old_contents = self.contents.take();
        self.item_type = new_type;
        let templates = self.item_type.pockets.clone();

        match old_contents {
            None if templates.is_empty() => {}
            None => self.contents = Some(ContainerTree::new(&templates)),
            Some(old) if templates.is_empty() => displaced.extend(old.into_items()),
            Some(mut old) => {
                if old.matches_shape(&templates) {
                    old.rebind_templates(&templates);
                    self.contents = Some(old);
                } else {
                    let mut fresh = ContainerTree::new(&templates);
                    for it in old.into_items() {
                        if let Err(homeless) = fresh.insert_anywhere(it) {
                            displaced.push(homeless);
                        }
                    }
                    self.contents = Some(fresh);
                }
            }
        }
    }
}
