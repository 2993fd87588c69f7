//! A single runtime storage compartment governed by one template.
//!
//! A pocket's behavior is a pure function of its state: the shared template,
//! the ordered item sequence (insertion order is display/removal order; the
//! most recently inserted item is at the back), and the sealed flag.
//!
//! Acceptance checks run in a fixed order and the first failing check wins;
//! rejection codes are never combined.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::item::Item;
use crate::process;
use crate::template::{PocketKind, PocketTemplate};
use crate::types::{Ambient, ItemInstanceId, Phase, Position, Volume, Weight};

// ---------------------------------------------------------------------------
// Rejection taxonomy
// ---------------------------------------------------------------------------

/// Why a pocket refused an item. Recoverable by design: the caller picks a
/// fallback pocket or surfaces the reason.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Non-modification item offered to a mod-only pocket.
    #[error("only weapon/tool modifications fit in this pocket")]
    WrongKind,
    /// Liquid offered to a non-watertight pocket.
    #[error("liquids need a watertight pocket")]
    LiquidNeedsWatertight,
    /// Gas offered to a non-gastight pocket.
    #[error("gases need a gastight pocket")]
    GasNeedsGastight,
    /// Would not fit even if the pocket were empty.
    #[error("item is too big for this pocket")]
    TooBig,
    /// Would be too heavy even if the pocket were empty.
    #[error("item is too heavy for this pocket")]
    TooHeavy,
    /// Smaller than the pocket's minimum item volume.
    #[error("item is too small to be kept in this pocket")]
    BelowMinVolume,
    /// Insufficient room given the current contents.
    #[error("not enough space left in this pocket")]
    NoSpaceLeft,
    /// Insufficient weight budget given the current contents.
    #[error("this pocket cannot support any more weight")]
    OverWeight,
    /// Item lacks every flag the pocket requires.
    #[error("item is missing a flag this pocket requires")]
    MissingFlag,
    /// Item is not of the pocket's restricted ammo type.
    #[error("this pocket only accepts specific ammunition")]
    WrongAmmoType,
}

/// A refused insertion, handing the item back untouched.
#[derive(Debug)]
pub struct InsertFailure {
    /// The item, unchanged.
    pub item: Item,
    /// Why it was refused.
    pub rejection: Rejection,
}

impl InsertFailure {
    /// Recover the item.
    #[must_use]
    pub fn into_item(self) -> Item {
        self.item
    }
}

/// An item forcibly ejected from an over-budget pocket.
#[derive(Debug)]
pub struct Spill {
    /// The ejected item.
    pub item: Item,
    /// Where it landed.
    pub position: Position,
}

// ---------------------------------------------------------------------------
// Pocket
// ---------------------------------------------------------------------------

/// A runtime storage compartment referencing a shared [`PocketTemplate`].
#[derive(Debug, Clone)]
pub struct Pocket {
    template: Arc<PocketTemplate>,
    /// Kind persisted with the pocket; must match the template on reload.
    saved_kind: PocketKind,
    contents: Vec<Item>,
    sealed: bool,
    /// A non-resealable pocket that has had a content change can never be
    /// sealed again.
    disturbed: bool,
}

impl Pocket {
    /// Create an empty, unsealed pocket for the given template.
    #[must_use]
    pub fn new(template: Arc<PocketTemplate>) -> Self {
        Self {
            saved_kind: template.kind,
            template,
            contents: Vec::new(),
            sealed: false,
            disturbed: false,
        }
    }

    /// Rebuild a pocket from persisted state. The save layer has already
    /// verified the saved kind against the template.
    pub(crate) fn from_saved(template: Arc<PocketTemplate>, sealed: bool, items: Vec<Item>) -> Self {
        // An open non-resealable pocket was necessarily disturbed before the save.
        let disturbed = !template.resealable && !sealed;
        Self {
            saved_kind: template.kind,
            template,
            contents: items,
            sealed,
            disturbed,
        }
    }

    /// The governing template.
    #[must_use]
    pub fn template(&self) -> &Arc<PocketTemplate> {
        &self.template
    }

    /// The pocket kind.
    #[must_use]
    pub fn kind(&self) -> PocketKind {
        self.template.kind
    }

    /// Whether the pocket is of the given kind.
    #[must_use]
    pub fn is_kind(&self, kind: PocketKind) -> bool {
        self.template.kind == kind
    }

    /// The kind tag as persisted.
    #[must_use]
    pub fn saved_kind(&self) -> PocketKind {
        self.saved_kind
    }

    /// Whether contents do not enlarge the owning item.
    #[must_use]
    pub fn rigid(&self) -> bool {
        self.template.rigid
    }

    /// Whether the pocket can hold liquids.
    #[must_use]
    pub fn watertight(&self) -> bool {
        self.template.watertight
    }

    /// Whether the pocket is currently sealed.
    #[must_use]
    pub fn sealed(&self) -> bool {
        self.sealed
    }

    /// Base move cost of retrieving an item from this pocket.
    #[must_use]
    pub fn move_cost(&self) -> u32 {
        self.template.base_move_cost
    }

    /// Whether the pocket holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Whether no further volume remains.
    #[must_use]
    pub fn full(&self) -> bool {
        self.remaining_volume() == Volume::ZERO
    }

    /// Number of entries in the sequence. Prefer [`Self::num_item_stacks`]
    /// for user-facing counts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// The contained items, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.contents
    }

    pub(crate) fn items_mut(&mut self) -> &mut [Item] {
        &mut self.contents
    }

    /// Oldest item, if any.
    #[must_use]
    pub fn front(&self) -> Option<&Item> {
        self.contents.first()
    }

    /// Most recently inserted item, if any.
    #[must_use]
    pub fn back(&self) -> Option<&Item> {
        self.contents.last()
    }

    // ------------------------------------------------------------------
    // Acceptance
    // ------------------------------------------------------------------

    /// Classify whether this pocket accepts `it` right now.
    ///
    /// Checks run in fixed order — kind, phase, size, weight, restrictions —
    /// and the first failure is returned.
    ///
    /// # Errors
    /// Returns the first failing [`Rejection`].
    pub fn can_contain(&self, it: &Item) -> Result<(), Rejection> {
        if self.template.kind == PocketKind::ModSlot && !it.is_gunmod() {
            return Err(Rejection::WrongKind);
        }
        match it.phase() {
            Phase::Liquid if !self.template.watertight => {
                return Err(Rejection::LiquidNeedsWatertight);
            }
            Phase::Gas if !self.template.gastight => {
                return Err(Rejection::GasNeedsGastight);
            }
            _ => {}
        }
        if it.volume() < self.template.min_item_volume {
            return Err(Rejection::BelowMinVolume);
        }
        if it.volume() > self.template.max_volume {
            return Err(Rejection::TooBig);
        }
        if !self.fits_count(it) || it.volume() > self.remaining_volume() {
            return Err(Rejection::NoSpaceLeft);
        }
        if it.weight() > self.template.max_weight {
            return Err(Rejection::TooHeavy);
        }
        if it.weight() > self.remaining_weight() {
            return Err(Rejection::OverWeight);
        }
        if !self.template.flag_restriction.is_empty()
            && !it.tags().iter().any(|t| self.template.flag_restriction.contains(t))
        {
            return Err(Rejection::MissingFlag);
        }
        if !self.template.ammo_restriction.is_empty() {
            match it.ammo_type() {
                Some(ammo) if self.template.ammo_restriction.contains(ammo) => {}
                _ => return Err(Rejection::WrongAmmoType),
            }
        }
        Ok(())
    }

    fn fits_count(&self, it: &Item) -> bool {
        let Some(over) = self.template.number_override else {
            return true;
        };
        if over.stacks {
            // Merging into an existing stack never adds a stack.
            self.has_item_stacks_with(it) || self.num_item_stacks() < over.count as usize
        } else {
            let total: u64 = self.contents.iter().map(|c| u64::from(c.count())).sum();
            total + u64::from(it.count()) <= u64::from(over.count)
        }
    }

    // ------------------------------------------------------------------
    // Insertion and removal
    // ------------------------------------------------------------------

    /// Insert an item, all-or-nothing: on success it is appended at the back
    /// (merging into an existing stack where possible); on failure the
    /// sequence is unchanged and the item is handed back.
    ///
    /// # Errors
    /// Returns an [`InsertFailure`] carrying the item and the rejection.
    pub fn insert_item(&mut self, item: Item) -> Result<(), InsertFailure> {
        if let Err(rejection) = self.can_contain(&item) {
            return Err(InsertFailure { item, rejection });
        }
        debug!(item = %item.type_id(), kind = %self.template.kind, "inserting item");
        self.contents.push(item);
        self.restack();
        self.on_contents_changed();
        Ok(())
    }

    /// Append an item with no checks. Only for trusted paths: the legacy
    /// flat-list adapter and tests that need an over-budget pocket.
    /// [`Self::overflow`] restores the capacity invariant afterwards.
    pub fn add_unchecked(&mut self, item: Item) {
        self.contents.push(item);
        self.on_contents_changed();
    }

    /// Remove and return the item with the given instance id, if present.
    pub fn remove_item(&mut self, id: ItemInstanceId) -> Option<Item> {
        let idx = self.contents.iter().position(|it| it.id() == id)?;
        let item = self.contents.remove(idx);
        self.on_contents_changed();
        Some(item)
    }

    /// Remove and return every item matching the filter (this pocket only,
    /// not recursive — [`crate::contents::ContainerTree::remove_items_if`]
    /// walks the whole tree).
    pub fn remove_items_if<F: Fn(&Item) -> bool>(&mut self, filter: F) -> Vec<Item> {
        let mut kept = Vec::with_capacity(self.contents.len());
        let mut removed = Vec::new();
        for item in self.contents.drain(..) {
            if filter(&item) {
                removed.push(item);
            } else {
                kept.push(item);
            }
        }
        self.contents = kept;
        if !removed.is_empty() {
            self.on_contents_changed();
        }
        removed
    }

    /// Empty the pocket, returning everything it held.
    pub fn clear_items(&mut self) -> Vec<Item> {
        let out: Vec<Item> = self.contents.drain(..).collect();
        if !out.is_empty() {
            self.on_contents_changed();
        }
        out
    }

    /// First contained item matching the filter, not recursive.
    #[must_use]
    pub fn get_item_with<F: Fn(&Item) -> bool>(&self, filter: F) -> Option<&Item> {
        self.contents.iter().find(|it| filter(it))
    }

    /// Whether any contained item matches the filter, not recursive.
    #[must_use]
    pub fn has_any_with<F: Fn(&Item) -> bool>(&self, filter: F) -> bool {
        self.contents.iter().any(|it| filter(it))
    }

    /// Subtree removal worker shared with the tree: partitions this pocket's
    /// sequence, then recurses into kept container items, so the sequence
    /// being iterated is never mutated in place.
    pub(crate) fn remove_internal<F: Fn(&Item) -> bool>(
        &mut self,
        filter: &F,
        count: &mut usize,
        out: &mut Vec<Item>,
    ) {
        if *count == 0 {
            return;
        }
        let mut kept = Vec::with_capacity(self.contents.len());
        let mut changed = false;
        for mut item in self.contents.drain(..) {
            if *count > 0 && filter(&item) {
                *count -= 1;
                changed = true;
                out.push(item);
            } else {
                if *count > 0 {
                    if let Some(tree) = item.contents_mut() {
                        tree.remove_internal_into(filter, count, out);
                    }
                }
                kept.push(item);
            }
        }
        self.contents = kept;
        if changed {
            self.on_contents_changed();
        }
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Combined volume of contained items.
    #[must_use]
    pub fn contains_volume(&self) -> Volume {
        self.contents.iter().map(Item::volume).sum()
    }

    /// Total volume the template admits.
    #[must_use]
    pub fn volume_capacity(&self) -> Volume {
        self.template.max_volume
    }

    /// Free volume, floored at zero.
    #[must_use]
    pub fn remaining_volume(&self) -> Volume {
        self.volume_capacity().saturating_sub(self.contains_volume())
    }

    /// Combined weight of contained items.
    #[must_use]
    pub fn contains_weight(&self) -> Weight {
        self.contents.iter().map(Item::weight).sum()
    }

    /// Total weight the template supports.
    #[must_use]
    pub fn weight_capacity(&self) -> Weight {
        self.template.max_weight
    }

    /// Free weight budget, floored at zero.
    #[must_use]
    pub fn remaining_weight(&self) -> Weight {
        self.weight_capacity().saturating_sub(self.contains_weight())
    }

    /// How much this pocket enlarges the owning item: nothing when rigid,
    /// otherwise the contained volume less the magazine well.
    #[must_use]
    pub fn item_size_modifier(&self) -> Volume {
        if self.template.rigid {
            Volume::ZERO
        } else {
            self.contains_volume().saturating_sub(self.template.magazine_well)
        }
    }

    /// How much this pocket adds to the owning item's weight, after the
    /// template's weight multiplier.
    #[must_use]
    pub fn item_weight_modifier(&self) -> Weight {
        self.contains_weight().scaled_by(self.template.weight_multiplier)
    }

    /// Number of item stacks: each non-mergeable entry counts individually,
    /// mergeable entries count once per distinct stack.
    #[must_use]
    pub fn num_item_stacks(&self) -> usize {
        let mut stacks: Vec<&Item> = Vec::new();
        for it in &self.contents {
            if it.counts_by_charges() && stacks.iter().any(|s| s.stacks_with(it)) {
                continue;
            }
            stacks.push(it);
        }
        stacks.len()
    }

    // ------------------------------------------------------------------
    // Stacking
    // ------------------------------------------------------------------

    /// Whether any contained item would share a stack with `it`.
    #[must_use]
    pub fn has_item_stacks_with(&self, it: &Item) -> bool {
        self.contents.iter().any(|c| c.stacks_with(it))
    }

    /// Whether this pocket holds exactly the same sequence as `other`.
    #[must_use]
    pub fn same_contents(&self, other: &Pocket) -> bool {
        self.contents.len() == other.contents.len()
            && self
                .contents
                .iter()
                .zip(&other.contents)
                .all(|(a, b)| a.stacks_with(b) && a.charges() == b.charges())
    }

    /// Whether two pockets are interchangeable for item stacking: same
    /// template shape, same seal state, same contents.
    #[must_use]
    pub fn stacks_with(&self, other: &Pocket) -> bool {
        *self.template == *other.template
            && self.sealed == other.sealed
            && self.same_contents(other)
    }

    /// Merge mutually stackable charge-counted entries into counted stacks.
    /// Stable by first-seen order, and idempotent.
    pub fn restack(&mut self) {
        let mut i = 0;
        while i < self.contents.len() {
            if self.contents[i].counts_by_charges() {
                let mut j = i + 1;
                while j < self.contents.len() {
                    if self.contents[j].counts_by_charges()
                        && self.contents[i].stacks_with(&self.contents[j])
                    {
                        let absorbed = self.contents.remove(j);
                        self.contents[i].merge(absorbed);
                    } else {
                        j += 1;
                    }
                }
            }
            i += 1;
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Whether `other` should win over `self` as the destination for `it`.
    ///
    /// Precedence: an existing mergeable stack, then watertightness for
    /// liquids, then the tightest remaining-volume fit, then the lower base
    /// move cost. Ties keep `self`, so selection over an ordered pocket
    /// sequence is deterministic.
    #[must_use]
    pub fn better_pocket(&self, other: &Pocket, it: &Item) -> bool {
        let here = self.has_item_stacks_with(it);
        let there = other.has_item_stacks_with(it);
        if here != there {
            return there;
        }
        if it.phase() == Phase::Liquid && self.watertight() != other.watertight() {
            return other.watertight();
        }
        if self.remaining_volume() != other.remaining_volume() {
            return other.remaining_volume() < self.remaining_volume();
        }
        other.move_cost() < self.move_cost()
    }

    // ------------------------------------------------------------------
    // Spill
    // ------------------------------------------------------------------

    /// While contents exceed the volume or weight budget, eject the single
    /// largest-volume item (ties broken first-inserted-first), re-checking
    /// after each eviction. Every ejected item is reported at `position`.
    pub fn overflow(&mut self, position: Position) -> Vec<Spill> {
        let mut spills = Vec::new();
        while !self.contents.is_empty()
            && (self.contains_volume() > self.volume_capacity()
                || self.contains_weight() > self.weight_capacity())
        {
            let mut idx = 0;
            for i in 1..self.contents.len() {
                if self.contents[i].volume() > self.contents[idx].volume() {
                    idx = i;
                }
            }
            let item = self.contents.remove(idx);
            warn!(item = %item.type_id(), at = %position, "pocket over budget, spilling");
            spills.push(Spill { item, position });
        }
        if !spills.is_empty() {
            self.on_contents_changed();
        }
        spills
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    /// Advance spoilage/temperature of contents for one pass. Items that
    /// rot away are removed — without skipping or revisiting their
    /// neighbors — and returned.
    pub fn process(&mut self, ambient: &Ambient) -> Vec<Item> {
        let mut destroyed = Vec::new();
        self.process_scaled(ambient, 1.0, &mut destroyed);
        destroyed
    }

    pub(crate) fn process_scaled(
        &mut self,
        ambient: &Ambient,
        parent_multiplier: f32,
        destroyed: &mut Vec<Item>,
    ) {
        let multiplier = parent_multiplier * self.template.spoil_multiplier;
        let mut inner = *ambient;
        if self.template.fire_protection
            && self.sealed
            && inner.temperature_c > process::FIRE_SHIELD_CEILING_C
        {
            inner.temperature_c = process::FIRE_SHIELD_CEILING_C;
        }
        let mut removed_any = false;
        let mut i = 0;
        while i < self.contents.len() {
            if self.contents[i].process(&inner, multiplier, destroyed) {
                let gone = self.contents.remove(i);
                debug!(item = %gone.type_id(), "item rotted away");
                destroyed.push(gone);
                removed_any = true;
            } else {
                i += 1;
            }
        }
        if removed_any {
            self.on_contents_changed();
        }
    }

    /// Set all contained items (recursively) to a temperature.
    pub fn heat_up(&mut self, temperature_c: f32) {
        for item in &mut self.contents {
            item.heat_up(temperature_c);
        }
    }

    /// Draw up to `qty` charges from the front of the sequence, removing
    /// depleted entries. Returns how many charges were consumed.
    pub fn ammo_consume(&mut self, qty: u32) -> u32 {
        let mut consumed = 0;
        while consumed < qty && !self.contents.is_empty() {
            let front = &mut self.contents[0];
            consumed += front.draw_charges(qty - consumed);
            if front.charges() == 0 {
                self.contents.remove(0);
            } else {
                break;
            }
        }
        if consumed > 0 {
            self.on_contents_changed();
        }
        consumed
    }

    // ------------------------------------------------------------------
    // Sealing
    // ------------------------------------------------------------------

    /// Seal the pocket. Fails once a non-resealable pocket has been
    /// disturbed.
    pub fn seal(&mut self) -> bool {
        if !self.template.resealable && self.disturbed {
            return false;
        }
        self.sealed = true;
        true
    }

    /// Open the pocket. For non-resealable templates this is permanent.
    pub fn unseal(&mut self) {
        self.sealed = false;
        if !self.template.resealable {
            self.disturbed = true;
        }
    }

    fn on_contents_changed(&mut self) {
        self.sealed = false;
        if !self.template.resealable {
            self.disturbed = true;
        }
    }

    pub(crate) fn rebind_template(&mut self, template: Arc<PocketTemplate>) {
        self.saved_kind = template.kind;
        self.template = template;
    }

    pub(crate) fn into_items(self) -> Vec<Item> {
        self.contents
    }
}
