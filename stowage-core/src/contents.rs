//! The container tree — the ordered set of all pockets belonging to one
//! item instance.
//!
//! Insertion queries flow top-down: the tree picks candidate pockets, each
//! pocket evaluates acceptance on its own, and the tree applies the
//! best-fit tie-break. Aggregate queries flow bottom-up, summing pockets.
//!
//! Nested selection is path-based: a read-only walk picks the winning
//! pocket, then a second resolution step produces the mutable handle. The
//! same two-phase shape covers structural removal, so no sequence is ever
//! mutated while it is being iterated.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, StowageError};
use crate::item::{Item, ItemTypeRegistry};
use crate::pocket::{InsertFailure, Pocket, Spill};
use crate::save::MigrationMap;
use crate::template::{PocketKind, PocketTemplate};
use crate::types::{Ambient, ItemInstanceId, Position, Volume, Weight};

// ---------------------------------------------------------------------------
// Visitor protocol
// ---------------------------------------------------------------------------

/// What a visitor wants done after seeing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResponse {
    /// Keep walking, descending into this item's own pockets.
    Continue,
    /// Keep walking but do not descend into this item.
    SkipChildren,
    /// Stop the whole walk immediately.
    Abort,
}

/// A failed tree-level insertion.
#[derive(Debug)]
pub enum InsertError {
    /// No pocket of the requested kind qualified; the item is handed back.
    NoPocket(Item),
    /// The chosen pocket refused the item.
    Rejected(InsertFailure),
}

impl InsertError {
    /// Recover the item.
    #[must_use]
    pub fn into_item(self) -> Item {
        match self {
            Self::NoPocket(item) => item,
            Self::Rejected(failure) => failure.into_item(),
        }
    }
}

/// Where a selected pocket lives: alternating (pocket, item) descents from
/// the root tree, then the pocket index in the final tree.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PocketPath {
    steps: Vec<(usize, usize)>,
    pocket: usize,
}

// ---------------------------------------------------------------------------
// ContainerTree
// ---------------------------------------------------------------------------

/// The ordered pockets of one item instance.
#[derive(Debug, Clone)]
pub struct ContainerTree {
    pockets: Vec<Pocket>,
}

impl ContainerTree {
    /// Build a tree with one empty pocket per template, in template order.
    #[must_use]
    pub fn new(templates: &[Arc<PocketTemplate>]) -> Self {
        Self {
            pockets: templates.iter().map(|t| Pocket::new(Arc::clone(t))).collect(),
        }
    }

    pub(crate) fn from_pockets(pockets: Vec<Pocket>) -> Self {
        Self { pockets }
    }

    /// Transitional adapter for saves that predate pockets: consolidate a
    /// flat item list into the first compatible container pocket. Items
    /// nothing accepts are force-added to the first container pocket so no
    /// legacy data is dropped; a later [`Self::overflow`] resolves the
    /// excess.
    ///
    /// # Errors
    /// Returns [`StowageError::DataIntegrity`] when the template list has no
    /// container pocket to consolidate into.
    pub fn from_legacy_items(
        templates: &[Arc<PocketTemplate>],
        items: Vec<Item>,
    ) -> Result<Self> {
        let mut tree = Self::new(templates);
        let fallback = tree
            .pockets
            .iter()
            .position(|p| p.is_kind(PocketKind::Container))
            .ok_or_else(|| {
                StowageError::integrity("legacy item list but no container pocket to hold it")
            })?;
        for item in items {
            if let Err(homeless) = tree.insert_anywhere(item) {
                warn!(item = %homeless.type_id(), "legacy item fits nowhere, force-adding");
                tree.pockets[fallback].add_unchecked(homeless);
            }
        }
        Ok(tree)
    }

    /// The pockets, in construction order.
    #[must_use]
    pub fn pockets(&self) -> &[Pocket] {
        &self.pockets
    }

    /// Mutable handle to one pocket, e.g. for seal operations.
    pub fn pocket_mut(&mut self, index: usize) -> Option<&mut Pocket> {
        self.pockets.get_mut(index)
    }

    /// Number of pockets.
    #[must_use]
    pub fn num_pockets(&self) -> usize {
        self.pockets.len()
    }

    /// Whether no pocket holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pockets.iter().all(Pocket::is_empty)
    }

    /// Whether every container pocket is out of volume.
    #[must_use]
    pub fn full(&self) -> bool {
        self.pockets
            .iter()
            .filter(|p| p.is_kind(PocketKind::Container))
            .all(Pocket::full)
    }

    /// Whether any pocket is of the given kind.
    #[must_use]
    pub fn has_pocket_kind(&self, kind: PocketKind) -> bool {
        self.pockets.iter().any(|p| p.is_kind(kind))
    }

    // ------------------------------------------------------------------
    // Selection and insertion
    // ------------------------------------------------------------------

    /// The best container pocket able to hold `it` right now, or `None` if
    /// nothing qualifies. With `nested` set, container items inside
    /// container pockets compete with their own pockets too.
    ///
    /// Deterministic and pure: the answer depends only on current pocket
    /// states.
    #[must_use]
    pub fn best_pocket(&self, it: &Item, nested: bool) -> Option<&Pocket> {
        let mut best = None;
        self.collect_best(it, nested, &mut Vec::new(), &mut best);
        best.map(|(_, pocket)| pocket)
    }

    fn best_pocket_path(&self, it: &Item, nested: bool) -> Option<PocketPath> {
        let mut best = None;
        self.collect_best(it, nested, &mut Vec::new(), &mut best);
        best.map(|(path, _)| path)
    }

    fn collect_best<'a>(
        &'a self,
        it: &Item,
        nested: bool,
        prefix: &mut Vec<(usize, usize)>,
        best: &mut Option<(PocketPath, &'a Pocket)>,
    ) {
        for (pi, pocket) in self.pockets.iter().enumerate() {
            if !pocket.is_kind(PocketKind::Container) {
                continue;
            }
            if pocket.can_contain(it).is_ok() {
                let replace = match best {
                    None => true,
                    Some((_, current)) => current.better_pocket(pocket, it),
                };
                if replace {
                    *best = Some((
                        PocketPath {
                            steps: prefix.clone(),
                            pocket: pi,
                        },
                        pocket,
                    ));
                }
            }
            if nested {
                for (ii, item) in pocket.items().iter().enumerate() {
                    if let Some(tree) = item.contents() {
                        prefix.push((pi, ii));
                        tree.collect_best(it, nested, prefix, best);
                        prefix.pop();
                    }
                }
            }
        }
    }

    fn pocket_at_path_mut(&mut self, path: &PocketPath) -> Option<&mut Pocket> {
        let mut tree = self;
        for &(pi, ii) in &path.steps {
            tree = tree
                .pockets
                .get_mut(pi)?
                .items_mut()
                .get_mut(ii)?
                .contents_mut()?;
        }
        tree.pockets.get_mut(path.pocket)
    }

    /// Insert an item into a pocket of the given kind.
    ///
    /// Container insertions go through best-fit selection (not nested);
    /// singular kinds go straight to their one pocket — template loading
    /// already rejected definitions where that would be ambiguous.
    ///
    /// # Errors
    /// Returns the item back inside an [`InsertError`].
    pub fn insert_item(
        &mut self,
        item: Item,
        kind: PocketKind,
    ) -> std::result::Result<(), InsertError> {
        if kind == PocketKind::Container {
            let Some(path) = self.best_pocket_path(&item, false) else {
                return Err(InsertError::NoPocket(item));
            };
            let Some(pocket) = self.pocket_at_path_mut(&path) else {
                return Err(InsertError::NoPocket(item));
            };
            pocket.insert_item(item).map_err(InsertError::Rejected)
        } else {
            let Some(pocket) = self.pockets.iter_mut().find(|p| p.is_kind(kind)) else {
                return Err(InsertError::NoPocket(item));
            };
            pocket.insert_item(item).map_err(InsertError::Rejected)
        }
    }

    /// First-fit insertion across every pocket kind; used by migration and
    /// the legacy adapter, where the intended kind is unknown.
    pub(crate) fn insert_anywhere(&mut self, item: Item) -> std::result::Result<(), Item> {
        let Some(idx) = self
            .pockets
            .iter()
            .position(|p| p.can_contain(&item).is_ok())
        else {
            return Err(item);
        };
        self.pockets[idx]
            .insert_item(item)
            .map_err(InsertFailure::into_item)
    }

    /// Fill the tree to the brim with copies of a prototype, one charge
    /// increment at a time, until capacity or the prototype's charges run
    /// out. Returns the number of increments placed.
    pub fn fill_with(&mut self, prototype: &Item) -> u32 {
        let total = if prototype.counts_by_charges() {
            prototype.charges().max(1)
        } else if prototype.volume() == Volume::ZERO {
            // A zero-volume prototype would never stop fitting.
            1
        } else {
            u32::MAX
        };
        let mut placed = 0;
        while placed < total {
            let unit = prototype.charge_increment();
            let Some(path) = self.best_pocket_path(&unit, false) else {
                break;
            };
            let Some(pocket) = self.pocket_at_path_mut(&path) else {
                break;
            };
            if pocket.insert_item(unit).is_err() {
                break;
            }
            placed += 1;
        }
        debug!(item = %prototype.type_id(), placed, "fill_with finished");
        placed
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Combined capacity of container pockets.
    #[must_use]
    pub fn total_container_capacity(&self) -> Volume {
        self.container_pockets().map(Pocket::volume_capacity).sum()
    }

    /// Combined free volume of container pockets.
    #[must_use]
    pub fn remaining_container_capacity(&self) -> Volume {
        self.container_pockets().map(Pocket::remaining_volume).sum()
    }

    /// Combined contained volume of container pockets.
    #[must_use]
    pub fn total_contained_volume(&self) -> Volume {
        self.container_pockets().map(Pocket::contains_volume).sum()
    }

    /// Combined contained weight across every pocket kind.
    #[must_use]
    pub fn total_contained_weight(&self) -> Weight {
        self.pockets.iter().map(Pocket::contains_weight).sum()
    }

    /// How much the contents enlarge the owning item. Rigid pockets
    /// contribute nothing.
    #[must_use]
    pub fn item_size_modifier(&self) -> Volume {
        self.pockets.iter().map(Pocket::item_size_modifier).sum()
    }

    /// How much the contents add to the owning item's weight, after
    /// per-pocket multipliers.
    #[must_use]
    pub fn item_weight_modifier(&self) -> Weight {
        self.pockets.iter().map(Pocket::item_weight_modifier).sum()
    }

    /// Number of item stacks across all pockets.
    #[must_use]
    pub fn num_item_stacks(&self) -> usize {
        self.pockets.iter().map(Pocket::num_item_stacks).sum()
    }

    fn container_pockets(&self) -> impl Iterator<Item = &Pocket> {
        self.pockets
            .iter()
            .filter(|p| p.is_kind(PocketKind::Container))
    }

    // ------------------------------------------------------------------
    // Traversal family
    // ------------------------------------------------------------------

    /// Top-level items of every pocket except mod slots, in stable pocket
    /// order then content order.
    #[must_use]
    pub fn all_items_top(&self) -> Vec<&Item> {
        self.pockets
            .iter()
            .filter(|p| !p.is_kind(PocketKind::ModSlot))
            .flat_map(|p| p.items())
            .collect()
    }

    /// Top-level items of pockets of one kind.
    #[must_use]
    pub fn all_items_top_of(&self, kind: PocketKind) -> Vec<&Item> {
        self.pockets
            .iter()
            .filter(|p| p.is_kind(kind))
            .flat_map(|p| p.items())
            .collect()
    }

    /// Every item in pockets of one kind, recursing into contained items'
    /// same-kind pockets.
    #[must_use]
    pub fn all_items_of(&self, kind: PocketKind) -> Vec<&Item> {
        let mut out = Vec::new();
        self.collect_items_of(kind, &mut out);
        out
    }

    fn collect_items_of<'a>(&'a self, kind: PocketKind, out: &mut Vec<&'a Item>) {
        for pocket in self.pockets.iter().filter(|p| p.is_kind(kind)) {
            for item in pocket.items() {
                out.push(item);
                if let Some(tree) = item.contents() {
                    tree.collect_items_of(kind, out);
                }
            }
        }
    }

    /// Every item in the whole subtree, mods included.
    #[must_use]
    pub fn all_items(&self) -> Vec<&Item> {
        let mut out = Vec::new();
        self.collect_all_items(&mut out);
        out
    }

    fn collect_all_items<'a>(&'a self, out: &mut Vec<&'a Item>) {
        for pocket in &self.pockets {
            for item in pocket.items() {
                out.push(item);
                if let Some(tree) = item.contents() {
                    tree.collect_all_items(out);
                }
            }
        }
    }

    /// All installed weapon/tool modifications.
    #[must_use]
    pub fn gunmods(&self) -> Vec<&Item> {
        self.all_items_top_of(PocketKind::ModSlot)
    }

    /// The first round of ammunition: directly in a magazine pocket, or
    /// inside the currently loaded magazine.
    #[must_use]
    pub fn first_ammo(&self) -> Option<&Item> {
        for pocket in self.pockets.iter().filter(|p| p.is_kind(PocketKind::Magazine)) {
            if let Some(item) = pocket.front() {
                return Some(item);
            }
        }
        self.magazine_current()
            .and_then(Item::contents)
            .and_then(ContainerTree::first_ammo)
    }

    /// The loaded magazine: the first top-level item whose own type carries
    /// a magazine pocket.
    #[must_use]
    pub fn magazine_current(&self) -> Option<&Item> {
        self.pockets
            .iter()
            .flat_map(|p| p.items())
            .find(|it| it.item_type().has_pocket_kind(PocketKind::Magazine))
    }

    /// First top-level item matching the filter.
    #[must_use]
    pub fn get_item_with<F: Fn(&Item) -> bool>(&self, filter: F) -> Option<&Item> {
        self.pockets.iter().find_map(|p| p.get_item_with(&filter))
    }

    /// Whether any top-level item of the given pocket kind matches.
    #[must_use]
    pub fn has_any_with<F: Fn(&Item) -> bool>(&self, filter: F, kind: PocketKind) -> bool {
        self.pockets
            .iter()
            .filter(|p| p.is_kind(kind))
            .any(|p| p.has_any_with(&filter))
    }

    /// First item across container pockets regardless of which pocket.
    /// Transitional: exists only to aid callers that predate pockets.
    #[must_use]
    pub fn legacy_front(&self) -> Option<&Item> {
        self.container_pockets().find_map(Pocket::front)
    }

    /// Last item across container pockets regardless of which pocket.
    /// Transitional: exists only to aid callers that predate pockets.
    #[must_use]
    pub fn legacy_back(&self) -> Option<&Item> {
        let mut last = None;
        for pocket in self.container_pockets() {
            if let Some(item) = pocket.back() {
                last = Some(item);
            }
        }
        last
    }

    /// Depth-first pre-order walk of the whole item tree. The visitor sees
    /// each item with its parent item (`None` at the top level) and steers
    /// the walk with its [`VisitResponse`].
    pub fn visit_contents<F>(&self, f: &mut F) -> VisitResponse
    where
        F: FnMut(&Item, Option<&Item>) -> VisitResponse,
    {
        self.visit_with_parent(f, None)
    }

    fn visit_with_parent<F>(&self, f: &mut F, parent: Option<&Item>) -> VisitResponse
    where
        F: FnMut(&Item, Option<&Item>) -> VisitResponse,
    {
        for pocket in &self.pockets {
            for item in pocket.items() {
                match f(item, parent) {
                    VisitResponse::Continue => {
                        if let Some(tree) = item.contents() {
                            if tree.visit_with_parent(f, Some(item)) == VisitResponse::Abort {
                                return VisitResponse::Abort;
                            }
                        }
                    }
                    VisitResponse::SkipChildren => {}
                    VisitResponse::Abort => return VisitResponse::Abort,
                }
            }
        }
        VisitResponse::Continue
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove up to `count` items matching the filter from the whole
    /// subtree, in traversal order, as one coherent pass. `count` is
    /// decremented in place; removed items are returned.
    pub fn remove_internal<F: Fn(&Item) -> bool>(
        &mut self,
        filter: F,
        count: &mut usize,
    ) -> Vec<Item> {
        let mut out = Vec::new();
        self.remove_internal_into(&filter, count, &mut out);
        out
    }

    pub(crate) fn remove_internal_into<F: Fn(&Item) -> bool>(
        &mut self,
        filter: &F,
        count: &mut usize,
        out: &mut Vec<Item>,
    ) {
        for pocket in &mut self.pockets {
            if *count == 0 {
                return;
            }
            pocket.remove_internal(filter, count, out);
        }
    }

    /// Remove every matching item from the whole subtree.
    pub fn remove_items_if<F: Fn(&Item) -> bool>(&mut self, filter: F) -> Vec<Item> {
        let mut unlimited = usize::MAX;
        self.remove_internal(filter, &mut unlimited)
    }

    /// Remove and return the top-level item with the given instance id.
    pub fn remove_item(&mut self, id: ItemInstanceId) -> Option<Item> {
        self.pockets.iter_mut().find_map(|p| p.remove_item(id))
    }

    /// Empty every pocket, returning all top-level items (their own
    /// contents stay inside them).
    pub fn clear_items(&mut self) -> Vec<Item> {
        self.pockets.iter_mut().flat_map(Pocket::clear_items).collect()
    }

    // ------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------

    /// Substitute obsolete item types in place across the whole subtree.
    /// Items displaced because a replacement type reshaped its pockets are
    /// returned rather than dropped.
    pub fn migrate_item(
        &mut self,
        registry: &ItemTypeRegistry,
        migrations: &MigrationMap,
    ) -> Vec<Item> {
        let mut displaced = Vec::new();
        self.migrate_into(registry, migrations, &mut displaced);
        displaced
    }

    fn migrate_into(
        &mut self,
        registry: &ItemTypeRegistry,
        migrations: &MigrationMap,
        displaced: &mut Vec<Item>,
    ) {
        for pocket in &mut self.pockets {
            for item in pocket.items_mut() {
                if let Some(replacement) = migrations.resolve(item.type_id(), registry) {
                    warn!(
                        from = %item.type_id(),
                        to = %replacement.id,
                        "migrating obsolete item type"
                    );
                    item.migrate_to(replacement, displaced);
                }
                if let Some(tree) = item.contents_mut() {
                    tree.migrate_into(registry, migrations, displaced);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Processing and spill
    // ------------------------------------------------------------------

    /// Run one spoilage/temperature pass over every pocket, in pocket
    /// order. Items that rotted away anywhere in the subtree are returned.
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
        for pocket in &mut self.pockets {
            pocket.process_scaled(ambient, parent_multiplier, destroyed);
        }
    }

    /// Set every contained item, recursively, to a temperature.
    pub fn heat_up(&mut self, temperature_c: f32) {
        for pocket in &mut self.pockets {
            pocket.heat_up(temperature_c);
        }
    }

    /// Resolve over-budget pockets, reporting everything that was ejected.
    pub fn overflow(&mut self, position: Position) -> Vec<Spill> {
        self.pockets
            .iter_mut()
            .flat_map(|p| p.overflow(position))
            .collect()
    }

    /// Whether any open, unsealed pocket would dump its contents if this
    /// item were stowed inside another item.
    #[must_use]
    pub fn will_spill(&self) -> bool {
        self.pockets
            .iter()
            .any(|p| p.template().open_container && !p.sealed() && !p.is_empty())
    }

    /// Dump the contents of every open, unsealed pocket.
    pub fn spill_open_pockets(&mut self, position: Position) -> Vec<Spill> {
        let mut spills = Vec::new();
        for pocket in &mut self.pockets {
            if pocket.template().open_container && !pocket.sealed() {
                spills.extend(
                    pocket
                        .clear_items()
                        .into_iter()
                        .map(|item| Spill { item, position }),
                );
            }
        }
        spills
    }

    /// Draw up to `qty` charges of ammunition from magazine pockets.
    pub fn ammo_consume(&mut self, qty: u32) -> u32 {
        let mut consumed = 0;
        for pocket in self
            .pockets
            .iter_mut()
            .filter(|p| p.is_kind(PocketKind::Magazine))
        {
            if consumed == qty {
                break;
            }
            consumed += pocket.ammo_consume(qty - consumed);
        }
        consumed
    }

    // ------------------------------------------------------------------
    // Stacking support
    // ------------------------------------------------------------------

    /// Whether two trees are interchangeable for item stacking.
    #[must_use]
    pub fn stacks_with(&self, other: &ContainerTree) -> bool {
        self.pockets.len() == other.pockets.len()
            && self
                .pockets
                .iter()
                .zip(&other.pockets)
                .all(|(a, b)| a.stacks_with(b))
    }

    pub(crate) fn matches_shape(&self, templates: &[Arc<PocketTemplate>]) -> bool {
        self.pockets.len() == templates.len()
            && self
                .pockets
                .iter()
                .zip(templates)
                .all(|(p, t)| p.kind() == t.kind)
    }

    pub(crate) fn rebind_templates(&mut self, templates: &[Arc<PocketTemplate>]) {
        for (pocket, template) in self.pockets.iter_mut().zip(templates) {
            pocket.rebind_template(Arc::clone(template));
        }
    }

    pub(crate) fn into_items(self) -> Vec<Item> {
        self.pockets.into_iter().flat_map(Pocket::into_items).collect()
    }
}
