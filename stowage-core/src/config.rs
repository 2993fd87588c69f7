//! Pocket-set configuration — the template source.
//!
//! Maps directly to the `[[pockets]]` tables of an item definition file.
//! Raw values use human-written unit strings (`"750 ml"`, `"2 L"`, `"80 g"`,
//! `"1.5 kg"`); [`PocketTemplate::load`] converts a parsed entry into a
//! validated immutable template.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StowageError};
use crate::template::{PocketKind, PocketTemplate};
use crate::types::{Volume, Weight};

// ---------------------------------------------------------------------------
// Raw pocket definition
// ---------------------------------------------------------------------------

/// One raw pocket definition as written in TOML, prior to validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PocketConfig {
    /// Pocket kind tag.
    #[serde(default = "default_kind")]
    pub kind: PocketKind,
    /// Capacity, e.g. `"1500 ml"` or `"2 L"`.
    pub max_volume: String,
    /// Smallest admissible single item, e.g. `"5 ml"`.
    #[serde(default)]
    pub min_item_volume: Option<String>,
    /// Weight capacity, e.g. `"20 kg"`.
    pub max_weight: String,
    /// Spoilage rate multiplier for contents.
    #[serde(default = "default_1_0")]
    pub spoil_multiplier: f32,
    /// Contents weight multiplier as seen from outside.
    #[serde(default = "default_1_0")]
    pub weight_multiplier: f32,
    /// Contained volume that does not enlarge the owning item.
    #[serde(default)]
    pub magazine_well: Option<String>,
    /// Base move cost of retrieving an item.
    #[serde(default = "default_100")]
    pub moves: u32,
    /// Contents shielded from fire while sealed.
    #[serde(default)]
    pub fire_protection: bool,
    /// Can hold liquids.
    #[serde(default)]
    pub watertight: bool,
    /// Can hold gases.
    #[serde(default)]
    pub gastight: bool,
    /// Spills when the owning item is stowed inside another item.
    #[serde(default)]
    pub open_container: bool,
    /// Can be sealed again after opening.
    #[serde(default = "default_true")]
    pub resealable: bool,
    /// Contents do not enlarge the owning item.
    #[serde(default)]
    pub rigid: bool,
    /// Admit only items carrying at least one of these flags.
    #[serde(default)]
    pub flag_restriction: Vec<String>,
    /// Admit only ammunition of these types (magazine pockets only).
    #[serde(default)]
    pub ammo_restriction: Vec<String>,
    /// Absolute item/stack-count cap.
    #[serde(default)]
    pub max_item_count: Option<u32>,
    /// Whether `max_item_count` counts stacks (true) or the absolute item
    /// total, charges included (false).
    #[serde(default = "default_true")]
    pub count_is_stacks: bool,
}

impl Default for PocketConfig {
    fn default() -> Self {
        Self {
            kind: PocketKind::Container,
            max_volume: "0 ml".to_string(),
            min_item_volume: None,
            max_weight: "0 g".to_string(),
            spoil_multiplier: 1.0,
            weight_multiplier: 1.0,
            magazine_well: None,
            moves: 100,
            fire_protection: false,
            watertight: false,
            gastight: false,
            open_container: false,
            resealable: true,
            rigid: false,
            flag_restriction: Vec::new(),
            ammo_restriction: Vec::new(),
            max_item_count: None,
            count_is_stacks: true,
        }
    }
}

/// An ordered set of pocket definitions for one item type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PocketSetConfig {
    /// The pockets, in declaration order. Order is preserved all the way to
    /// the runtime tree and is the tie-break of last resort in selection.
    #[serde(default)]
    pub pockets: Vec<PocketConfig>,
}

impl PocketSetConfig {
    /// Parse a pocket set from a TOML string.
    ///
    /// # Errors
    /// Returns [`StowageError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| StowageError::config(e.to_string()))
    }

    /// Parse a pocket set from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Validate every entry and produce the ordered template list a
    /// [`crate::contents::ContainerTree`] is constructed from.
    ///
    /// # Errors
    ///
    /// Returns [`StowageError::Config`] when any single pocket fails
    /// validation, or when a singular kind (magazine, mod slot, corpse
    /// cavity, software slot) appears more than once — a duplicate would
    /// make direct insertion ambiguous.
    pub fn into_templates(&self) -> Result<Vec<Arc<PocketTemplate>>> {
        let mut templates = Vec::with_capacity(self.pockets.len());
        for cfg in &self.pockets {
            templates.push(Arc::new(PocketTemplate::load(cfg)?));
        }
        for kind in [
            PocketKind::Magazine,
            PocketKind::ModSlot,
            PocketKind::CorpseCavity,
            PocketKind::SoftwareSlot,
        ] {
            let count = templates.iter().filter(|t| t.kind == kind).count();
            if count > 1 {
                return Err(StowageError::config(format!(
                    "{count} {kind} pockets in one definition; at most one is allowed"
                )));
            }
        }
        Ok(templates)
    }
}

// ---------------------------------------------------------------------------
// Unit parsing
// ---------------------------------------------------------------------------

/// Parse a volume string such as `"750 ml"` or `"1.5 L"`.
///
/// # Errors
/// Returns [`StowageError::Config`] on malformed input or a negative value.
pub fn parse_volume(s: &str) -> Result<Volume> {
    let (value, unit) = split_unit(s)?;
    let ml = match unit {
        "ml" => value,
        "l" | "L" => value * 1000.0,
        _ => {
            return Err(StowageError::config(format!(
                "unknown volume unit in {s:?} (expected ml or L)"
            )));
        }
    };
    if ml < 0.0 {
        return Err(StowageError::config(format!("negative volume {s:?}")));
    }
    Ok(Volume::from_milliliters(ml.round() as i64))
}

/// Parse a weight string such as `"80 g"` or `"1.5 kg"`.
///
/// # Errors
/// Returns [`StowageError::Config`] on malformed input or a negative value.
pub fn parse_weight(s: &str) -> Result<Weight> {
    let (value, unit) = split_unit(s)?;
    let g = match unit {
        "g" => value,
        "kg" => value * 1000.0,
        _ => {
            return Err(StowageError::config(format!(
                "unknown weight unit in {s:?} (expected g or kg)"
            )));
        }
    };
    if g < 0.0 {
        return Err(StowageError::config(format!("negative weight {s:?}")));
    }
    Ok(Weight::from_grams(g.round() as i64))
}

fn split_unit(s: &str) -> Result<(f64, &str)> {
    let trimmed = s.trim();
    let split_at = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| StowageError::config(format!("missing unit in {s:?}")))?;
    let (num, unit) = trimmed.split_at(split_at);
    let value: f64 = num
        .trim()
        .parse()
        .map_err(|_| StowageError::config(format!("malformed number in {s:?}")))?;
    Ok((value, unit.trim()))
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_kind() -> PocketKind {
    PocketKind::Container
}
fn default_1_0() -> f32 {
    1.0
}
fn default_100() -> u32 {
    100
}
