//! Pocket templates — the immutable capacity/rule descriptors.
//!
//! A [`PocketTemplate`] is created once when an item type is defined and
//! shared read-only (via `Arc`) by every pocket of that shape for the rest
//! of the process lifetime. All acceptance rules a pocket enforces live
//! here; the pocket itself only adds runtime state.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PocketConfig;
use crate::error::{Result, StowageError};
use crate::types::{AmmoTypeId, FlagId, Volume, Weight};

// ---------------------------------------------------------------------------
// Pocket kind
// ---------------------------------------------------------------------------

/// The kind of a pocket. The kind drives the first acceptance check and
/// decides which aggregate queries include the pocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PocketKind {
    /// General storage; participates in best-fit selection and capacity
    /// aggregates.
    Container,
    /// Holds ammunition, restricted by ammo type.
    Magazine,
    /// Holds gun/tool modifications; rejects everything else outright.
    ModSlot,
    /// The cavity of a corpse, e.g. for embedded implants.
    CorpseCavity,
    /// Holds software on storage devices.
    SoftwareSlot,
}

impl PocketKind {
    /// Whether at most one pocket of this kind may exist per item type.
    ///
    /// Singular kinds are inserted into directly rather than via best-fit
    /// selection, so a duplicate would make insertion ambiguous.
    #[must_use]
    pub const fn is_singular(self) -> bool {
        !matches!(self, Self::Container)
    }
}

impl fmt::Display for PocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Magazine => write!(f, "magazine"),
            Self::ModSlot => write!(f, "mod_slot"),
            Self::CorpseCavity => write!(f, "corpse_cavity"),
            Self::SoftwareSlot => write!(f, "software_slot"),
        }
    }
}

// ---------------------------------------------------------------------------
// Number override
// ---------------------------------------------------------------------------

/// An absolute cap on how much a pocket holds, overriding volume bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberOverride {
    /// Maximum count.
    pub count: u32,
    /// When true the count applies to item stacks; when false it applies to
    /// the absolute item total, charges included.
    pub stacks: bool,
}

// ---------------------------------------------------------------------------
// PocketTemplate
// ---------------------------------------------------------------------------

/// Immutable capacity/rule descriptor for one pocket shape.
///
/// Equality is structural: two templates loaded from identical definitions
/// compare equal, which is what duplicate-shape detection in pocket
/// selection relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PocketTemplate {
    /// What kind of pocket this is.
    pub kind: PocketKind,
    /// Maximum combined volume of contents.
    pub max_volume: Volume,
    /// Minimum volume of a single contained item.
    pub min_item_volume: Volume,
    /// Maximum combined weight of contents.
    pub max_weight: Weight,
    /// Multiplier on the spoilage rate of contents. Zero freezes rot.
    pub spoil_multiplier: f32,
    /// Multiplier applied to contents' weight as seen from outside.
    pub weight_multiplier: f32,
    /// Contained volume up to this much does not enlarge the owning item.
    pub magazine_well: Volume,
    /// Base move cost of retrieving an item from this pocket.
    pub base_move_cost: u32,
    /// Contents are shielded from external fire/heat while sealed.
    pub fire_protection: bool,
    /// Can hold liquids.
    pub watertight: bool,
    /// Can hold gases.
    pub gastight: bool,
    /// Contents spill when the owning item is placed inside another item.
    pub open_container: bool,
    /// The pocket can be sealed again after being opened.
    pub resealable: bool,
    /// Contents do not change the owning item's externally visible size.
    pub rigid: bool,
    /// Only items carrying at least one of these flags are admitted.
    /// Empty means unrestricted.
    pub flag_restriction: BTreeSet<FlagId>,
    /// Only ammunition of these types is admitted. Empty means unrestricted.
    pub ammo_restriction: BTreeSet<AmmoTypeId>,
    /// Absolute item/stack-count override, if any.
    pub number_override: Option<NumberOverride>,
}

impl PocketTemplate {
    /// Build a validated template from a raw parsed pocket definition.
    ///
    /// # Errors
    ///
    /// Returns [`StowageError::Config`] on malformed unit strings, negative
    /// capacities or multipliers, a minimum item volume exceeding the
    /// capacity, a magazine well exceeding the capacity, an ammo restriction
    /// on a non-magazine pocket, or a zero-count number override.
    pub fn load(cfg: &PocketConfig) -> Result<Self> {
        let max_volume = crate::config::parse_volume(&cfg.max_volume)?;
        let min_item_volume = match &cfg.min_item_volume {
            Some(s) => crate::config::parse_volume(s)?,
            None => Volume::ZERO,
        };
        let max_weight = crate::config::parse_weight(&cfg.max_weight)?;
        let magazine_well = match &cfg.magazine_well {
            Some(s) => crate::config::parse_volume(s)?,
            None => Volume::ZERO,
        };

        if min_item_volume > max_volume {
            return Err(StowageError::config(format!(
                "min_item_volume {min_item_volume} exceeds max_volume {max_volume}"
            )));
        }
        if magazine_well > max_volume {
            return Err(StowageError::config(format!(
                "magazine_well {magazine_well} exceeds max_volume {max_volume}"
            )));
        }
        if cfg.spoil_multiplier < 0.0 {
            return Err(StowageError::config("spoil_multiplier must not be negative"));
        }
        if cfg.weight_multiplier < 0.0 {
            return Err(StowageError::config("weight_multiplier must not be negative"));
        }
        if !cfg.ammo_restriction.is_empty() && cfg.kind != PocketKind::Magazine {
            return Err(StowageError::config(format!(
                "ammo_restriction only applies to magazine pockets, not {}",
                cfg.kind
            )));
        }
        if cfg.gastight && !cfg.watertight {
            return Err(StowageError::config(
                "a gastight pocket must also be watertight",
            ));
        }
        let number_override = match cfg.max_item_count {
            Some(0) => {
                return Err(StowageError::config(
                    "max_item_count of zero would make the pocket unusable",
                ));
            }
            Some(count) => Some(NumberOverride {
                count,
                stacks: cfg.count_is_stacks,
            }),
            None => None,
        };

        Ok(Self {
            kind: cfg.kind,
            max_volume,
            min_item_volume,
            max_weight,
            spoil_multiplier: cfg.spoil_multiplier,
            weight_multiplier: cfg.weight_multiplier,
            magazine_well,
            base_move_cost: cfg.moves,
            fire_protection: cfg.fire_protection,
            watertight: cfg.watertight,
            gastight: cfg.gastight,
            open_container: cfg.open_container,
            resealable: cfg.resealable,
            rigid: cfg.rigid,
            flag_restriction: cfg.flag_restriction.iter().cloned().map(FlagId).collect(),
            ammo_restriction: cfg
                .ammo_restriction
                .iter()
                .cloned()
                .map(AmmoTypeId)
                .collect(),
            number_override,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PocketConfig;

    fn base_config() -> PocketConfig {
        PocketConfig {
            kind: PocketKind::Container,
            max_volume: "1500 ml".to_string(),
            max_weight: "20 kg".to_string(),
            ..PocketConfig::default()
        }
    }

    #[test]
    fn load_parses_units() {
        let tpl = PocketTemplate::load(&base_config()).expect("load");
        assert_eq!(tpl.max_volume, Volume::from_milliliters(1500));
        assert_eq!(tpl.max_weight, Weight::from_kilograms(20));
        assert_eq!(tpl.min_item_volume, Volume::ZERO);
    }

    #[test]
    fn min_item_volume_above_capacity_rejected() {
        let mut cfg = base_config();
        cfg.min_item_volume = Some("2 L".to_string());
        let err = PocketTemplate::load(&cfg).expect_err("should fail");
        assert!(matches!(err, StowageError::Config { .. }));
    }

    #[test]
    fn ammo_restriction_requires_magazine_kind() {
        let mut cfg = base_config();
        cfg.ammo_restriction = vec!["9mm".to_string()];
        let err = PocketTemplate::load(&cfg).expect_err("should fail");
        assert!(matches!(err, StowageError::Config { .. }));

        cfg.kind = PocketKind::Magazine;
        assert!(PocketTemplate::load(&cfg).is_ok());
    }

    #[test]
    fn gastight_implies_watertight() {
        let mut cfg = base_config();
        cfg.gastight = true;
        assert!(PocketTemplate::load(&cfg).is_err());
        cfg.watertight = true;
        assert!(PocketTemplate::load(&cfg).is_ok());
    }

    #[test]
    fn zero_item_count_override_rejected() {
        let mut cfg = base_config();
        cfg.max_item_count = Some(0);
        assert!(PocketTemplate::load(&cfg).is_err());
    }

    #[test]
    fn structural_equality() {
        let a = PocketTemplate::load(&base_config()).expect("load");
        let b = PocketTemplate::load(&base_config()).expect("load");
        assert_eq!(a, b);

        let mut cfg = base_config();
        cfg.rigid = true;
        let c = PocketTemplate::load(&cfg).expect("load");
        assert_ne!(a, c);
    }
}
