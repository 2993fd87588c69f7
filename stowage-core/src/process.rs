//! Spoilage and temperature model for periodic processing passes.
//!
//! Rot advances with a rate that doubles for every 10 °C above the 20 °C
//! baseline and stops entirely at or below freezing:
//!
//! ```text
//! rot_per_tick = (1 / spoils_in) × 2^((T - 20) / 10) × spoil_multiplier
//! ```
//!
//! An item's temperature approaches ambient exponentially; insulation
//! stretches the time constant. Both functions are pure so a processing
//! pass over a whole tree stays deterministic.

use crate::types::Ambient;

/// Temperature at which spoilage stops completely.
pub const FREEZING_C: f32 = 0.0;

/// Baseline temperature for the nominal spoilage rate.
pub const BASELINE_C: f32 = 20.0;

/// Cap on the temperature seen by contents of a sealed, fire-protected
/// pocket when the surroundings are hotter.
pub const FIRE_SHIELD_CEILING_C: f32 = 40.0;

/// Upper bound on the spoilage acceleration factor.
const MAX_TEMP_FACTOR: f32 = 8.0;

/// Ticks for an uninsulated item to close ~63% of the gap to ambient.
const TEMP_TAU_TICKS: f32 = 600.0;

/// Spoilage acceleration factor for a given temperature.
///
/// 0.0 at or below freezing, 1.0 at the 20 °C baseline, doubling per
/// +10 °C, capped at 8×.
#[must_use]
pub fn temperature_factor(temperature_c: f32) -> f32 {
    if temperature_c <= FREEZING_C {
        return 0.0;
    }
    ((temperature_c - BASELINE_C) / 10.0).exp2().min(MAX_TEMP_FACTOR)
}

/// Rot fraction gained over a pass, given the item's shelf life in ticks.
///
/// Returns a value in `[0, ∞)`; the owning item self-destructs once its
/// accumulated rot reaches 1.0. A `spoil_multiplier` of zero freezes rot.
#[must_use]
pub fn rot_progress(ambient: &Ambient, spoil_multiplier: f32, spoils_in_ticks: u64) -> f32 {
    if spoils_in_ticks == 0 || spoil_multiplier <= 0.0 {
        return 0.0;
    }
    let base = ambient.elapsed_ticks as f32 / spoils_in_ticks as f32;
    base * temperature_factor(ambient.temperature_c) * spoil_multiplier
}

/// Move `current` toward the ambient temperature.
///
/// Insulation values above 1.0 stretch the exponential time constant, so a
/// well-insulated pocket keeps its contents cool (or warm) longer.
#[must_use]
pub fn approach_ambient(current: f32, ambient: &Ambient) -> f32 {
    let tau = TEMP_TAU_TICKS * ambient.insulation.max(f32::EPSILON);
    let rate = 1.0 - (-(ambient.elapsed_ticks as f32) / tau).exp();
    current + (ambient.temperature_c - current) * rate
}
