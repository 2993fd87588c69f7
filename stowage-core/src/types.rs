//! Core type definitions for the stowage system.
//!
//! Units are integer-backed so aggregate arithmetic stays exact across
//! arbitrarily deep container trees.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// A volume in millilitres.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Volume(i64);

impl Volume {
    /// The zero volume.
    pub const ZERO: Self = Self(0);

    /// Create a volume from millilitres.
    #[must_use]
    pub const fn from_milliliters(ml: i64) -> Self {
        Self(ml)
    }

    /// Create a volume from litres.
    #[must_use]
    pub const fn from_liters(l: i64) -> Self {
        Self(l * 1000)
    }

    /// The raw millilitre count.
    #[must_use]
    pub const fn milliliters(self) -> i64 {
        self.0
    }

    /// Subtract, flooring the result at zero.
    #[must_use]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self((self.0 - rhs.0).max(0))
    }

    /// Scale by a charge count against a stack size, rounding up so a
    /// partial stack never reports zero volume.
    #[must_use]
    pub fn scaled(self, charges: u32, stack_size: u32) -> Self {
        let stack = i64::from(stack_size.max(1));
        Self((self.0 * i64::from(charges) + stack - 1) / stack)
    }
}

impl Add for Volume {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Volume {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Volume {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Volume {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ml", self.0)
    }
}

/// A weight in grams.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Weight(i64);

impl Weight {
    /// The zero weight.
    pub const ZERO: Self = Self(0);

    /// Create a weight from grams.
    #[must_use]
    pub const fn from_grams(g: i64) -> Self {
        Self(g)
    }

    /// Create a weight from kilograms.
    #[must_use]
    pub const fn from_kilograms(kg: i64) -> Self {
        Self(kg * 1000)
    }

    /// The raw gram count.
    #[must_use]
    pub const fn grams(self) -> i64 {
        self.0
    }

    /// Subtract, flooring the result at zero.
    #[must_use]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self((self.0 - rhs.0).max(0))
    }

    /// Scale by a charge count against a stack size, rounding up.
    #[must_use]
    pub fn scaled(self, charges: u32, stack_size: u32) -> Self {
        let stack = i64::from(stack_size.max(1));
        Self((self.0 * i64::from(charges) + stack - 1) / stack)
    }

    /// Scale by a multiplier, rounding toward zero.
    #[must_use]
    pub fn scaled_by(self, factor: f32) -> Self {
        Self((self.0 as f64 * f64::from(factor)) as i64)
    }
}

impl Add for Weight {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Weight {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Weight {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Weight {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} g", self.0)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Physical phase of an item, which gates which pockets may hold it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Solid matter — no special containment requirement.
    #[default]
    Solid,
    /// Liquids require a watertight pocket.
    Liquid,
    /// Gases require a gastight pocket.
    Gas,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solid => write!(f, "solid"),
            Self::Liquid => write!(f, "liquid"),
            Self::Gas => write!(f, "gas"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Identifier of an item type definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemTypeId(pub String);

impl ItemTypeId {
    /// Create a type id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ItemTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an ammunition type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmmoTypeId(pub String);

impl AmmoTypeId {
    /// Create an ammo type id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for AmmoTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tag carried by an item type and matched against pocket flag restrictions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagId(pub String);

impl FlagId {
    /// Create a flag id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for FlagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of one runtime item instance; key for the save store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemInstanceId(pub Uuid);

impl ItemInstanceId {
    /// Create a new random instance id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A world cell, used only to report where spilled items land.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z level.
    pub z: i32,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Ambient conditions
// ---------------------------------------------------------------------------

/// Externally supplied conditions for one processing pass over a tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ambient {
    /// Surrounding temperature in degrees Celsius.
    pub temperature_c: f32,
    /// Insulation between the surroundings and the contents; 1.0 is bare,
    /// larger values slow temperature exchange.
    pub insulation: f32,
    /// Game ticks elapsed since the previous pass.
    pub elapsed_ticks: u64,
}

impl Ambient {
    /// Room-temperature conditions over a given span of ticks.
    #[must_use]
    pub fn room(elapsed_ticks: u64) -> Self {
        Self {
            temperature_c: 20.0,
            insulation: 1.0,
            elapsed_ticks,
        }
    }
}
