//! # Stowage Core Library
//!
//! Game-agnostic nested pocket storage for items.
//!
//! Every item that can hold things gets a [`ContainerTree`] of pockets,
//! each governed by an immutable [`PocketTemplate`]; contained items may
//! recursively carry trees of their own. The crate decides what can be
//! inserted where, selects the best pocket among competing candidates,
//! propagates size/weight modifiers up the tree, enforces liquid/gas
//! containment, spills what no longer fits, merges identical stacks, and
//! drives periodic spoilage passes across whole subtrees:
//!
//! - **Templates** — capacity, restrictions, and flags per pocket shape
//! - **Pockets** — acceptance classification, stacking, sealing, spill
//! - **Trees** — best-fit selection, traversal, visitors, batch removal
//! - **Persistence** — structured records, migration hook, SQLite store
//!
//! Everything is single-threaded and synchronous: mutating operations take
//! `&mut self`, so single-writer ownership of a tree is the borrow
//! checker's problem, not a locking discipline.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod contents;
pub mod error;
pub mod item;
pub mod pocket;
pub mod process;
pub mod save;
pub mod store;
pub mod template;
pub mod types;

pub use config::PocketSetConfig;
pub use contents::{ContainerTree, InsertError, VisitResponse};
pub use error::StowageError;
pub use item::{Item, ItemType, ItemTypeRegistry};
pub use pocket::{InsertFailure, Pocket, Rejection, Spill};
pub use save::MigrationMap;
pub use store::SaveStore;
pub use template::{PocketKind, PocketTemplate};
pub use types::*;
