//! # SPECTER Core
//!
//! The seam between the replication engine and whatever owns the game's
//! entities and components:
//! - Local entity handles with generation counters
//! - A component marker trait plus get/set/enumerate access traits
//! - Partitioned data-parallel passes with per-worker scratch
//!
//! ## Architecture Rules
//!
//! 1. **Disjoint partitions** - a worker only ever touches its own chunk of rows
//! 2. **Read-only sharing** - anything shared across workers is borrowed immutably
//! 3. **Merge after join** - per-worker scratch is reduced once the pass is done
//!
//! ## Example
//!
//! ```rust,ignore
//! use specter_core::{ChunkedPass, Scratch};
//!
//! let pass = ChunkedPass::new(64, 256);
//! let total: Counter = pass.run(&mut rows, |scratch, _chunk, rows| {
//!     for row in rows { scratch.0 += row.update(); }
//! });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;
pub mod parallel;

pub use ecs::{Component, ComponentAccess, EntityAllocator, EntityId, EntityQuery};
pub use parallel::{ChunkedPass, Scratch};
