//! # Partitioned Passes
//!
//! A pass walks a slice of rows (one row per entity) once per step. The
//! slice is split into disjoint chunks and each chunk is handed to exactly
//! one worker, so no two workers ever touch the same entity.
//!
//! ```text
//! rows:     [r0 r1 r2 r3][r4 r5 r6 r7][r8 r9 ..]
//!                 │             │           │
//! workers:     worker A      worker B    worker A
//!                 │             │           │
//! scratch:     S(A) ─────────── S(B) ───────┘
//!                        │
//!                   merge after join
//! ```
//!
//! Shared state (lookup maps, step parameters) is captured by shared
//! reference in the pass body. Anything a worker needs to accumulate goes
//! into its scratch value and is reduced after the pass.

mod chunked;

pub use chunked::{ChunkedPass, Scratch};
