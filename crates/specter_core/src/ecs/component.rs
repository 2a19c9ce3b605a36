//! # Component Marker
//!
//! Components are pure data containers with no behavior.
//! They must be Copy and have a fixed size so a pass can overwrite them in
//! place without allocating.

use bytemuck::{Pod, Zeroable};

/// Marker trait for replicated component bundles.
///
/// Components must be:
/// - `Copy`: No heap allocations, bitwise copyable
/// - `Pod`: Plain old data
/// - `Zeroable`: Can be safely zeroed
/// - `Default`: The spawn state a ghost keeps until data arrives
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Translation {
///     value: [f32; 3],
/// }
///
/// impl Component for Translation {}
/// ```
pub trait Component: Copy + Pod + Zeroable + Default + Send + Sync + 'static {}
