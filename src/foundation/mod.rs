//! Crate-wide primitives: errors, pixel types and the rounding rule.

/// Pixel types and integer windows.
pub mod core;
/// Error kinds and result alias.
pub mod error;
/// Rounding rule and numeric sample traits.
pub mod math;
