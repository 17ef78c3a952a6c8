//! Window geometry between destination bands and contributors.

/// Window mapping, clipping and padding.
pub mod window;
