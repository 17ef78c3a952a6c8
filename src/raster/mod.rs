//! Raster plumbing: destination buffers and the contributor capabilities they are filled from.

/// Typed destination buffers and views.
pub mod buffer;
/// Band, dataset and opener traits consumed by sources.
pub mod contributor;
/// Image-file backed opener.
pub mod image_file;
/// In-memory bands, datasets and opener.
pub mod memory;
