/// Result alias used throughout the crate.
pub type VirtbandResult<T> = Result<T, VirtbandError>;

/// Error kinds raised while declaring, resolving, or reading a composed band.
#[derive(thiserror::Error, Debug)]
pub enum VirtbandError {
    /// Malformed or missing declaration field, unsupported kernel pixel type, non-monotonic
    /// lookup table, or conflicting processing flags.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A referenced contributor cannot be opened or its band index is out of range.
    #[error("resource error: {0}")]
    Resource(String),

    /// Degenerate or out-of-range window.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// An underlying windowed read failed mid-transfer.
    #[error("io error: {0}")]
    Io(String),

    /// Declaration (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped third-party failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VirtbandError {
    /// Build a [`VirtbandError::Configuration`].
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`VirtbandError::Resource`].
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Build a [`VirtbandError::Geometry`].
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    /// Build a [`VirtbandError::Io`].
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Build a [`VirtbandError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
