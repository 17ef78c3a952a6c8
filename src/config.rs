use crate::scratch::ScratchOpts;

/// Options shared by every composed band built from one declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOpts {
    /// Ownership mode for contributor references that carry no explicit `shared` flag.
    pub shared_by_default: bool,
    /// Retention bounds of the per-read scratch pool.
    pub scratch: ScratchOpts,
    /// Strip height used when statistics fall back to a full scan.
    pub scan_rows: u32,
    /// Block size used by block reads, as `(width, height)`.
    pub block_size: (u32, u32),
}

impl Default for ComposeOpts {
    fn default() -> Self {
        Self {
            shared_by_default: true,
            scratch: ScratchOpts::default(),
            scan_rows: 64,
            block_size: (128, 128),
        }
    }
}

impl ComposeOpts {
    /// Defaults with overrides from `VIRTBAND_SHARED_SOURCE` and `VIRTBAND_SCRATCH_MAX_BYTES`.
    ///
    /// Malformed values are ignored.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(shared) = std::env::var("VIRTBAND_SHARED_SOURCE")
            .ok()
            .and_then(|v| parse_flag(&v))
        {
            opts.shared_by_default = shared;
        }
        if let Some(bytes) = std::env::var("VIRTBAND_SCRATCH_MAX_BYTES")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            opts.scratch.max_pool_bytes = bytes;
        }
        opts
    }

    /// Set the default ownership mode of contributor references.
    pub fn with_shared_by_default(mut self, shared: bool) -> Self {
        self.shared_by_default = shared;
        self
    }

    /// Set the scratch pool bounds.
    pub fn with_scratch(mut self, scratch: ScratchOpts) -> Self {
        self.scratch = scratch;
        self
    }

    /// Set the full-scan strip height (at least one row).
    pub fn with_scan_rows(mut self, rows: u32) -> Self {
        self.scan_rows = rows.max(1);
        self
    }

    /// Set the block size used by block reads (at least one pixel per axis).
    pub fn with_block_size(mut self, width: u32, height: u32) -> Self {
        self.block_size = (width.max(1), height.max(1));
        self
    }
}

pub(crate) fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
