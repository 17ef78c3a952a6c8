//! Shared contributor registry.
//!
//! Contributors are opened on first access and deduplicated by canonical name. Every open handle
//! lives in a reference-counted [`HandleTable`]: shared-by-name handles in a process-wide table,
//! exclusive handles in a table private to one registry (one composition).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::raster::contributor::{DatasetOpener, RasterDataset};

/// How an opened contributor is owned and released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Attach to a process-wide handle; closed when the last user releases it.
    SharedByName,
    /// Private to one registry; never visible to other compositions.
    Exclusive,
}

impl Ownership {
    /// Ownership for an optional `shared` flag, falling back to `shared_by_default`.
    pub fn from_flag(shared: Option<bool>, shared_by_default: bool) -> Self {
        if shared.unwrap_or(shared_by_default) {
            Self::SharedByName
        } else {
            Self::Exclusive
        }
    }
}

#[derive(Debug)]
struct Entry {
    dataset: Arc<dyn RasterDataset>,
    refs: usize,
}

/// Canonical name to open dataset, with reference counts.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: Mutex<HashMap<String, Entry>>,
}

impl HandleTable {
    /// Empty table.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide table backing shared-by-name handles.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<HandleTable>> = OnceLock::new();
        GLOBAL.get_or_init(HandleTable::new).clone()
    }

    /// Current reference count of `name` (0 when not open).
    pub fn ref_count(&self, name: &str) -> usize {
        self.entries.lock().get(name).map_or(0, |e| e.refs)
    }

    /// Number of open datasets.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Return `true` when no dataset is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn attach_or_open(
        &self,
        name: &str,
        opener: &dyn DatasetOpener,
    ) -> VirtbandResult<Arc<dyn RasterDataset>> {
        // The lock is held across the open so concurrent first opens of one name serialize.
        let mut entries = self.entries.lock();
        if let Some(e) = entries.get_mut(name) {
            e.refs += 1;
            tracing::debug!(name, refs = e.refs, "attached to open contributor");
            return Ok(e.dataset.clone());
        }
        let dataset = opener.open(name)?;
        tracing::debug!(name, bands = dataset.band_count(), "opened contributor");
        entries.insert(
            name.to_owned(),
            Entry {
                dataset: dataset.clone(),
                refs: 1,
            },
        );
        Ok(dataset)
    }

    fn detach(&self, name: &str) {
        let mut entries = self.entries.lock();
        let Some(e) = entries.get_mut(name) else {
            return;
        };
        e.refs = e.refs.saturating_sub(1);
        if e.refs == 0 {
            entries.remove(name);
            tracing::debug!(name, "closed contributor");
        }
    }
}

/// Reference to an opened contributor; releases itself when dropped.
pub struct DatasetHandle {
    name: String,
    ownership: Ownership,
    dataset: Arc<dyn RasterDataset>,
    table: Arc<HandleTable>,
}

impl DatasetHandle {
    /// Canonical name the dataset was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ownership mode recorded at open time.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// The opened dataset.
    pub fn dataset(&self) -> &Arc<dyn RasterDataset> {
        &self.dataset
    }
}

impl fmt::Debug for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetHandle")
            .field("name", &self.name)
            .field("ownership", &self.ownership)
            .finish_non_exhaustive()
    }
}

impl Drop for DatasetHandle {
    fn drop(&mut self) {
        self.table.detach(&self.name);
    }
}

/// Opens contributors by canonical name, attaching to already-open handles.
#[derive(Clone)]
pub struct SourceRegistry {
    opener: Arc<dyn DatasetOpener>,
    local: Arc<HandleTable>,
    shared: Arc<HandleTable>,
    shared_by_default: bool,
    base_dir: Option<PathBuf>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("opener", &self.opener)
            .field("exclusive_open", &self.local.len())
            .field("shared_by_default", &self.shared_by_default)
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl SourceRegistry {
    /// Registry using the process-wide shared table.
    pub fn new(opener: Arc<dyn DatasetOpener>) -> Self {
        Self {
            opener,
            local: HandleTable::new(),
            shared: HandleTable::global(),
            shared_by_default: true,
            base_dir: None,
        }
    }

    /// Ownership used by references without an explicit `shared` flag.
    pub fn with_shared_by_default(mut self, shared: bool) -> Self {
        self.shared_by_default = shared;
        self
    }

    /// Directory relative contributor names resolve against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Ownership used by references without an explicit `shared` flag.
    pub fn shared_by_default(&self) -> bool {
        self.shared_by_default
    }

    /// Directory relative contributor names resolve against.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Use `table` instead of the process-wide table for shared-by-name handles.
    pub fn with_shared_table(mut self, table: Arc<HandleTable>) -> Self {
        self.shared = table;
        self
    }

    /// Opener used for first opens.
    pub fn opener(&self) -> &Arc<dyn DatasetOpener> {
        &self.opener
    }

    /// Table holding shared-by-name handles.
    pub fn shared_table(&self) -> &Arc<HandleTable> {
        &self.shared
    }

    /// Table holding this registry's exclusive handles.
    pub fn exclusive_table(&self) -> &Arc<HandleTable> {
        &self.local
    }

    /// Attach to the open dataset named `name`, opening it first if needed.
    pub fn open_or_attach(
        &self,
        name: &str,
        ownership: Ownership,
    ) -> VirtbandResult<DatasetHandle> {
        if name.is_empty() {
            return Err(VirtbandError::configuration("contributor name must be non-empty"));
        }
        let table = match ownership {
            Ownership::SharedByName => &self.shared,
            Ownership::Exclusive => &self.local,
        };
        let dataset = table.attach_or_open(name, self.opener.as_ref())?;
        Ok(DatasetHandle {
            name: name.to_owned(),
            ownership,
            dataset,
            table: table.clone(),
        })
    }

    /// Release `handle` now instead of at drop time.
    pub fn release(&self, handle: DatasetHandle) {
        drop(handle);
    }
}

/// Normalize a contributor name, resolving it against `base_dir` when `relative` is set.
///
/// Backslashes become slashes, `.` segments disappear and `..` segments cancel the preceding
/// segment, so equivalent spellings of one path share a registry entry.
pub fn canonical_name(
    name: &str,
    relative: bool,
    base_dir: Option<&Path>,
) -> VirtbandResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VirtbandError::configuration("contributor name must be non-empty"));
    }
    let joined = match base_dir {
        Some(base) if relative && !Path::new(name).is_absolute() => {
            format!("{}/{}", base.display(), name)
        }
        _ => name.to_owned(),
    };
    let s = joined.replace('\\', "/");
    let absolute = s.starts_with('/');

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(&p) if p != "..") {
                    out.pop();
                } else if !absolute {
                    out.push("..");
                }
            }
            p => out.push(p),
        }
    }
    if out.is_empty() {
        return Err(VirtbandError::configuration(format!(
            "contributor name '{name}' has no file component"
        )));
    }
    let joined = out.join("/");
    Ok(if absolute { format!("/{joined}") } else { joined })
}

#[cfg(test)]
#[path = "../tests/unit/registry.rs"]
mod tests;
