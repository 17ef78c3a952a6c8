use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::foundation::core::DataType;
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::raster::buffer::{BufferViewMut, RasterBuffer};
use crate::raster::contributor::{
    ColorTable, DatasetOpener, HistogramRequest, RasterBand, RasterDataset, ReadRequest,
    resample_into,
};

/// Band whose samples live in a [`RasterBuffer`].
#[derive(Debug, Clone)]
pub struct MemRasterBand {
    buffer: RasterBuffer,
    nodata: Option<f64>,
    color_table: Option<ColorTable>,
    mask: Option<Arc<dyn RasterBand>>,
    files: Vec<String>,
}

impl MemRasterBand {
    /// Wrap a buffer.
    pub fn new(buffer: RasterBuffer) -> Self {
        Self {
            buffer,
            nodata: None,
            color_table: None,
            mask: None,
            files: Vec::new(),
        }
    }

    /// Band with every sample equal to `value`.
    pub fn constant(data_type: DataType, width: u32, height: u32, value: f64) -> Self {
        Self::new(RasterBuffer::filled(data_type, width, height, value))
    }

    /// Declare a nodata value.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Attach a palette.
    pub fn with_color_table(mut self, color_table: ColorTable) -> Self {
        self.color_table = Some(color_table);
        self
    }

    /// Attach a validity mask band.
    pub fn with_mask(mut self, mask: Arc<dyn RasterBand>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Report `file` as a backing file.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.files.push(file.into());
        self
    }

    /// Samples of this band.
    pub fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }

    /// Type-erase into a shareable band.
    pub fn into_shared(self) -> Arc<dyn RasterBand> {
        Arc::new(self)
    }

    /// Nodata value as a stored sample can hold it.
    fn adjusted_nodata(&self) -> Option<f64> {
        self.nodata
            .and_then(|nd| self.buffer.data_type().adjust_nodata(nd))
    }

    fn valid_samples(&self) -> impl Iterator<Item = f64> + '_ {
        let nodata = self.adjusted_nodata();
        let (w, h) = (self.buffer.width(), self.buffer.height());
        (0..h)
            .flat_map(move |y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| self.buffer.get(x, y))
            .filter(move |v| !v.is_nan() && Some(*v) != nodata)
    }
}

impl RasterBand for MemRasterBand {
    fn size(&self) -> (u32, u32) {
        (self.buffer.width(), self.buffer.height())
    }

    fn data_type(&self) -> DataType {
        self.buffer.data_type()
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn color_table(&self) -> Option<ColorTable> {
        self.color_table.clone()
    }

    fn mask_band(&self) -> Option<Arc<dyn RasterBand>> {
        self.mask.clone()
    }

    fn read_into(&self, request: &ReadRequest, out: &mut BufferViewMut<'_>) -> VirtbandResult<()> {
        resample_into(
            |x, y| self.buffer.get(x, y),
            self.size(),
            self.adjusted_nodata(),
            request,
            out,
        )
    }

    fn minimum(&self) -> Option<f64> {
        self.valid_samples().reduce(f64::min)
    }

    fn maximum(&self) -> Option<f64> {
        self.valid_samples().reduce(f64::max)
    }

    fn histogram(&self, request: &HistogramRequest) -> Option<Vec<u64>> {
        request.validate().ok()?;
        let mut counts = vec![0u64; request.buckets];
        for v in self.valid_samples() {
            if let Some(b) = request.bucket_of(v) {
                counts[b] += 1;
            }
        }
        Some(counts)
    }

    fn file_list(&self) -> Vec<String> {
        self.files.clone()
    }
}

/// Dataset made of in-memory bands.
#[derive(Debug, Clone)]
pub struct MemDataset {
    name: String,
    bands: Vec<Arc<dyn RasterBand>>,
}

impl MemDataset {
    /// Create a dataset from its bands, in 1-based index order.
    pub fn new(name: impl Into<String>, bands: Vec<Arc<dyn RasterBand>>) -> Self {
        Self {
            name: name.into(),
            bands,
        }
    }

    /// Single-band dataset.
    pub fn single(name: impl Into<String>, band: MemRasterBand) -> Self {
        Self::new(name, vec![band.into_shared()])
    }
}

impl RasterDataset for MemDataset {
    fn description(&self) -> &str {
        &self.name
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn band(&self, index: usize) -> Option<Arc<dyn RasterBand>> {
        index.checked_sub(1).and_then(|i| self.bands.get(i)).cloned()
    }

    fn file_list(&self) -> Vec<String> {
        let mut files: Vec<String> = self.bands.iter().flat_map(|b| b.file_list()).collect();
        files.sort();
        files.dedup();
        files
    }
}

/// Opener resolving names against datasets registered in memory.
///
/// Counts successful opens so callers can observe deferred and shared opening.
#[derive(Debug, Default)]
pub struct MemOpener {
    datasets: RwLock<HashMap<String, Arc<dyn RasterDataset>>>,
    opens: AtomicUsize,
}

impl MemOpener {
    /// Empty opener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `dataset` openable as `name`.
    pub fn register(&self, name: impl Into<String>, dataset: impl RasterDataset + 'static) {
        self.datasets.write().insert(name.into(), Arc::new(dataset));
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DatasetOpener for MemOpener {
    fn open(&self, name: &str) -> VirtbandResult<Arc<dyn RasterDataset>> {
        let ds = self
            .datasets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VirtbandError::resource(format!("no dataset registered as '{name}'")))?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(ds)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/memory.rs"]
mod tests;
