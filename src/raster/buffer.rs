use crate::foundation::core::{DataType, PixelWindow};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::foundation::math::Pixel;

/// Typed sample storage behind a [`RasterBuffer`].
#[derive(Clone, Debug, PartialEq)]
pub enum BufferData {
    /// `u8` samples.
    Byte(Vec<u8>),
    /// `i8` samples.
    Int8(Vec<i8>),
    /// `u16` samples.
    UInt16(Vec<u16>),
    /// `i16` samples.
    Int16(Vec<i16>),
    /// `u32` samples.
    UInt32(Vec<u32>),
    /// `i32` samples.
    Int32(Vec<i32>),
    /// `u64` samples.
    UInt64(Vec<u64>),
    /// `i64` samples.
    Int64(Vec<i64>),
    /// `f32` samples.
    Float32(Vec<f32>),
    /// `f64` samples.
    Float64(Vec<f64>),
}

/// Run `$body` with `$v` bound to the typed vector inside a [`BufferData`].
///
/// The body is monomorphized once per sample type, so generic helpers called from it run
/// without per-sample type dispatch.
macro_rules! with_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::raster::buffer::BufferData::Byte($v) => $body,
            $crate::raster::buffer::BufferData::Int8($v) => $body,
            $crate::raster::buffer::BufferData::UInt16($v) => $body,
            $crate::raster::buffer::BufferData::Int16($v) => $body,
            $crate::raster::buffer::BufferData::UInt32($v) => $body,
            $crate::raster::buffer::BufferData::Int32($v) => $body,
            $crate::raster::buffer::BufferData::UInt64($v) => $body,
            $crate::raster::buffer::BufferData::Int64($v) => $body,
            $crate::raster::buffer::BufferData::Float32($v) => $body,
            $crate::raster::buffer::BufferData::Float64($v) => $body,
        }
    };
}
pub(crate) use with_data;

impl BufferData {
    /// Zero-initialized storage of `len` samples.
    pub fn zeroed(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Byte => Self::Byte(vec![0; len]),
            DataType::Int8 => Self::Int8(vec![0; len]),
            DataType::UInt16 => Self::UInt16(vec![0; len]),
            DataType::Int16 => Self::Int16(vec![0; len]),
            DataType::UInt32 => Self::UInt32(vec![0; len]),
            DataType::Int32 => Self::Int32(vec![0; len]),
            DataType::UInt64 => Self::UInt64(vec![0; len]),
            DataType::Int64 => Self::Int64(vec![0; len]),
            DataType::Float32 => Self::Float32(vec![0.0; len]),
            DataType::Float64 => Self::Float64(vec![0.0; len]),
        }
    }

    /// Sample type of this storage.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Byte(_) => DataType::Byte,
            Self::Int8(_) => DataType::Int8,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int16(_) => DataType::Int16,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int32(_) => DataType::Int32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Int64(_) => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
        }
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    /// Return `true` when no sample is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, idx: usize) -> f64 {
        with_data!(self, v => v[idx].to_f64())
    }

    fn set(&mut self, idx: usize, value: f64) {
        with_data!(self, v => v[idx] = Pixel::from_f64(value))
    }
}

/// Sample types that can back a [`BufferData`].
pub trait BufferSample: Pixel {
    /// Wrap an owned vector.
    fn into_data(values: Vec<Self>) -> BufferData;

    /// Borrow the typed samples when `data` holds this type.
    fn slice(data: &BufferData) -> Option<&[Self]>;

    /// Take the typed vector back out of `data` when it holds this type.
    fn from_data(data: BufferData) -> Option<Vec<Self>>;
}

macro_rules! impl_buffer_sample {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl BufferSample for $t {
                fn into_data(values: Vec<Self>) -> BufferData {
                    BufferData::$variant(values)
                }

                fn slice(data: &BufferData) -> Option<&[Self]> {
                    match data {
                        BufferData::$variant(v) => Some(v.as_slice()),
                        _ => None,
                    }
                }

                fn from_data(data: BufferData) -> Option<Vec<Self>> {
                    match data {
                        BufferData::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_buffer_sample!(
    u8 => Byte,
    i8 => Int8,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    u64 => UInt64,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
);

/// Typed 2D sample buffer with element spacings.
///
/// Sample `(x, y)` lives at `y * line_spacing + x * pixel_spacing`, both in elements. A dense
/// row-major buffer has `pixel_spacing == 1` and `line_spacing == width`.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterBuffer {
    data: BufferData,
    width: u32,
    height: u32,
    pixel_spacing: usize,
    line_spacing: usize,
}

impl RasterBuffer {
    /// Dense zero-initialized buffer.
    pub fn new(data_type: DataType, width: u32, height: u32) -> Self {
        let len = (width as usize).saturating_mul(height as usize);
        Self {
            data: BufferData::zeroed(data_type, len),
            width,
            height,
            pixel_spacing: 1,
            line_spacing: width as usize,
        }
    }

    /// Dense buffer with every sample set to `value`.
    pub fn filled(data_type: DataType, width: u32, height: u32, value: f64) -> Self {
        let mut buf = Self::new(data_type, width, height);
        buf.full_view_mut().fill(value);
        buf
    }

    /// Zero-initialized buffer with explicit element spacings.
    pub fn with_spacing(
        data_type: DataType,
        width: u32,
        height: u32,
        pixel_spacing: usize,
        line_spacing: usize,
    ) -> VirtbandResult<Self> {
        if pixel_spacing == 0 || line_spacing == 0 {
            return Err(VirtbandError::configuration(
                "buffer spacings must be non-zero",
            ));
        }
        if width > 1 && height > 1 && line_spacing < pixel_spacing * width as usize {
            return Err(VirtbandError::configuration(
                "line spacing must not overlap pixels of the same line",
            ));
        }
        let len = required_len(width, height, pixel_spacing, line_spacing);
        Ok(Self {
            data: BufferData::zeroed(data_type, len),
            width,
            height,
            pixel_spacing,
            line_spacing,
        })
    }

    /// Dense buffer wrapping row-major samples.
    pub fn from_vec<T: BufferSample>(
        width: u32,
        height: u32,
        values: Vec<T>,
    ) -> VirtbandResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| VirtbandError::configuration("buffer size overflow"))?;
        if values.len() != expected {
            return Err(VirtbandError::configuration(format!(
                "expected {expected} samples for a {width}x{height} buffer, got {}",
                values.len()
            )));
        }
        Ok(Self {
            data: T::into_data(values),
            width,
            height,
            pixel_spacing: 1,
            line_spacing: width as usize,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample type.
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Underlying storage.
    pub fn data(&self) -> &BufferData {
        &self.data
    }

    /// Borrow samples as `T` when the buffer holds that type.
    pub fn as_slice<T: BufferSample>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// Give back the samples as `T` when the buffer holds that type.
    pub fn into_vec<T: BufferSample>(self) -> Option<Vec<T>> {
        T::from_data(self.data)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.line_spacing + x as usize * self.pixel_spacing
    }

    /// Sample at `(x, y)` widened to `f64`.
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data.get(self.index(x, y))
    }

    /// Store `value` at `(x, y)` with rounding and saturation to the buffer type.
    pub fn set(&mut self, x: u32, y: u32, value: f64) {
        let idx = self.index(x, y);
        self.data.set(idx, value);
    }

    /// All samples in row-major order widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity((self.width as usize) * (self.height as usize));
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.get(x, y));
            }
        }
        out
    }

    /// Mutable view over the whole buffer.
    pub fn full_view_mut(&mut self) -> BufferViewMut<'_> {
        BufferViewMut {
            data: &mut self.data,
            base: 0,
            width: self.width,
            height: self.height,
            pixel_spacing: self.pixel_spacing,
            line_spacing: self.line_spacing,
        }
    }

    /// Mutable view over `window`, which must lie inside the buffer.
    pub fn view_mut(&mut self, window: PixelWindow) -> VirtbandResult<BufferViewMut<'_>> {
        self.full_view_mut().into_sub_view(window)
    }
}

fn required_len(width: u32, height: u32, pixel_spacing: usize, line_spacing: usize) -> usize {
    if width == 0 || height == 0 {
        return 0;
    }
    (height as usize - 1) * line_spacing + (width as usize - 1) * pixel_spacing + 1
}

/// Mutable rectangular view into a [`RasterBuffer`].
#[derive(Debug)]
pub struct BufferViewMut<'a> {
    data: &'a mut BufferData,
    base: usize,
    width: u32,
    height: u32,
    pixel_spacing: usize,
    line_spacing: usize,
}

impl<'a> BufferViewMut<'a> {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample type of the underlying buffer.
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        self.base + y as usize * self.line_spacing + x as usize * self.pixel_spacing
    }

    /// Sample at `(x, y)` widened to `f64`.
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data.get(self.index(x, y))
    }

    /// Store `value` at `(x, y)` with rounding and saturation to the buffer type.
    pub fn put(&mut self, x: u32, y: u32, value: f64) {
        let idx = self.index(x, y);
        self.data.set(idx, value);
    }

    /// Set every sample of the view to `value`.
    pub fn fill(&mut self, value: f64) {
        let (base, w, h, ps, ls) = self.layout();
        with_data!(&mut *self.data, v => {
            let fill = Pixel::from_f64(value);
            for y in 0..h {
                let row = base + y * ls;
                for x in 0..w {
                    v[row + x * ps] = fill;
                }
            }
        })
    }

    /// Reborrow a sub-window of this view.
    pub fn sub_view(&mut self, window: PixelWindow) -> VirtbandResult<BufferViewMut<'_>> {
        self.check_sub_window(window)?;
        Ok(BufferViewMut {
            base: self.index(window.x_off, window.y_off),
            data: &mut *self.data,
            width: window.x_size,
            height: window.y_size,
            pixel_spacing: self.pixel_spacing,
            line_spacing: self.line_spacing,
        })
    }

    fn into_sub_view(self, window: PixelWindow) -> VirtbandResult<BufferViewMut<'a>> {
        self.check_sub_window(window)?;
        let base = self.index(window.x_off, window.y_off);
        Ok(BufferViewMut {
            data: self.data,
            base,
            width: window.x_size,
            height: window.y_size,
            pixel_spacing: self.pixel_spacing,
            line_spacing: self.line_spacing,
        })
    }

    fn check_sub_window(&self, window: PixelWindow) -> VirtbandResult<()> {
        if window.x_end() > u64::from(self.width) || window.y_end() > u64::from(self.height) {
            return Err(VirtbandError::geometry(format!(
                "sub-window ({},{},{},{}) exceeds view {}x{}",
                window.x_off, window.y_off, window.x_size, window.y_size, self.width, self.height
            )));
        }
        Ok(())
    }

    fn layout(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.base,
            self.width as usize,
            self.height as usize,
            self.pixel_spacing,
            self.line_spacing,
        )
    }

    /// Write dense row-major `values` into the view, converting to the buffer type.
    ///
    /// When `valid` is given, only samples whose flag is non-zero are written; the others keep
    /// their previous content.
    pub fn write_from<S: Pixel>(
        &mut self,
        values: &[S],
        valid: Option<&[u8]>,
    ) -> VirtbandResult<()> {
        let (base, w, h, ps, ls) = self.layout();
        if values.len() != w * h || valid.is_some_and(|m| m.len() != w * h) {
            return Err(VirtbandError::io(format!(
                "write_from expects {} samples for a {w}x{h} view",
                w * h
            )));
        }
        with_data!(&mut *self.data, v => match valid {
            Some(mask) => write_masked(v, base, w, h, ps, ls, values, mask),
            None => write_all(v, base, w, h, ps, ls, values),
        });
        Ok(())
    }

    /// Copy the view into dense row-major `f64` samples.
    pub fn read_f64(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.get(x, y));
            }
        }
        out
    }
}

fn write_all<D: Pixel, S: Pixel>(
    dst: &mut [D],
    base: usize,
    w: usize,
    h: usize,
    ps: usize,
    ls: usize,
    values: &[S],
) {
    for (y, row) in values.chunks_exact(w.max(1)).take(h).enumerate() {
        let start = base + y * ls;
        for (x, s) in row.iter().enumerate() {
            dst[start + x * ps] = D::from_f64(s.to_f64());
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn write_masked<D: Pixel, S: Pixel>(
    dst: &mut [D],
    base: usize,
    w: usize,
    h: usize,
    ps: usize,
    ls: usize,
    values: &[S],
    valid: &[u8],
) {
    for y in 0..h {
        let start = base + y * ls;
        let row = &values[y * w..(y + 1) * w];
        let row_valid = &valid[y * w..(y + 1) * w];
        for x in 0..w {
            let slot = &mut dst[start + x * ps];
            let cur = *slot;
            *slot = if row_valid[x] != 0 {
                D::from_f64(row[x].to_f64())
            } else {
                cur
            };
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/raster/buffer.rs"]
mod tests;
