use crate::foundation::core::{DataType, PixelWindow};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::foundation::math::Working;
use crate::geometry::window::{BandRequest, pad_window};
use crate::raster::buffer::BufferViewMut;
use crate::scratch::WorkingBuffers;
use crate::source::complex::{ComplexSource, ValueSink};

/// Square convolution kernel.
///
/// A separable kernel stores one row of `size` coefficients applied horizontally then
/// vertically; a full kernel stores `size * size` coefficients in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    size: usize,
    coefficients: Vec<f64>,
    separable: bool,
    normalized: bool,
}

impl Kernel {
    /// Validate and build a kernel.
    pub fn new(
        size: usize,
        coefficients: Vec<f64>,
        separable: bool,
        normalized: bool,
    ) -> VirtbandResult<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(VirtbandError::configuration(format!(
                "kernel size must be odd, got {size}"
            )));
        }
        let expected = if separable { size } else { size * size };
        if coefficients.len() != expected {
            return Err(VirtbandError::configuration(format!(
                "kernel of size {size} needs {expected} coefficients, got {}",
                coefficients.len()
            )));
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(VirtbandError::configuration("kernel coefficients must be finite"));
        }
        if normalized && coefficients.iter().sum::<f64>() == 0.0 {
            return Err(VirtbandError::configuration(
                "normalized kernel coefficients must not sum to zero",
            ));
        }
        Ok(Self {
            size,
            coefficients,
            separable,
            normalized,
        })
    }

    /// Normalized box filter of `size × size`.
    pub fn average(size: usize) -> VirtbandResult<Self> {
        Self::new(size, vec![1.0; size], true, true)
    }

    /// Side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pixels of context needed on each side.
    pub fn radius(&self) -> u32 {
        (self.size / 2) as u32
    }

    /// Coefficients as stored.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Return `true` for a one-row separable kernel.
    pub fn is_separable(&self) -> bool {
        self.separable
    }

    /// Return `true` when results are divided by the sum of contributing coefficients.
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }
}

/// Pixel types a kernel source can produce.
///
/// 64-bit integers are excluded: their values do not survive the `f64` accumulation.
pub fn kernel_supports(data_type: DataType) -> bool {
    !matches!(data_type, DataType::UInt64 | DataType::Int64)
}

/// Transforming source followed by a convolution.
#[derive(Debug)]
pub struct KernelFilteredSource {
    inner: ComplexSource,
    kernel: Kernel,
}

impl KernelFilteredSource {
    /// Filter the output of `inner` with `kernel`.
    pub fn new(inner: ComplexSource, kernel: Kernel) -> Self {
        Self { inner, kernel }
    }

    /// Box filter of `size × size` over `inner`.
    pub fn average(inner: ComplexSource, size: usize) -> VirtbandResult<Self> {
        Ok(Self::new(inner, Kernel::average(size)?))
    }

    /// Transforming source feeding the filter.
    pub fn inner(&self) -> &ComplexSource {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut ComplexSource {
        &mut self.inner
    }

    /// Convolution kernel.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Reject output types outside the supported set.
    pub fn check_type(&self, data_type: DataType) -> VirtbandResult<()> {
        if kernel_supports(data_type) {
            Ok(())
        } else {
            Err(VirtbandError::configuration(format!(
                "kernel filtering does not support {data_type} output"
            )))
        }
    }

    /// Filter the served part of `request` into `out`.
    ///
    /// Filtering runs at band resolution over the request grown by the kernel radius; scaled
    /// requests then pick the nearest filtered pixel.
    #[tracing::instrument(skip(self, out, scratch), fields(size = self.kernel.size))]
    pub fn read(
        &self,
        request: &BandRequest,
        band_size: (u32, u32),
        out: &mut BufferViewMut<'_>,
        scratch: &mut WorkingBuffers,
    ) -> VirtbandResult<()> {
        self.check_type(out.data_type())?;
        let padded = pad_window(request.window, self.kernel.radius(), band_size)?;
        let outer = padded.outer;
        let n = outer.pixel_count();

        let mut values = scratch.take::<f64>(n);
        let mut valid = scratch.take::<u8>(n);
        let mut sink = DenseSink {
            width: outer.x_size as usize,
            values: &mut values,
            valid: &mut valid,
        };
        self.inner.read_with(
            &BandRequest::unscaled(outer),
            band_size,
            DataType::Float64,
            scratch,
            &mut sink,
        )?;

        let inner = padded.inner;
        let m = inner.pixel_count();
        let mut filtered = scratch.take::<f64>(m);
        let mut filtered_valid = scratch.take::<u8>(m);
        let plane = Plane {
            width: outer.x_size as usize,
            height: outer.y_size as usize,
            values: &values,
            valid: &valid,
        };
        if self.kernel.separable {
            let mut tmp = scratch.take::<f64>(n);
            horizontal_pass(&plane, &self.kernel, &mut tmp);
            let rows = Plane {
                values: &tmp,
                ..plane
            };
            vertical_pass(&rows, &self.kernel, inner, &mut filtered, &mut filtered_valid);
            scratch.give(tmp);
        } else {
            convolve_2d(&plane, &self.kernel, inner, &mut filtered, &mut filtered_valid);
        }

        let result = if request.is_unscaled() {
            out.write_from(&filtered, Some(&filtered_valid))
        } else {
            let (picked, picked_valid) =
                pick_nearest(&filtered, &filtered_valid, inner, request, scratch);
            let r = out.write_from(&picked, Some(&picked_valid));
            scratch.give(picked);
            scratch.give(picked_valid);
            r
        };

        scratch.give(values);
        scratch.give(valid);
        scratch.give(filtered);
        scratch.give(filtered_valid);
        result
    }
}

/// Dense `f64` plane collecting transformed tiles at band resolution.
struct DenseSink<'a> {
    width: usize,
    values: &'a mut [f64],
    valid: &'a mut [u8],
}

impl ValueSink for DenseSink<'_> {
    fn accept<W: Working>(
        &mut self,
        window: PixelWindow,
        values: &[W],
        valid: Option<&[u8]>,
    ) -> VirtbandResult<()> {
        let w = window.x_size as usize;
        for (row, chunk) in values.chunks_exact(w.max(1)).enumerate() {
            let start = (window.y_off as usize + row) * self.width + window.x_off as usize;
            for (col, v) in chunk.iter().enumerate() {
                if valid.is_none_or(|m| m[row * w + col] != 0) {
                    self.values[start + col] = v.to_f64();
                    self.valid[start + col] = 1;
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct Plane<'a> {
    width: usize,
    height: usize,
    values: &'a [f64],
    valid: &'a [u8],
}

impl Plane<'_> {
    /// Index of `(x, y)` with coordinates clamped to the plane, replicating edge pixels.
    fn clamped(&self, x: isize, y: isize) -> usize {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        y * self.width + x
    }
}

struct Acc {
    sum: f64,
    weight: f64,
}

impl Acc {
    fn new() -> Self {
        Self {
            sum: 0.0,
            weight: 0.0,
        }
    }

    fn add(&mut self, coefficient: f64, value: f64) {
        self.sum += coefficient * value;
        self.weight += coefficient;
    }

    fn finish(&self, normalized: bool) -> Option<f64> {
        if !normalized {
            return Some(self.sum);
        }
        (self.weight != 0.0).then(|| self.sum / self.weight)
    }
}

/// Horizontal pass over every row of the plane; invalid taps are skipped.
fn horizontal_pass(src: &Plane<'_>, k: &Kernel, dst: &mut [f64]) {
    let r = k.radius() as isize;
    for y in 0..src.height {
        for x in 0..src.width {
            let idx = y * src.width + x;
            if src.valid[idx] == 0 {
                continue;
            }
            let mut acc = Acc::new();
            for (ki, &c) in k.coefficients.iter().enumerate() {
                let t = src.clamped(x as isize + ki as isize - r, y as isize);
                if src.valid[t] != 0 {
                    acc.add(c, src.values[t]);
                }
            }
            dst[idx] = acc.finish(k.normalized).unwrap_or(f64::NAN);
        }
    }
}

/// Vertical pass producing the `inner` region.
fn vertical_pass(
    src: &Plane<'_>,
    k: &Kernel,
    inner: PixelWindow,
    dst: &mut [f64],
    dst_valid: &mut [u8],
) {
    let r = k.radius() as isize;
    let w = inner.x_size as usize;
    for j in 0..inner.y_size as usize {
        let y = inner.y_off as usize + j;
        for i in 0..w {
            let x = inner.x_off as usize + i;
            let out = j * w + i;
            dst_valid[out] = 0;
            if src.valid[y * src.width + x] == 0 {
                continue;
            }
            let mut acc = Acc::new();
            for (ki, &c) in k.coefficients.iter().enumerate() {
                let t = src.clamped(x as isize, y as isize + ki as isize - r);
                if src.valid[t] != 0 && !src.values[t].is_nan() {
                    acc.add(c, src.values[t]);
                }
            }
            if let Some(v) = acc.finish(k.normalized) {
                dst[out] = v;
                dst_valid[out] = 1;
            }
        }
    }
}

/// Full 2D convolution producing the `inner` region.
fn convolve_2d(
    src: &Plane<'_>,
    k: &Kernel,
    inner: PixelWindow,
    dst: &mut [f64],
    dst_valid: &mut [u8],
) {
    let r = k.radius() as isize;
    let size = k.size;
    let w = inner.x_size as usize;
    for j in 0..inner.y_size as usize {
        let y = inner.y_off as usize + j;
        for i in 0..w {
            let x = inner.x_off as usize + i;
            let out = j * w + i;
            dst_valid[out] = 0;
            if src.valid[y * src.width + x] == 0 {
                continue;
            }
            let mut acc = Acc::new();
            for (ki, &c) in k.coefficients.iter().enumerate() {
                let (kx, ky) = ((ki % size) as isize, (ki / size) as isize);
                let t = src.clamped(x as isize + kx - r, y as isize + ky - r);
                if src.valid[t] != 0 {
                    acc.add(c, src.values[t]);
                }
            }
            if let Some(v) = acc.finish(k.normalized) {
                dst[out] = v;
                dst_valid[out] = 1;
            }
        }
    }
}

/// Nearest-neighbour pick of a band-resolution tile into the request buffer size.
fn pick_nearest(
    values: &[f64],
    valid: &[u8],
    tile: PixelWindow,
    request: &BandRequest,
    scratch: &mut WorkingBuffers,
) -> (Vec<f64>, Vec<u8>) {
    let (bw, bh) = (request.buf_width as usize, request.buf_height as usize);
    let mut out = scratch.take::<f64>(bw * bh);
    let mut out_valid = scratch.take::<u8>(bw * bh);
    let sx = f64::from(tile.x_size) / bw as f64;
    let sy = f64::from(tile.y_size) / bh as f64;
    let tw = tile.x_size as usize;
    for j in 0..bh {
        let ty = (((j as f64 + 0.5) * sy) as usize).min(tile.y_size as usize - 1);
        for i in 0..bw {
            let tx = (((i as f64 + 0.5) * sx) as usize).min(tw - 1);
            out[j * bw + i] = values[ty * tw + tx];
            out_valid[j * bw + i] = valid[ty * tw + tx];
        }
    }
    (out, out_valid)
}

#[cfg(test)]
#[path = "../../tests/unit/source/kernel.rs"]
mod tests;
