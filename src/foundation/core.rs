use crate::foundation::error::{VirtbandError, VirtbandResult};

pub use kurbo::{Point, Rect};

/// Pixel sample type of a band or buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// Signed 64-bit integer.
    Int64,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
}

impl DataType {
    /// Size of one sample in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            Self::Byte | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::UInt64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Return `true` for the floating point types.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Inclusive value range representable by this type.
    pub fn range(self) -> (f64, f64) {
        match self {
            Self::Byte => (0.0, f64::from(u8::MAX)),
            Self::Int8 => (f64::from(i8::MIN), f64::from(i8::MAX)),
            Self::UInt16 => (0.0, f64::from(u16::MAX)),
            Self::Int16 => (f64::from(i16::MIN), f64::from(i16::MAX)),
            Self::UInt32 => (0.0, f64::from(u32::MAX)),
            Self::Int32 => (f64::from(i32::MIN), f64::from(i32::MAX)),
            Self::UInt64 => (0.0, u64::MAX as f64),
            Self::Int64 => (i64::MIN as f64, i64::MAX as f64),
            Self::Float32 => (f64::from(f32::MIN), f64::from(f32::MAX)),
            Self::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Return `true` when every value of this type is exactly representable as `f32`.
    pub fn fits_in_f32(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Int8 | Self::UInt16 | Self::Int16 | Self::Float32
        )
    }

    /// Adjust a nodata value to what a sample of this type can actually hold.
    ///
    /// Returns `None` when no sample of this type can ever equal `value` (non-integral or
    /// out-of-range values on integer types).
    pub fn adjust_nodata(self, value: f64) -> Option<f64> {
        if value.is_nan() {
            return self.is_float().then_some(f64::NAN);
        }
        match self {
            Self::Float64 => Some(value),
            Self::Float32 => {
                if value.is_infinite() {
                    return Some(value);
                }
                let (lo, hi) = self.range();
                (lo..=hi).contains(&value).then_some(f64::from(value as f32))
            }
            _ => {
                let (lo, hi) = self.range();
                (value.fract() == 0.0 && (lo..=hi).contains(&value)).then_some(value)
            }
        }
    }

    /// Stable lowercase name, as used in declarations.
    pub fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Int8 => "int8",
            Self::UInt16 => "uint16",
            Self::Int16 => "int16",
            Self::UInt32 => "uint32",
            Self::Int32 => "int32",
            Self::UInt64 => "uint64",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer pixel window `(x_off, y_off, x_size, y_size)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelWindow {
    /// Column of the top-left pixel.
    pub x_off: u32,
    /// Row of the top-left pixel.
    pub y_off: u32,
    /// Width in pixels.
    pub x_size: u32,
    /// Height in pixels.
    pub y_size: u32,
}

impl PixelWindow {
    /// Create a window from offsets and sizes.
    pub fn new(x_off: u32, y_off: u32, x_size: u32, y_size: u32) -> Self {
        Self {
            x_off,
            y_off,
            x_size,
            y_size,
        }
    }

    /// Window covering a whole `width × height` raster.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Return `true` when the window holds no pixel.
    pub fn is_empty(self) -> bool {
        self.x_size == 0 || self.y_size == 0
    }

    /// Exclusive right edge.
    pub fn x_end(self) -> u64 {
        u64::from(self.x_off) + u64::from(self.x_size)
    }

    /// Exclusive bottom edge.
    pub fn y_end(self) -> u64 {
        u64::from(self.y_off) + u64::from(self.y_size)
    }

    /// Number of pixels in the window.
    pub fn pixel_count(self) -> usize {
        (self.x_size as usize).saturating_mul(self.y_size as usize)
    }

    /// Fractional rectangle spanning the same pixels.
    pub fn to_rect(self) -> Rect {
        Rect::new(
            f64::from(self.x_off),
            f64::from(self.y_off),
            self.x_end() as f64,
            self.y_end() as f64,
        )
    }

    /// Check that the window is non-empty and lies inside a `width × height` raster.
    pub fn check_within(self, width: u32, height: u32) -> VirtbandResult<()> {
        if self.is_empty() {
            return Err(VirtbandError::geometry(format!(
                "window {}x{} is degenerate",
                self.x_size, self.y_size
            )));
        }
        if self.x_end() > u64::from(width) || self.y_end() > u64::from(height) {
            return Err(VirtbandError::geometry(format!(
                "window ({},{},{},{}) exceeds raster {width}x{height}",
                self.x_off, self.y_off, self.x_size, self.y_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
