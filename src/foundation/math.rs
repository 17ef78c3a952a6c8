use crate::foundation::core::DataType;

/// Tolerance under which a fractional coordinate is treated as the nearby integer.
pub(crate) const EDGE_EPSILON: f64 = 1e-8;

/// Convert a fractional window edge to an integer pixel edge.
///
/// This is the only fractional-to-integer rule used for window geometry: edges (never sizes)
/// snap to a nearby integer first, then round half up. Integer sizes are always the difference
/// of two rounded edges, so two windows sharing an edge share its integer coordinate.
pub fn round_edge(x: f64) -> i64 {
    let nearest = x.round();
    if (x - nearest).abs() < EDGE_EPSILON {
        return nearest as i64;
    }
    (x + 0.5).floor() as i64
}

/// Typed sample stored in a raster buffer.
pub trait Pixel: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Matching [`DataType`].
    const DATA_TYPE: DataType;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;

    /// Narrow from `f64`, rounding to nearest and saturating to the type range.
    ///
    /// NaN becomes zero for integer types.
    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_int_pixel {
    ($($t:ty => $dt:ident),* $(,)?) => {
        $(
            impl Pixel for $t {
                const DATA_TYPE: DataType = DataType::$dt;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    // Float-to-int `as` saturates and maps NaN to zero.
                    v.round() as $t
                }
            }
        )*
    };
}

impl_int_pixel!(
    u8 => Byte,
    i8 => Int8,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    u64 => UInt64,
    i64 => Int64,
);

impl Pixel for f32 {
    const DATA_TYPE: DataType = DataType::Float32;

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        if v.is_finite() {
            v.clamp(f64::from(f32::MIN), f64::from(f32::MAX)) as f32
        } else {
            v as f32
        }
    }
}

impl Pixel for f64 {
    const DATA_TYPE: DataType = DataType::Float64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

/// Floating point type used while running a value pipeline.
pub trait Working:
    Pixel
    + PartialOrd
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
{
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;

    /// Narrow from `f64` without saturation.
    fn from_f64_lossy(v: f64) -> Self;

    /// `self` raised to `exp`.
    fn powf(self, exp: Self) -> Self;

    /// Return `true` for NaN.
    fn is_nan(self) -> bool;
}

impl Working for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn powf(self, exp: Self) -> Self {
        f32::powf(self, exp)
    }

    #[inline]
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}

impl Working for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v
    }

    #[inline]
    fn powf(self, exp: Self) -> Self {
        f64::powf(self, exp)
    }

    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
