//! Per-pixel value pipeline of transforming sources.
//!
//! [`Transform`] is the configured state: a stage bitmask plus stage parameters. Before each read
//! it resolves into a [`Pipeline`], a flat list of steps with every parameter fixed and the
//! working float type chosen. Each step then runs one tight loop over the whole tile.

use smallvec::SmallVec;

use crate::foundation::core::DataType;
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::foundation::math::Working;
use crate::raster::contributor::RasterBand;

/// Set of active pipeline stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stages(u8);

impl Stages {
    /// Exclude pixels equal to the nodata value.
    pub const NODATA: Self = Self(1 << 0);
    /// Exclude pixels masked out by the contributor's mask band.
    pub const MASK: Self = Self(1 << 1);
    /// Replace palette indices by one palette channel.
    pub const COLOR_TABLE: Self = Self(1 << 2);
    /// `value * ratio + offset`.
    pub const LINEAR: Self = Self(1 << 3);
    /// Normalized power-law scaling.
    pub const EXPONENTIAL: Self = Self(1 << 4);
    /// Piecewise linear lookup table.
    pub const LUT: Self = Self(1 << 5);

    /// No active stage.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Return `true` when no stage is active.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Return `true` when every stage of `other` is active.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Return `true` when any stage of `other` is active.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Activate `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Deactivate `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Reject combinations of mutually exclusive stages.
    pub fn validate(self) -> VirtbandResult<()> {
        if self.contains(Self::NODATA.union(Self::MASK)) {
            return Err(VirtbandError::configuration(
                "nodata and mask band processing are mutually exclusive",
            ));
        }
        if self.contains(Self::LINEAR.union(Self::EXPONENTIAL)) {
            return Err(VirtbandError::configuration(
                "linear and exponential scaling are mutually exclusive",
            ));
        }
        Ok(())
    }

    const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Lookup table with strictly increasing inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Lut {
    inputs: Vec<f64>,
    outputs: Vec<f64>,
}

impl Lut {
    /// Build a table from `(input, output)` breakpoints.
    pub fn new(pairs: impl IntoIterator<Item = (f64, f64)>) -> VirtbandResult<Self> {
        let (inputs, outputs): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        if inputs.is_empty() {
            return Err(VirtbandError::configuration("lookup table needs at least one entry"));
        }
        if inputs.iter().chain(&outputs).any(|v| !v.is_finite()) {
            return Err(VirtbandError::configuration("lookup table entries must be finite"));
        }
        if inputs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(VirtbandError::configuration(
                "lookup table inputs must be strictly increasing",
            ));
        }
        Ok(Self { inputs, outputs })
    }

    /// Breakpoints in input order.
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.inputs.iter().copied().zip(self.outputs.iter().copied())
    }

    /// Interpolate `v`, clamping outside the first and last breakpoint.
    pub fn eval(&self, v: f64) -> f64 {
        if v.is_nan() {
            return v;
        }
        let last = self.inputs.len() - 1;
        let i = self.inputs.partition_point(|&x| x < v);
        if i == 0 {
            return self.outputs[0];
        }
        if i > last {
            return self.outputs[last];
        }
        let (x0, x1) = (self.inputs[i - 1], self.inputs[i]);
        let (y0, y1) = (self.outputs[i - 1], self.outputs[i]);
        y0 + (v - x0) * (y1 - y0) / (x1 - x0)
    }
}

/// Exponential scaling parameters; missing source bounds come from the contributor statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpScaling {
    /// Power applied to the normalized value.
    pub exponent: f64,
    /// Value mapped to `dst_min`.
    pub src_min: Option<f64>,
    /// Value mapped to `dst_max`.
    pub src_max: Option<f64>,
    /// Output for normalized 0.
    pub dst_min: f64,
    /// Output for normalized 1.
    pub dst_max: f64,
}

/// Numeric type the pipeline runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkingType {
    /// `f32`, when source and destination both fit.
    F32,
    /// `f64` otherwise.
    F64,
}

impl WorkingType {
    /// Narrowest float exactly holding both `src` and `dst` values.
    pub fn for_types(src: DataType, dst: DataType) -> Self {
        if src.fits_in_f32() && dst.fits_in_f32() {
            Self::F32
        } else {
            Self::F64
        }
    }
}

/// Configured transform of a transforming source.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    stages: Stages,
    nodata: f64,
    color_component: u8,
    ratio: f64,
    offset: f64,
    exp: ExpScaling,
    lut: Option<Lut>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            stages: Stages::empty(),
            nodata: 0.0,
            color_component: 0,
            ratio: 1.0,
            offset: 0.0,
            exp: ExpScaling {
                exponent: 1.0,
                src_min: None,
                src_max: None,
                dst_min: 0.0,
                dst_max: 0.0,
            },
            lut: None,
        }
    }
}

impl Transform {
    /// Identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active stages.
    pub fn stages(&self) -> Stages {
        self.stages
    }

    fn activate(&mut self, stage: Stages) -> VirtbandResult<()> {
        let mut next = self.stages;
        next.insert(stage);
        next.validate()?;
        self.stages = next;
        Ok(())
    }

    /// Exclude pixels equal to `nodata`.
    pub fn set_nodata(&mut self, nodata: f64) -> VirtbandResult<()> {
        self.activate(Stages::NODATA)?;
        self.nodata = nodata;
        Ok(())
    }

    /// Stop excluding a nodata value.
    pub fn clear_nodata(&mut self) {
        self.stages.remove(Stages::NODATA);
    }

    /// Configured nodata value.
    pub fn nodata(&self) -> Option<f64> {
        self.stages.contains(Stages::NODATA).then_some(self.nodata)
    }

    /// Toggle exclusion of pixels masked by the contributor's mask band.
    pub fn set_use_mask_band(&mut self, use_mask: bool) -> VirtbandResult<()> {
        if use_mask {
            self.activate(Stages::MASK)
        } else {
            self.stages.remove(Stages::MASK);
            Ok(())
        }
    }

    /// Return `true` when the mask band stage is active.
    pub fn uses_mask_band(&self) -> bool {
        self.stages.contains(Stages::MASK)
    }

    /// Replace palette indices by channel `component` (1..=4), or disable with 0.
    pub fn set_color_table_component(&mut self, component: u8) -> VirtbandResult<()> {
        if component > 4 {
            return Err(VirtbandError::configuration(format!(
                "color table component must be in 0..=4, got {component}"
            )));
        }
        if component == 0 {
            self.stages.remove(Stages::COLOR_TABLE);
        } else {
            self.activate(Stages::COLOR_TABLE)?;
        }
        self.color_component = component;
        Ok(())
    }

    /// Palette channel in use, 0 when disabled.
    pub fn color_table_component(&self) -> u8 {
        if self.stages.contains(Stages::COLOR_TABLE) {
            self.color_component
        } else {
            0
        }
    }

    /// Scale linearly: `value * ratio + offset`.
    pub fn set_linear_scaling(&mut self, ratio: f64, offset: f64) -> VirtbandResult<()> {
        if !ratio.is_finite() || !offset.is_finite() {
            return Err(VirtbandError::configuration("scale ratio and offset must be finite"));
        }
        self.activate(Stages::LINEAR)?;
        self.ratio = ratio;
        self.offset = offset;
        Ok(())
    }

    /// Linear `(ratio, offset)`, when linear scaling is active.
    pub fn linear_scaling(&self) -> Option<(f64, f64)> {
        self.stages
            .contains(Stages::LINEAR)
            .then_some((self.ratio, self.offset))
    }

    /// Scale with a normalized power law.
    pub fn set_exponential_scaling(&mut self, exp: ExpScaling) -> VirtbandResult<()> {
        if !exp.exponent.is_finite() || exp.exponent <= 0.0 {
            return Err(VirtbandError::configuration("exponent must be finite and > 0"));
        }
        self.activate(Stages::EXPONENTIAL)?;
        self.exp = exp;
        Ok(())
    }

    /// Exponential parameters, when exponential scaling is active.
    pub fn exponential_scaling(&self) -> Option<ExpScaling> {
        self.stages.contains(Stages::EXPONENTIAL).then_some(self.exp)
    }

    /// Disable both scaling stages.
    pub fn clear_scaling(&mut self) {
        self.stages.remove(Stages::LINEAR);
        self.stages.remove(Stages::EXPONENTIAL);
    }

    /// Install or remove a lookup table.
    pub fn set_lut(&mut self, lut: Option<Lut>) {
        if lut.is_some() {
            self.stages.insert(Stages::LUT);
        } else {
            self.stages.remove(Stages::LUT);
        }
        self.lut = lut;
    }

    /// Installed lookup table.
    pub fn lut(&self) -> Option<&Lut> {
        self.lut.as_ref()
    }

    /// Return `true` when every pixel passes through unchanged and unmasked.
    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    /// Return `true` when the transform may leave pixels without contribution.
    pub fn may_mask(&self) -> bool {
        self.stages.intersects(Stages::NODATA.union(Stages::MASK))
    }

    /// Fix every parameter for one read from `contributor` into `dst_type`.
    pub(crate) fn resolve(
        &self,
        contributor: &dyn RasterBand,
        dst_type: DataType,
    ) -> VirtbandResult<Pipeline> {
        self.stages.validate()?;
        let src_type = contributor.data_type();
        let mut steps = SmallVec::new();

        if self.stages.contains(Stages::NODATA) {
            match src_type.adjust_nodata(self.nodata) {
                Some(nd) if nd.is_nan() => steps.push(Step::NodataNan),
                Some(nd) => steps.push(Step::Nodata(nd)),
                // Not representable in the contributor type: nothing can match.
                None => {}
            }
        }
        if self.stages.contains(Stages::COLOR_TABLE) {
            let table = contributor.color_table().ok_or_else(|| {
                VirtbandError::configuration(
                    "color table component requested but contributor has no palette",
                )
            })?;
            steps.push(Step::Palette(table.component(self.color_component)?));
        }
        if self.stages.contains(Stages::LINEAR) {
            steps.push(Step::Linear {
                ratio: self.ratio,
                offset: self.offset,
            });
        }
        if self.stages.contains(Stages::EXPONENTIAL) {
            let src_min = self.exp.src_min.or_else(|| contributor.minimum());
            let src_max = self.exp.src_max.or_else(|| contributor.maximum());
            let (Some(src_min), Some(src_max)) = (src_min, src_max) else {
                return Err(VirtbandError::configuration(
                    "exponential scaling needs a source range or contributor statistics",
                ));
            };
            let range = src_max - src_min;
            steps.push(Step::Exponential {
                src_min,
                inv_range: if range > 0.0 { 1.0 / range } else { 0.0 },
                dst_min: self.exp.dst_min,
                dst_span: self.exp.dst_max - self.exp.dst_min,
                exponent: self.exp.exponent,
            });
        }
        if let Some(lut) = self.lut.as_ref().filter(|_| self.stages.contains(Stages::LUT)) {
            steps.push(Step::Lut(lut.clone()));
        }

        Ok(Pipeline {
            working: WorkingType::for_types(src_type, dst_type),
            use_mask: self.stages.contains(Stages::MASK),
            steps,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Step {
    Nodata(f64),
    NodataNan,
    Palette(Vec<f64>),
    Linear {
        ratio: f64,
        offset: f64,
    },
    Exponential {
        src_min: f64,
        inv_range: f64,
        dst_min: f64,
        dst_span: f64,
        exponent: f64,
    },
    Lut(Lut),
}

/// Resolved execution path of one read.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Pipeline {
    pub(crate) working: WorkingType,
    pub(crate) use_mask: bool,
    steps: SmallVec<[Step; 4]>,
}

impl Pipeline {
    /// Return `true` when some pixels may end up without contribution.
    pub(crate) fn needs_validity(&self) -> bool {
        self.use_mask
            || self
                .steps
                .iter()
                .any(|s| matches!(s, Step::Nodata(_) | Step::NodataNan))
    }

    /// Run every step over `values`, clearing `valid` for excluded pixels.
    pub(crate) fn apply<W: Working>(&self, values: &mut [W], valid: &mut [u8]) {
        for step in &self.steps {
            match step {
                Step::Nodata(nd) => {
                    let nd = W::from_f64_lossy(*nd);
                    for (v, ok) in values.iter().zip(valid.iter_mut()) {
                        *ok &= u8::from(*v != nd);
                    }
                }
                Step::NodataNan => {
                    for (v, ok) in values.iter().zip(valid.iter_mut()) {
                        *ok &= u8::from(!v.is_nan());
                    }
                }
                Step::Palette(table) => {
                    for v in values.iter_mut() {
                        *v = W::from_f64_lossy(palette_entry(table, v.to_f64()));
                    }
                }
                Step::Linear { ratio, offset } => {
                    let (r, o) = (W::from_f64_lossy(*ratio), W::from_f64_lossy(*offset));
                    for v in values.iter_mut() {
                        *v = *v * r + o;
                    }
                }
                Step::Exponential {
                    src_min,
                    inv_range,
                    dst_min,
                    dst_span,
                    exponent,
                } => {
                    let smin = W::from_f64_lossy(*src_min);
                    let inv = W::from_f64_lossy(*inv_range);
                    let dmin = W::from_f64_lossy(*dst_min);
                    let span = W::from_f64_lossy(*dst_span);
                    let e = W::from_f64_lossy(*exponent);
                    for v in values.iter_mut() {
                        let n = (*v - smin) * inv;
                        let n = if n < W::ZERO {
                            W::ZERO
                        } else if n > W::ONE {
                            W::ONE
                        } else {
                            n
                        };
                        *v = dmin + span * n.powf(e);
                    }
                }
                Step::Lut(lut) => {
                    for v in values.iter_mut() {
                        *v = W::from_f64_lossy(lut.eval(v.to_f64()));
                    }
                }
            }
        }
    }
}

fn palette_entry(table: &[f64], index: f64) -> f64 {
    if index.is_nan() || index < 0.0 {
        return 0.0;
    }
    table.get(index as usize).copied().unwrap_or(0.0)
}

#[cfg(test)]
#[path = "../../tests/unit/source/pipeline.rs"]
mod tests;
