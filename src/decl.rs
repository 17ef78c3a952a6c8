//! Declarative JSON format of composed bands and their sources.
//!
//! Field names follow the element names of the declarative format (`ContributorReference`,
//! `SourceWindow`, `NoDataValue`, ...). Every optional element may be omitted; omitted windows mean
//! full extent, omitted scaling means ratio 1 and offset 0.

use serde::{Deserialize, Serialize};

use crate::foundation::core::{DataType, Rect};
use crate::foundation::error::{VirtbandError, VirtbandResult};
use crate::geometry::window::{SourceWindow, rect_from_off_size, rect_to_off_size};
use crate::raster::contributor::Resampling;
use crate::source::{
    ComplexSource, ContributorRef, ExpScaling, Kernel, KernelFilteredSource, Lut,
    NamedContributor, SimpleSource, Source, Transform,
};

/// Declaration of a composed band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BandDecl {
    /// Band width in pixels.
    pub width: u32,
    /// Band height in pixels.
    pub height: u32,
    /// Sample type of the band.
    pub data_type: DataType,
    /// Band nodata value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data_value: Option<NodataDecl>,
    /// Block size used by block reads, as `[width, height]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<[u32; 2]>,
    /// Source declarations in paint order.
    ///
    /// Kept as raw JSON so one malformed source does not reject the whole band.
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
}

impl BandDecl {
    /// Parse a band declaration from JSON text.
    pub fn from_json(text: &str) -> VirtbandResult<Self> {
        serde_json::from_str(text).map_err(|e| VirtbandError::serde(e.to_string()))
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> VirtbandResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| VirtbandError::serde(e.to_string()))
    }
}

/// Declaration of one source, tagged by `Type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum SourceDecl {
    /// Plain windowed copy.
    PlainSource(PlainDecl),
    /// Windowed copy through a value transform.
    TransformingSource(TransformingDecl),
    /// Transformed copy followed by a convolution.
    ConvolutionFilteredSource(ConvolutionDecl),
}

impl SourceDecl {
    /// Parse one source from a JSON value.
    pub fn from_value(value: serde_json::Value) -> VirtbandResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| VirtbandError::configuration(format!("malformed source declaration: {e}")))
    }

    /// Encode as a JSON value.
    pub fn to_value(&self) -> VirtbandResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| VirtbandError::serde(e.to_string()))
    }
}

/// `ContributorReference` element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContributorDecl {
    /// Dataset name.
    pub name: String,
    /// Resolve `name` against the declaration's directory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub relative: bool,
    /// Explicit ownership override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
}

/// Fractional window `(XOff, YOff, XSize, YSize)`; also accepts a 4-element array.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WindowDecl {
    /// Left edge.
    pub x_off: f64,
    /// Top edge.
    pub y_off: f64,
    /// Width.
    pub x_size: f64,
    /// Height.
    pub y_size: f64,
}

impl<'de> Deserialize<'de> for WindowDecl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Arr([f64; 4]),
            #[serde(rename_all = "PascalCase")]
            Obj {
                x_off: f64,
                y_off: f64,
                x_size: f64,
                y_size: f64,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Arr([x_off, y_off, x_size, y_size]) | Repr::Obj {
                x_off,
                y_off,
                x_size,
                y_size,
            } => Ok(Self {
                x_off,
                y_off,
                x_size,
                y_size,
            }),
        }
    }
}

impl WindowDecl {
    fn to_rect(self) -> Rect {
        rect_from_off_size([self.x_off, self.y_off, self.x_size, self.y_size])
    }

    fn from_rect(r: Rect) -> Self {
        let [x_off, y_off, x_size, y_size] = rect_to_off_size(r);
        Self {
            x_off,
            y_off,
            x_size,
            y_size,
        }
    }
}

/// Nodata value: a number or one of `"nan"`, `"inf"`, `"-inf"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodataDecl {
    /// Finite value.
    Number(f64),
    /// Textual value, including the non-finite spellings.
    Text(String),
}

impl NodataDecl {
    /// Declaration for `value`; non-finite values use their textual form.
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Self::Text("nan".to_owned())
        } else if value.is_infinite() {
            Self::Text(if value > 0.0 { "inf" } else { "-inf" }.to_owned())
        } else {
            Self::Number(value)
        }
    }

    /// Numeric value.
    pub fn value(&self) -> VirtbandResult<f64> {
        match self {
            Self::Number(v) => Ok(*v),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "nan" => Ok(f64::NAN),
                "inf" | "+inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => other.parse::<f64>().map_err(|_| {
                    VirtbandError::configuration(format!("invalid nodata value '{s}'"))
                }),
            },
        }
    }
}

/// Lookup table: `"in:out,in:out"` text or `[[in, out], ...]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LutDecl {
    /// Breakpoint pairs.
    Pairs(Vec<[f64; 2]>),
    /// Comma separated `input:output` pairs.
    Text(String),
}

impl LutDecl {
    /// Parse into a validated table.
    pub fn to_lut(&self) -> VirtbandResult<Lut> {
        match self {
            Self::Pairs(p) => Lut::new(p.iter().map(|&[i, o]| (i, o))),
            Self::Text(s) => {
                let pairs = s
                    .split(',')
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| {
                        let (i, o) = p.split_once(':').ok_or_else(|| {
                            VirtbandError::configuration(format!("lookup entry '{p}' lacks ':'"))
                        })?;
                        let parse = |t: &str| {
                            t.trim().parse::<f64>().map_err(|_| {
                                VirtbandError::configuration(format!(
                                    "lookup entry '{p}' is not numeric"
                                ))
                            })
                        };
                        Ok((parse(i)?, parse(o)?))
                    })
                    .collect::<VirtbandResult<Vec<_>>>()?;
                Lut::new(pairs)
            }
        }
    }
}

/// Fields shared by every source declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlainDecl {
    /// Contributor dataset.
    pub contributor_reference: ContributorDecl,
    /// 1-based contributor band.
    #[serde(default = "default_band_index")]
    pub contributor_band_index: usize,
    /// Window in contributor pixels; omitted for full extent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_window: Option<WindowDecl>,
    /// Window in band pixels; omitted for full extent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_window: Option<WindowDecl>,
    /// Resampling kernel.
    #[serde(default, skip_serializing_if = "is_nearest")]
    pub resampling: Resampling,
    /// Read the contributor band's mask band instead of the band itself.
    #[serde(default, skip_serializing_if = "is_false")]
    pub contributor_mask_band: bool,
}

/// Value transform elements.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransformDecl {
    /// Pixels equal to this value carry no contribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_data_value: Option<NodataDecl>,
    /// Use the contributor's mask band.
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_mask_band: bool,
    /// Linear offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_offset: Option<f64>,
    /// Linear ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_ratio: Option<f64>,
    /// Power of exponential scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponent: Option<f64>,
    /// Source value mapped to `DestMin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_min: Option<f64>,
    /// Source value mapped to `DestMax`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_max: Option<f64>,
    /// Lower output bound of exponential scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_min: Option<f64>,
    /// Upper output bound of exponential scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_max: Option<f64>,
    /// Palette channel (1..=4) substituted for the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_table_component: Option<u8>,
    /// Piecewise linear lookup table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_table: Option<LutDecl>,
}

/// `TransformingSource` declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformingDecl {
    /// Window and contributor.
    #[serde(flatten)]
    pub plain: PlainDecl,
    /// Value transform.
    #[serde(flatten)]
    pub transform: TransformDecl,
}

/// `Kernel` element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KernelDecl {
    /// Odd side length.
    pub size: usize,
    /// One row applied on both axes.
    #[serde(default, skip_serializing_if = "is_false")]
    pub separable: bool,
    /// Divide by the sum of contributing coefficients.
    #[serde(default, skip_serializing_if = "is_false")]
    pub normalized: bool,
    /// Coefficients, row-major.
    pub coefficients: Vec<f64>,
}

/// `ConvolutionFilteredSource` declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionDecl {
    /// Window and contributor.
    #[serde(flatten)]
    pub plain: PlainDecl,
    /// Value transform applied before filtering.
    #[serde(flatten)]
    pub transform: TransformDecl,
    /// Convolution kernel.
    #[serde(rename = "Kernel")]
    pub kernel: KernelDecl,
}

fn default_band_index() -> usize {
    1
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_nearest(r: &Resampling) -> bool {
    *r == Resampling::Nearest
}

impl PlainDecl {
    fn to_simple(&self) -> VirtbandResult<SimpleSource> {
        let c = &self.contributor_reference;
        if c.name.trim().is_empty() {
            return Err(VirtbandError::configuration(
                "ContributorReference needs a non-empty Name",
            ));
        }
        if self.contributor_band_index == 0 {
            return Err(VirtbandError::configuration(
                "ContributorBandIndex is 1-based",
            ));
        }
        let named = NamedContributor {
            name: c.name.clone(),
            relative: c.relative,
            shared: c.shared,
        };
        let window = SourceWindow {
            src: self.source_window.map(WindowDecl::to_rect),
            dst: self.destination_window.map(WindowDecl::to_rect),
        };
        for r in [window.src, window.dst].into_iter().flatten() {
            if !(r.width() > 0.0 && r.height() > 0.0) {
                return Err(VirtbandError::configuration(format!(
                    "window {:?} of '{}' is degenerate",
                    rect_to_off_size(r),
                    c.name
                )));
            }
        }
        Ok(SimpleSource::new(named, self.contributor_band_index)
            .with_window(window)
            .with_resampling(self.resampling)
            .with_contributor_mask(self.contributor_mask_band))
    }

    fn from_simple(s: &SimpleSource) -> Option<Self> {
        let ContributorRef::Named(n) = s.reference() else {
            return None;
        };
        Some(Self {
            contributor_reference: ContributorDecl {
                name: n.name.clone(),
                relative: n.relative,
                shared: n.shared,
            },
            contributor_band_index: s.band_index(),
            source_window: s.window().src.map(WindowDecl::from_rect),
            destination_window: s.window().dst.map(WindowDecl::from_rect),
            resampling: s.resampling(),
            contributor_mask_band: s.reads_contributor_mask(),
        })
    }
}

impl TransformDecl {
    fn to_transform(&self) -> VirtbandResult<Transform> {
        let mut t = Transform::new();
        if let Some(nd) = &self.no_data_value {
            t.set_nodata(nd.value()?)?;
        }
        t.set_use_mask_band(self.use_mask_band)?;
        if let Some(c) = self.color_table_component {
            t.set_color_table_component(c)?;
        }
        if self.scale_ratio.is_some() || self.scale_offset.is_some() {
            t.set_linear_scaling(
                self.scale_ratio.unwrap_or(1.0),
                self.scale_offset.unwrap_or(0.0),
            )?;
        }
        if let Some(exponent) = self.exponent {
            let (Some(dst_min), Some(dst_max)) = (self.dest_min, self.dest_max) else {
                return Err(VirtbandError::configuration(
                    "Exponent requires DestMin and DestMax",
                ));
            };
            t.set_exponential_scaling(ExpScaling {
                exponent,
                src_min: self.source_min,
                src_max: self.source_max,
                dst_min,
                dst_max,
            })?;
        }
        if let Some(lut) = &self.lookup_table {
            t.set_lut(Some(lut.to_lut()?));
        }
        Ok(t)
    }

    fn from_transform(t: &Transform) -> Self {
        let mut d = Self {
            no_data_value: t.nodata().map(NodataDecl::from_f64),
            use_mask_band: t.uses_mask_band(),
            ..Self::default()
        };
        if let Some((ratio, offset)) = t.linear_scaling() {
            d.scale_ratio = Some(ratio);
            d.scale_offset = Some(offset);
        }
        if let Some(e) = t.exponential_scaling() {
            d.exponent = Some(e.exponent);
            d.source_min = e.src_min;
            d.source_max = e.src_max;
            d.dest_min = Some(e.dst_min);
            d.dest_max = Some(e.dst_max);
        }
        let component = t.color_table_component();
        d.color_table_component = (component > 0).then_some(component);
        d.lookup_table = t
            .lut()
            .map(|l| LutDecl::Pairs(l.pairs().map(|(i, o)| [i, o]).collect()));
        d
    }
}

impl KernelDecl {
    fn to_kernel(&self) -> VirtbandResult<Kernel> {
        Kernel::new(
            self.size,
            self.coefficients.clone(),
            self.separable,
            self.normalized,
        )
    }

    fn from_kernel(k: &Kernel) -> Self {
        Self {
            size: k.size(),
            separable: k.is_separable(),
            normalized: k.is_normalized(),
            coefficients: k.coefficients().to_vec(),
        }
    }
}

impl Source {
    /// Build a source from its declaration.
    pub fn from_declaration(decl: &SourceDecl) -> VirtbandResult<Self> {
        Ok(match decl {
            SourceDecl::PlainSource(p) => Self::Simple(p.to_simple()?),
            SourceDecl::TransformingSource(t) => Self::Complex(
                ComplexSource::new(t.plain.to_simple()?)
                    .with_transform(t.transform.to_transform()?),
            ),
            SourceDecl::ConvolutionFilteredSource(c) => {
                let inner = ComplexSource::new(c.plain.to_simple()?)
                    .with_transform(c.transform.to_transform()?);
                Self::Kernel(KernelFilteredSource::new(inner, c.kernel.to_kernel()?))
            }
        })
    }

    /// Declaration of this source.
    ///
    /// Returns `None` for sources with no declarative form: callbacks and sources bound to an
    /// in-process band.
    pub fn to_declaration(&self) -> Option<SourceDecl> {
        Some(match self {
            Self::Simple(s) => SourceDecl::PlainSource(PlainDecl::from_simple(s)?),
            Self::Complex(c) => SourceDecl::TransformingSource(TransformingDecl {
                plain: PlainDecl::from_simple(c.base())?,
                transform: TransformDecl::from_transform(c.transform()),
            }),
            Self::Kernel(k) => SourceDecl::ConvolutionFilteredSource(ConvolutionDecl {
                plain: PlainDecl::from_simple(k.inner().base())?,
                transform: TransformDecl::from_transform(k.inner().transform()),
                kernel: KernelDecl::from_kernel(k.kernel()),
            }),
            Self::Func(_) => return None,
        })
    }
}

#[cfg(test)]
#[path = "../tests/unit/decl.rs"]
mod tests;
