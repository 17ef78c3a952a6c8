use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use virtband::{
    ComposeOpts, ComposedBand, DataType, HistogramRequest, ImageFileOpener, PixelWindow,
    RasterBuffer, SourceRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "virtband", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose a window of a band and write it as a grayscale PNG.
    Render(RenderArgs),
    /// Print band statistics as JSON.
    Stats(StatsArgs),
    /// List the files a band references.
    Files(FilesArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input band declaration JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Window to render as `x,y,width,height` (defaults to the whole band).
    #[arg(long, value_parser = parse_window)]
    window: Option<PixelWindow>,
}

#[derive(Parser, Debug)]
struct StatsArgs {
    /// Input band declaration JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Also compute a histogram with this many buckets over `[min, max]`.
    #[arg(long)]
    buckets: Option<usize>,
}

#[derive(Parser, Debug)]
struct FilesArgs {
    /// Input band declaration JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Stats(args) => cmd_stats(args),
        Command::Files(args) => cmd_files(args),
    }
}

fn parse_window(s: &str) -> Result<PixelWindow, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid window '{s}': {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0 && *h > 0 => Ok(PixelWindow::new(*x, *y, *w, *h)),
        _ => Err(format!("window '{s}' must be x,y,width,height with a non-empty size")),
    }
}

fn load_band(path: &Path) -> anyhow::Result<ComposedBand> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read band declaration '{}'", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let registry =
        SourceRegistry::new(Arc::new(ImageFileOpener::new())).with_base_dir(base_dir);
    let band = ComposedBand::from_json(&text, registry, ComposeOpts::from_env())
        .with_context(|| format!("parse band declaration '{}'", path.display()))?;
    for failure in band.parse_failures() {
        eprintln!("skipped {failure}");
    }
    Ok(band)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let band = load_band(&args.in_path)?;
    let (w, h) = band.size();
    let window = args.window.unwrap_or(PixelWindow::full(w, h));
    let buf = band.read_window(window)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    let (width, height) = (buf.width(), buf.height());
    let save = match buf.data_type() {
        DataType::Byte => {
            let pixels = buf.into_vec::<u8>().unwrap_or_default();
            image::GrayImage::from_raw(width, height, pixels)
                .context("assemble 8-bit image")?
                .save_with_format(&args.out, image::ImageFormat::Png)
        }
        DataType::UInt16 => {
            let pixels = buf.into_vec::<u16>().unwrap_or_default();
            image::ImageBuffer::<image::Luma<u16>, _>::from_raw(width, height, pixels)
                .context("assemble 16-bit image")?
                .save_with_format(&args.out, image::ImageFormat::Png)
        }
        _ => stretch_to_u8(&buf, band.nodata())
            .context("assemble stretched image")?
            .save_with_format(&args.out, image::ImageFormat::Png),
    };
    save.with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

/// Linear stretch of valid samples to `0..=255`; nodata and NaN map to 0.
fn stretch_to_u8(buf: &RasterBuffer, nodata: Option<f64>) -> Option<image::GrayImage> {
    let values = buf.to_f64_vec();
    let valid = |v: f64| !v.is_nan() && nodata != Some(v);
    let (lo, hi) = values
        .iter()
        .copied()
        .filter(|v| valid(*v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = if hi > lo { hi - lo } else { 1.0 };
    let pixels = values
        .iter()
        .map(|&v| {
            if valid(v) {
                ((v - lo) / span * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();
    image::GrayImage::from_raw(buf.width(), buf.height(), pixels)
}

fn cmd_stats(args: StatsArgs) -> anyhow::Result<()> {
    let band = load_band(&args.in_path)?;
    let (w, h) = band.size();
    let stats = band.compute_statistics()?;
    let mut doc = serde_json::json!({
        "Width": w,
        "Height": h,
        "DataType": band.data_type().name(),
        "Coverage": format!("{:?}", band.coverage_status(PixelWindow::full(w, h))?),
    });
    if let Some(s) = stats {
        doc["Minimum"] = s.min.into();
        doc["Maximum"] = s.max.into();
        doc["Mean"] = s.mean.into();
        doc["StdDev"] = s.std_dev.into();
        doc["ValidCount"] = s.valid_count.into();
        if let Some(buckets) = args.buckets {
            let request = HistogramRequest {
                min: s.min,
                max: if s.max > s.min { s.max } else { s.min + 1.0 },
                buckets,
                include_out_of_range: true,
            };
            doc["Histogram"] = band.histogram(&request)?.into();
        }
    }
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn cmd_files(args: FilesArgs) -> anyhow::Result<()> {
    let band = load_band(&args.in_path)?;
    for file in band.file_list() {
        println!("{file}");
    }
    Ok(())
}
