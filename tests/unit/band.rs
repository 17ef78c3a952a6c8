use super::*;
use crate::raster::memory::{MemDataset, MemOpener, MemRasterBand};
use crate::registry::HandleTable;
use crate::source::NamedContributor;

fn ramp(w: u32, h: u32) -> MemRasterBand {
    let values: Vec<u8> = (0..w * h).map(|i| i as u8).collect();
    MemRasterBand::new(RasterBuffer::from_vec(w, h, values).unwrap())
}

fn constant(w: u32, h: u32, v: f64) -> Arc<dyn RasterBand> {
    MemRasterBand::constant(DataType::Byte, w, h, v).into_shared()
}

fn placed(band: Arc<dyn RasterBand>, dst: [f64; 4]) -> SimpleSource {
    SimpleSource::bound(band).with_window(SourceWindow::full().with_dst(dst))
}

fn read_all(band: &ComposedBand) -> Vec<f64> {
    let (w, h) = band.size();
    band.read_window(PixelWindow::full(w, h)).unwrap().to_f64_vec()
}

#[test]
fn single_full_source_reads_like_its_contributor() {
    let mut band = ComposedBand::new(4, 3, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(ramp(4, 3).into_shared())).unwrap();
    assert!(band.passthrough().is_some());
    assert_eq!(read_all(&band), ramp(4, 3).buffer().to_f64_vec());
}

#[test]
fn later_sources_paint_over_earlier_ones() {
    let mut band = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(constant(4, 1, 1.0))).unwrap();
    band.add_source(placed(constant(2, 1, 2.0), [2.0, 0.0, 2.0, 1.0])).unwrap();
    assert!(band.passthrough().is_none());
    assert_eq!(read_all(&band), vec![1.0, 1.0, 2.0, 2.0]);
}

#[test]
fn nodata_pixels_let_earlier_sources_show() {
    let mut band = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(constant(4, 1, 9.0))).unwrap();
    let mut t = Transform::new();
    t.set_nodata(0.0).unwrap();
    band.add_complex_source(
        ramp(2, 1).into_shared(),
        1,
        SourceWindow::full().with_dst([2.0, 0.0, 2.0, 1.0]),
        t,
        false,
    )
    .unwrap();
    assert_eq!(read_all(&band), vec![9.0, 9.0, 9.0, 1.0]);
}

#[test]
fn unpainted_pixels_keep_buffer_content() {
    let mut band = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    band.add_source(placed(constant(1, 1, 5.0), [1.0, 0.0, 1.0, 1.0])).unwrap();
    let mut buf = RasterBuffer::filled(DataType::Byte, 4, 1, 42.0);
    band.read(PixelWindow::full(4, 1), &mut buf.full_view_mut()).unwrap();
    assert_eq!(buf.to_f64_vec(), vec![42.0, 5.0, 42.0, 42.0]);
}

#[test]
fn requests_are_clipped_to_the_band() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(constant(4, 4, 7.0))).unwrap();
    let mut buf = RasterBuffer::new(DataType::Byte, 4, 4);
    band.read(PixelWindow::new(2, 2, 4, 4), &mut buf.full_view_mut()).unwrap();
    let out = buf.to_f64_vec();
    assert_eq!(&out[0..4], &[7.0, 7.0, 0.0, 0.0]);
    assert_eq!(&out[4..8], &[7.0, 7.0, 0.0, 0.0]);
    assert!(out[8..].iter().all(|v| *v == 0.0));

    // Entirely outside: nothing to do.
    band.read(PixelWindow::new(10, 10, 2, 2), &mut buf.full_view_mut()).unwrap();
    assert!(
        band.read(PixelWindow::new(0, 0, 0, 2), &mut buf.full_view_mut())
            .is_err()
    );
}

#[test]
fn scaled_reads_pick_nearest_pixels() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(ramp(4, 4).into_shared())).unwrap();
    let mut buf = RasterBuffer::new(DataType::Byte, 2, 2);
    band.read(PixelWindow::full(4, 4), &mut buf.full_view_mut()).unwrap();
    assert_eq!(buf.to_f64_vec(), vec![5.0, 7.0, 13.0, 15.0]);
}

#[test]
fn read_failures_surface_for_the_whole_call() {
    let mut band = ComposedBand::new(2, 2, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(constant(2, 2, 1.0))).unwrap();
    band.add_source(SimpleSource::named("missing.tif", 1)).unwrap();
    let err = band.read_window(PixelWindow::full(2, 2)).unwrap_err();
    assert!(matches!(err, VirtbandError::Resource(_)));
}

#[test]
fn min_max_combines_disjoint_sources() {
    let mut band = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    band.add_source(placed(ramp(2, 1).into_shared(), [0.0, 0.0, 2.0, 1.0])).unwrap();
    band.add_source(placed(constant(2, 1, 50.0), [2.0, 0.0, 2.0, 1.0])).unwrap();
    assert_eq!(band.min_max_from_sources(), Some((0.0, 50.0)));
    assert_eq!(band.compute_min_max().unwrap(), Some((0.0, 50.0)));
    assert_eq!(band.minimum().unwrap(), Some(0.0));
    assert_eq!(band.maximum().unwrap(), Some(50.0));
}

#[test]
fn float32_nodata_is_excluded_by_source_statistics_and_scans_alike() {
    let samples = RasterBuffer::from_vec(4, 1, vec![0.1f32, 5.0, 6.0, 7.0]).unwrap();
    let contributor = MemRasterBand::new(samples).with_nodata(0.1).into_shared();
    let mut band = ComposedBand::new(4, 1, DataType::Float32)
        .unwrap()
        .with_nodata(f64::from(0.1f32));
    band.add_source(SimpleSource::bound(contributor)).unwrap();

    assert_eq!(band.min_max_from_sources(), Some((5.0, 7.0)));
    let s = band.compute_statistics().unwrap().unwrap();
    assert_eq!((s.min, s.max, s.valid_count), (5.0, 7.0, 3));
}

#[test]
fn min_max_scans_transformed_sources() {
    let mut band = ComposedBand::new(2, 2, DataType::Byte).unwrap();
    let mut t = Transform::new();
    t.set_linear_scaling(2.0, 10.0).unwrap();
    band.add_complex_source(constant(2, 2, 100.0), 1, SourceWindow::full(), t, false)
        .unwrap();
    assert_eq!(band.min_max_from_sources(), None);
    assert_eq!(band.compute_min_max().unwrap(), Some((210.0, 210.0)));
}

#[test]
fn uncovered_pixels_count_unless_band_has_nodata() {
    let partial = |nodata: Option<f64>| {
        let mut band = ComposedBand::new(4, 1, DataType::Byte).unwrap();
        if let Some(nd) = nodata {
            band = band.with_nodata(nd);
        }
        band.add_source(placed(constant(2, 1, 5.0), [0.0, 0.0, 2.0, 1.0])).unwrap();
        band.compute_min_max().unwrap()
    };
    assert_eq!(partial(None), Some((0.0, 5.0)));
    assert_eq!(partial(Some(0.0)), Some((5.0, 5.0)));
    assert_eq!(partial(Some(5.0)), None);
}

#[test]
fn histogram_merges_or_scans_to_the_same_counts() {
    let req = HistogramRequest {
        min: 0.0,
        max: 100.0,
        buckets: 2,
        include_out_of_range: false,
    };

    let mut disjoint = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    disjoint
        .add_source(placed(ramp(2, 1).into_shared(), [0.0, 0.0, 2.0, 1.0]))
        .unwrap();
    disjoint
        .add_source(placed(constant(2, 1, 50.0), [2.0, 0.0, 2.0, 1.0]))
        .unwrap();
    assert_eq!(disjoint.histogram_from_sources(&req), Some(vec![2, 2]));
    assert_eq!(disjoint.histogram(&req).unwrap(), vec![2, 2]);

    let mut stacked = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    stacked.add_source(SimpleSource::bound(constant(4, 1, 3.0))).unwrap();
    stacked
        .add_source(placed(constant(2, 1, 80.0), [2.0, 0.0, 2.0, 1.0]))
        .unwrap();
    assert_eq!(stacked.histogram_from_sources(&req), None);
    assert_eq!(stacked.histogram(&req).unwrap(), vec![2, 2]);

    let bad = HistogramRequest { buckets: 0, ..req };
    assert!(stacked.histogram(&bad).is_err());
}

#[test]
fn statistics_cover_valid_pixels() {
    let mut band = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(ramp(4, 1).into_shared())).unwrap();
    let s = band.compute_statistics().unwrap().unwrap();
    assert_eq!((s.min, s.max, s.valid_count), (0.0, 3.0, 4));
    assert!((s.mean - 1.5).abs() < 1e-12);
    assert!((s.std_dev - 1.25f64.sqrt()).abs() < 1e-12);
}

#[test]
fn coverage_classifies_windows() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    assert_eq!(
        band.coverage_status(PixelWindow::full(4, 4)).unwrap(),
        CoverageStatus::Empty
    );
    band.add_source(placed(constant(2, 4, 1.0), [0.0, 0.0, 2.0, 4.0])).unwrap();
    assert_eq!(
        band.coverage_status(PixelWindow::full(4, 4)).unwrap(),
        CoverageStatus::Partial(0.5)
    );
    assert_eq!(
        band.coverage_status(PixelWindow::new(0, 0, 2, 2)).unwrap(),
        CoverageStatus::Full
    );
    assert_eq!(
        band.coverage_status(PixelWindow::new(2, 0, 2, 2)).unwrap(),
        CoverageStatus::Empty
    );
    assert!(band.coverage_status(PixelWindow::new(3, 3, 2, 2)).is_err());
}

#[test]
fn overlapping_footprints_are_counted_once() {
    let rects = [
        Rect::new(0.0, 0.0, 3.0, 2.0),
        Rect::new(1.0, 0.0, 4.0, 2.0),
        Rect::new(0.0, 2.0, 4.0, 4.0),
    ];
    assert_eq!(coverage(&rects, Rect::new(0.0, 0.0, 4.0, 4.0)), CoverageStatus::Full);
    assert_eq!(
        coverage(&rects[..2], Rect::new(0.0, 0.0, 4.0, 4.0)),
        CoverageStatus::Partial(0.5)
    );
}

#[test]
fn covered_sources_are_pruned() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(constant(4, 4, 1.0))).unwrap();
    band.add_source(SimpleSource::bound(constant(4, 4, 2.0))).unwrap();
    let before = read_all(&band);
    assert_eq!(band.remove_covered_sources(), 1);
    assert_eq!(band.sources().len(), 1);
    assert_eq!(read_all(&band), before);
    assert!(read_all(&band).iter().all(|v| *v == 2.0));
}

#[test]
fn masking_sources_do_not_prune() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    band.add_source(SimpleSource::bound(constant(4, 4, 1.0))).unwrap();
    let mut t = Transform::new();
    t.set_nodata(0.0).unwrap();
    band.add_complex_source(constant(4, 4, 2.0), 1, SourceWindow::full(), t, false)
        .unwrap();
    // A smaller later source never covers an earlier full one.
    band.add_source(placed(constant(2, 2, 3.0), [0.0, 0.0, 2.0, 2.0])).unwrap();
    assert_eq!(band.remove_covered_sources(), 0);
    assert_eq!(band.sources().len(), 3);
}

#[test]
fn mask_band_sources_paint_contributor_validity() {
    let data = MemRasterBand::constant(DataType::Byte, 2, 2, 7.0)
        .with_mask(constant(2, 2, 255.0))
        .into_shared();
    let mut band = ComposedBand::new(4, 2, DataType::Byte).unwrap();
    band.add_simple_source(
        data.clone(),
        1,
        SourceWindow::full().with_dst([0.0, 0.0, 2.0, 2.0]),
        true,
    )
    .unwrap();
    band.add_mask_band_source(
        data,
        1,
        SourceWindow::full().with_dst([2.0, 0.0, 2.0, 2.0]),
        true,
    )
    .unwrap();
    let out = band.read_window(PixelWindow::full(4, 2)).unwrap();
    assert_eq!(out.to_f64_vec(), vec![7.0, 7.0, 255.0, 255.0, 7.0, 7.0, 255.0, 255.0]);

    let err = band
        .add_mask_band_source(constant(2, 2, 1.0), 1, SourceWindow::full(), true)
        .unwrap_err();
    assert!(matches!(err, VirtbandError::Resource(_)), "{err}");
}

#[test]
fn validated_sources_are_clipped_or_rejected() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    let err = band
        .add_simple_source(
            constant(4, 4, 1.0),
            1,
            SourceWindow::full().with_dst([10.0, 10.0, 2.0, 2.0]),
            true,
        )
        .unwrap_err();
    assert!(matches!(err, VirtbandError::Geometry(_)));

    let idx = band
        .add_simple_source(
            constant(4, 4, 1.0),
            1,
            SourceWindow::full().with_dst([2.0, 2.0, 4.0, 4.0]),
            true,
        )
        .unwrap();
    let w = band.sources()[idx].simple().unwrap().window();
    assert_eq!(w.dst, Some(Rect::new(2.0, 2.0, 4.0, 4.0)));
    assert_eq!(w.src, Some(Rect::new(0.0, 0.0, 2.0, 2.0)));
}

#[test]
fn kernel_sources_reject_unsupported_band_types() {
    let mut band = ComposedBand::new(2, 2, DataType::UInt64).unwrap();
    let err = band
        .add_kernel_source(
            constant(2, 2, 1.0),
            1,
            SourceWindow::full(),
            Transform::new(),
            Kernel::average(3).unwrap(),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, VirtbandError::Configuration(_)));
    assert!(band.sources().is_empty());
}

#[test]
fn location_info_lists_covering_files() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    let a = MemRasterBand::constant(DataType::Byte, 4, 4, 1.0).with_file("a.tif");
    let b = MemRasterBand::constant(DataType::Byte, 2, 4, 2.0).with_file("b.tif");
    band.add_source(SimpleSource::bound(a.into_shared())).unwrap();
    band.add_source(placed(b.into_shared(), [2.0, 0.0, 2.0, 4.0])).unwrap();

    let files = |info: String| {
        let v: serde_json::Value = serde_json::from_str(&info).unwrap();
        v["Files"].clone()
    };
    assert_eq!(
        files(band.location_info(3, 0).unwrap()),
        serde_json::json!(["a.tif", "b.tif"])
    );
    assert_eq!(files(band.location_info(0, 0).unwrap()), serde_json::json!(["a.tif"]));

    // A later source repeating an earlier file is listed once.
    let again = MemRasterBand::constant(DataType::Byte, 1, 4, 3.0).with_file("a.tif");
    band.add_source(placed(again.into_shared(), [3.0, 0.0, 1.0, 4.0])).unwrap();
    assert_eq!(
        files(band.location_info(3, 0).unwrap()),
        serde_json::json!(["a.tif", "b.tif"])
    );
    assert_eq!(band.location_info(0, 0).unwrap(), band.location_info(0, 0).unwrap());
    assert!(band.location_info(4, 0).is_err());
}

#[test]
fn file_list_is_sorted_and_deduplicated() {
    let mut band = ComposedBand::new(2, 2, DataType::Byte).unwrap();
    for name in ["b.tif", "a.tif", "b.tif"] {
        band.add_source(SimpleSource::new(NamedContributor::new(name), 1)).unwrap();
    }
    band.add_func_source(FuncSource::new(|_, _| Ok(()))).unwrap();
    assert_eq!(band.file_list(), vec!["a.tif".to_owned(), "b.tif".to_owned()]);
}

#[test]
fn blocks_follow_the_configured_grid() {
    let mut band = ComposedBand::new(4, 4, DataType::Byte)
        .unwrap()
        .with_opts(ComposeOpts::default().with_block_size(3, 3));
    band.add_source(SimpleSource::bound(ramp(4, 4).into_shared())).unwrap();
    assert_eq!(band.block_count(), (2, 2));

    let mut buf = RasterBuffer::new(DataType::Byte, 3, 3);
    let w = band.read_block(1, 1, &mut buf.full_view_mut()).unwrap();
    assert_eq!(w, PixelWindow::new(3, 3, 1, 1));
    assert_eq!(buf.get(0, 0), 15.0);

    let w = band.read_block(0, 0, &mut buf.full_view_mut()).unwrap();
    assert_eq!(w, PixelWindow::new(0, 0, 3, 3));
    assert_eq!(buf.get(2, 2), 10.0);

    assert!(band.read_block(2, 0, &mut buf.full_view_mut()).is_err());
}

#[test]
fn composed_bands_nest() {
    let mut inner = ComposedBand::new(4, 4, DataType::Byte).unwrap();
    inner.add_source(SimpleSource::bound(constant(4, 4, 3.0))).unwrap();
    let inner: Arc<dyn RasterBand> = Arc::new(inner);

    let mut outer = ComposedBand::new(8, 4, DataType::Byte).unwrap();
    outer.add_source(placed(inner, [4.0, 0.0, 4.0, 4.0])).unwrap();
    let out = read_all(&outer);
    assert_eq!(&out[0..8], &[0.0, 0.0, 0.0, 0.0, 3.0, 3.0, 3.0, 3.0]);
}

#[test]
fn nested_bands_resample_fractional_windows_like_stored_rasters() {
    let stored =
        || MemRasterBand::new(RasterBuffer::from_vec(4, 1, vec![10u8, 20, 30, 40]).unwrap());
    let mut inner = ComposedBand::new(4, 1, DataType::Byte).unwrap();
    inner.add_source(SimpleSource::bound(stored().into_shared())).unwrap();
    let inner: Arc<dyn RasterBand> = Arc::new(inner);

    let window = SourceWindow::new([0.5, 0.0, 2.0, 1.0], [0.0, 0.0, 4.0, 1.0]);
    let over = |contributor: Arc<dyn RasterBand>, resampling: Resampling| {
        let mut band = ComposedBand::new(4, 1, DataType::Byte).unwrap();
        let source = SimpleSource::bound(contributor)
            .with_window(window)
            .with_resampling(resampling);
        band.add_source(source).unwrap();
        read_all(&band)
    };

    let direct = over(stored().into_shared(), Resampling::Nearest);
    assert_eq!(direct, vec![10.0, 20.0, 20.0, 30.0]);
    assert_eq!(over(inner.clone(), Resampling::Nearest), direct);
    assert_eq!(
        over(inner, Resampling::Bilinear),
        over(stored().into_shared(), Resampling::Bilinear)
    );
}

fn dem_registry() -> SourceRegistry {
    let opener = Arc::new(MemOpener::new());
    opener.register(
        "dem.tif",
        MemDataset::single("dem.tif", MemRasterBand::constant(DataType::Int16, 4, 4, 10.0)),
    );
    SourceRegistry::new(opener).with_shared_table(HandleTable::new())
}

const DECL: &str = r#"{
    "Width": 4,
    "Height": 4,
    "DataType": "int16",
    "NoDataValue": -1,
    "BlockSize": [2, 2],
    "Sources": [
        {
            "Type": "TransformingSource",
            "ContributorReference": {"Name": "dem.tif"},
            "ScaleRatio": 2,
            "ScaleOffset": 1
        },
        {"Type": "PlainSource"}
    ]
}"#;

#[test]
fn declarations_skip_malformed_sources() {
    let band = ComposedBand::from_json(DECL, dem_registry(), ComposeOpts::default()).unwrap();
    assert_eq!(band.sources().len(), 1);
    assert_eq!(band.parse_failures().len(), 1);
    assert!(band.parse_failures()[0].starts_with("source 1:"));
    assert_eq!(band.block_size(), (2, 2));
    assert_eq!(band.nodata(), Some(-1.0));
    assert!(read_all(&band).iter().all(|v| *v == 21.0));
}

#[test]
fn declarations_round_trip_through_json() {
    let band = ComposedBand::from_json(DECL, dem_registry(), ComposeOpts::default()).unwrap();
    let json = band.to_json().unwrap();
    let again = ComposedBand::from_json(&json, dem_registry(), ComposeOpts::default()).unwrap();
    assert!(again.parse_failures().is_empty());
    assert_eq!(read_all(&again), read_all(&band));
    assert_eq!(again.to_declaration().unwrap(), band.to_declaration().unwrap());
}

#[test]
fn empty_bands_are_rejected() {
    assert!(matches!(
        ComposedBand::new(0, 4, DataType::Byte),
        Err(VirtbandError::Configuration(_))
    ));
}
