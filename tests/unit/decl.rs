use super::*;
use serde_json::json;

fn parse(v: serde_json::Value) -> VirtbandResult<Source> {
    Source::from_declaration(&SourceDecl::from_value(v)?)
}

#[test]
fn windows_accept_arrays_and_objects() {
    let a: WindowDecl = serde_json::from_value(json!([1, 2, 3.5, 4])).unwrap();
    let b: WindowDecl =
        serde_json::from_value(json!({"XOff": 1, "YOff": 2, "XSize": 3.5, "YSize": 4})).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_rect(), Rect::new(1.0, 2.0, 4.5, 6.0));
}

#[test]
fn nodata_accepts_non_finite_spellings() {
    let nd: NodataDecl = serde_json::from_value(json!("nan")).unwrap();
    assert!(nd.value().unwrap().is_nan());
    let nd: NodataDecl = serde_json::from_value(json!("-inf")).unwrap();
    assert_eq!(nd.value().unwrap(), f64::NEG_INFINITY);
    let nd: NodataDecl = serde_json::from_value(json!(-9999)).unwrap();
    assert_eq!(nd.value().unwrap(), -9999.0);
    assert!(NodataDecl::Text("lots".into()).value().is_err());
    assert_eq!(
        serde_json::to_value(NodataDecl::from_f64(f64::INFINITY)).unwrap(),
        json!("inf")
    );
}

#[test]
fn lookup_tables_parse_from_text_and_pairs() {
    let text = LutDecl::Text("0:0, 100:200".into()).to_lut().unwrap();
    let pairs = LutDecl::Pairs(vec![[0.0, 0.0], [100.0, 200.0]]).to_lut().unwrap();
    assert_eq!(text, pairs);
    assert_eq!(text.eval(50.0), 100.0);
    assert!(LutDecl::Text("0:0,5".into()).to_lut().is_err());
    assert!(LutDecl::Text("0:0,x:1".into()).to_lut().is_err());
    assert!(LutDecl::Text("10:0,5:1".into()).to_lut().is_err());
}

#[test]
fn plain_source_defaults() {
    let src = parse(json!({
        "Type": "PlainSource",
        "ContributorReference": {"Name": "a.png"}
    }))
    .unwrap();
    let s = src.simple().unwrap();
    assert_eq!(s.band_index(), 1);
    assert_eq!(s.window(), &SourceWindow::full());
    assert_eq!(s.resampling(), Resampling::Nearest);
    assert!(!s.reads_contributor_mask());
}

#[test]
fn contributor_mask_flag_survives_a_round_trip() {
    let src = parse(json!({
        "Type": "PlainSource",
        "ContributorReference": {"Name": "a.png"},
        "ContributorMaskBand": true
    }))
    .unwrap();
    assert!(src.simple().unwrap().reads_contributor_mask());
    let value = serde_json::to_value(src.to_declaration().unwrap()).unwrap();
    assert_eq!(value["ContributorMaskBand"], json!(true));
    let plain = parse(json!({"Type": "PlainSource", "ContributorReference": {"Name": "a.png"}}))
        .unwrap();
    let value = serde_json::to_value(plain.to_declaration().unwrap()).unwrap();
    assert!(value.get("ContributorMaskBand").is_none());
}

#[test]
fn transforming_source_reads_all_elements() {
    let src = parse(json!({
        "Type": "TransformingSource",
        "ContributorReference": {"Name": "dem.tif", "Relative": true, "Shared": false},
        "ContributorBandIndex": 2,
        "SourceWindow": [0, 0, 100, 100],
        "DestinationWindow": {"XOff": 10, "YOff": 10, "XSize": 50, "YSize": 50},
        "Resampling": "bilinear",
        "NoDataValue": 0,
        "ScaleRatio": 2,
        "ScaleOffset": 10,
        "LookupTable": "0:0,255:1"
    }))
    .unwrap();
    let Source::Complex(c) = &src else {
        panic!("expected a transforming source, got {}", src.kind());
    };
    let t = c.transform();
    assert_eq!(t.nodata(), Some(0.0));
    assert_eq!(t.linear_scaling(), Some((2.0, 10.0)));
    assert!(t.lut().is_some());
    let base = c.base();
    assert_eq!(base.band_index(), 2);
    assert_eq!(base.resampling(), Resampling::Bilinear);
    let ContributorRef::Named(n) = base.reference() else {
        panic!("expected a named contributor");
    };
    assert!(n.relative);
    assert_eq!(n.shared, Some(false));
}

#[test]
fn malformed_sources_are_configuration_errors() {
    let missing_ref = parse(json!({"Type": "PlainSource"})).unwrap_err();
    assert!(matches!(missing_ref, VirtbandError::Configuration(_)));

    let unknown = parse(json!({"Type": "Warp", "ContributorReference": {"Name": "a"}}));
    assert!(matches!(unknown, Err(VirtbandError::Configuration(_))));

    let exp_without_range = parse(json!({
        "Type": "TransformingSource",
        "ContributorReference": {"Name": "a"},
        "Exponent": 0.5
    }));
    assert!(matches!(exp_without_range, Err(VirtbandError::Configuration(_))));

    let conflicting = parse(json!({
        "Type": "TransformingSource",
        "ContributorReference": {"Name": "a"},
        "NoDataValue": 0,
        "UseMaskBand": true
    }));
    assert!(matches!(conflicting, Err(VirtbandError::Configuration(_))));

    let degenerate = parse(json!({
        "Type": "PlainSource",
        "ContributorReference": {"Name": "a"},
        "SourceWindow": [0, 0, 0, 10]
    }));
    assert!(matches!(degenerate, Err(VirtbandError::Configuration(_))));

    let zero_band = parse(json!({
        "Type": "PlainSource",
        "ContributorReference": {"Name": "a"},
        "ContributorBandIndex": 0
    }));
    assert!(matches!(zero_band, Err(VirtbandError::Configuration(_))));
}

#[test]
fn convolution_source_declares_its_kernel() {
    let src = parse(json!({
        "Type": "ConvolutionFilteredSource",
        "ContributorReference": {"Name": "a"},
        "Kernel": {"Size": 3, "Separable": true, "Normalized": true, "Coefficients": [1, 2, 1]}
    }))
    .unwrap();
    let Source::Kernel(k) = &src else {
        panic!("expected a convolution source");
    };
    assert_eq!(k.kernel().size(), 3);
    assert!(k.kernel().is_separable());

    let even = parse(json!({
        "Type": "ConvolutionFilteredSource",
        "ContributorReference": {"Name": "a"},
        "Kernel": {"Size": 2, "Coefficients": [1, 1, 1, 1]}
    }));
    assert!(matches!(even, Err(VirtbandError::Configuration(_))));
}

#[test]
fn declarations_survive_a_round_trip() {
    let decl = json!({
        "Type": "TransformingSource",
        "ContributorReference": {"Name": "b.png", "Shared": true},
        "ContributorBandIndex": 3,
        "DestinationWindow": [5, 5, 10, 10],
        "NoDataValue": "nan",
        "Exponent": 0.5,
        "SourceMin": 0,
        "SourceMax": 100,
        "DestMin": 0,
        "DestMax": 255,
        "LookupTable": [[0, 1], [10, 2]]
    });
    let first = SourceDecl::from_value(decl).unwrap();
    let src = Source::from_declaration(&first).unwrap();
    let second = src.to_declaration().unwrap();
    let again = Source::from_declaration(&second).unwrap().to_declaration().unwrap();
    assert_eq!(second, again);
    let SourceDecl::TransformingSource(t) = &second else {
        panic!("kind changed in round trip");
    };
    assert_eq!(t.plain.contributor_band_index, 3);
    assert_eq!(t.transform.no_data_value, Some(NodataDecl::Text("nan".into())));
    assert_eq!(t.transform.exponent, Some(0.5));
}

#[test]
fn bound_and_callback_sources_have_no_declaration() {
    let band = crate::raster::memory::MemRasterBand::constant(DataType::Byte, 1, 1, 0.0);
    assert!(Source::from(SimpleSource::bound(band.into_shared())).to_declaration().is_none());
    let f = crate::source::FuncSource::new(|_, _| Ok(()));
    assert!(Source::from(f).to_declaration().is_none());
}

#[test]
fn band_declaration_keeps_raw_sources() {
    let band = BandDecl::from_json(
        r#"{"Width": 4, "Height": 2, "DataType": "uint16", "NoDataValue": 0,
            "Sources": [{"Type": "PlainSource"}, 7]}"#,
    )
    .unwrap();
    assert_eq!(band.data_type, DataType::UInt16);
    assert_eq!(band.sources.len(), 2);
    assert!(BandDecl::from_json("{\"Width\": 1}").is_err());
}
