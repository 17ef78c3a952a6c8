use super::*;

#[test]
fn adjust_nodata_respects_integer_types() {
    assert_eq!(DataType::Byte.adjust_nodata(0.0), Some(0.0));
    assert_eq!(DataType::Byte.adjust_nodata(255.0), Some(255.0));
    assert_eq!(DataType::Byte.adjust_nodata(256.0), None);
    assert_eq!(DataType::Byte.adjust_nodata(1.5), None);
    assert_eq!(DataType::Int16.adjust_nodata(-32768.0), Some(-32768.0));
    assert_eq!(DataType::UInt16.adjust_nodata(f64::NAN), None);
}

#[test]
fn adjust_nodata_rounds_to_f32_for_float32() {
    let v = 0.1f64;
    let adjusted = DataType::Float32.adjust_nodata(v).unwrap();
    assert_eq!(adjusted, f64::from(0.1f32));
    assert!(DataType::Float32.adjust_nodata(f64::NAN).unwrap().is_nan());
    assert_eq!(DataType::Float64.adjust_nodata(v), Some(v));
}

#[test]
fn data_type_serializes_lowercase() {
    let s = serde_json::to_string(&DataType::UInt16).unwrap();
    assert_eq!(s, "\"uint16\"");
    let de: DataType = serde_json::from_str("\"float32\"").unwrap();
    assert_eq!(de, DataType::Float32);
}

#[test]
fn pixel_window_bounds_check() {
    assert!(PixelWindow::new(0, 0, 10, 10).check_within(10, 10).is_ok());
    assert!(PixelWindow::new(1, 0, 10, 10).check_within(10, 10).is_err());
    assert!(PixelWindow::new(0, 0, 0, 10).check_within(10, 10).is_err());
    let r = PixelWindow::new(2, 3, 4, 5).to_rect();
    assert_eq!((r.x0, r.y0, r.x1, r.y1), (2.0, 3.0, 6.0, 8.0));
}
