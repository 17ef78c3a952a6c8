use super::*;

#[test]
fn set_and_get_round_trip_with_saturation() {
    let mut buf = RasterBuffer::new(DataType::Byte, 3, 2);
    buf.set(1, 1, 42.4);
    buf.set(2, 1, 999.0);
    assert_eq!(buf.get(1, 1), 42.0);
    assert_eq!(buf.get(2, 1), 255.0);
    assert_eq!(buf.as_slice::<u8>().unwrap(), &[0, 0, 0, 0, 42, 255]);
}

#[test]
fn sub_view_writes_land_at_offsets() {
    let mut buf = RasterBuffer::new(DataType::UInt16, 4, 3);
    {
        let mut view = buf.view_mut(PixelWindow::new(1, 1, 2, 2)).unwrap();
        view.write_from(&[1.0f64, 2.0, 3.0, 4.0], None).unwrap();
    }
    assert_eq!(
        buf.as_slice::<u16>().unwrap(),
        &[0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0]
    );
}

#[test]
fn masked_write_keeps_previous_content() {
    let mut buf = RasterBuffer::filled(DataType::Int16, 2, 2, 7.0);
    buf.full_view_mut()
        .write_from(&[1.0f32, 2.0, 3.0, 4.0], Some(&[1, 0, 0, 1]))
        .unwrap();
    assert_eq!(buf.as_slice::<i16>().unwrap(), &[1, 7, 7, 4]);
}

#[test]
fn spaced_buffer_interleaves_samples() {
    let mut buf = RasterBuffer::with_spacing(DataType::Byte, 2, 2, 2, 4).unwrap();
    buf.full_view_mut()
        .write_from(&[1u8, 2, 3, 4], None)
        .unwrap();
    assert_eq!(buf.as_slice::<u8>().unwrap(), &[1, 0, 2, 0, 3, 0, 4]);
    assert_eq!(buf.to_f64_vec(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn view_rejects_out_of_bounds_windows() {
    let mut buf = RasterBuffer::new(DataType::Float32, 2, 2);
    assert!(buf.view_mut(PixelWindow::new(1, 1, 2, 1)).is_err());
    let mut view = buf.full_view_mut();
    assert!(view.write_from(&[1.0f64], None).is_err());
}

#[test]
fn from_vec_checks_length() {
    assert!(RasterBuffer::from_vec(2, 2, vec![1.0f64; 3]).is_err());
    let buf = RasterBuffer::from_vec(2, 1, vec![1.5f32, 2.5]).unwrap();
    assert_eq!(buf.data_type(), DataType::Float32);
}
