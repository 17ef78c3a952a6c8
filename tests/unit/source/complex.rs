use super::*;
use crate::raster::memory::MemRasterBand;
use crate::scratch::ScratchOpts;
use crate::source::pipeline::Lut;

fn constant(v: f64) -> Arc<dyn RasterBand> {
    MemRasterBand::constant(DataType::Byte, 3, 2, v).into_shared()
}

fn read_all(src: &ComplexSource, dst_type: DataType, fill: f64) -> Vec<f64> {
    let mut buf = RasterBuffer::filled(dst_type, 3, 2, fill);
    let mut scratch = WorkingBuffers::new(ScratchOpts::default());
    let req = BandRequest::unscaled(PixelWindow::full(3, 2));
    src.read(&req, (3, 2), &mut buf.full_view_mut(), &mut scratch)
        .unwrap();
    buf.to_f64_vec()
}

#[test]
fn linear_scaling_clamps_to_destination_range() {
    let mut src = ComplexSource::new(SimpleSource::bound(constant(100.0)));
    src.transform_mut().set_linear_scaling(2.0, 10.0).unwrap();
    assert_eq!(read_all(&src, DataType::Float32, 0.0), vec![210.0; 6]);
    assert_eq!(read_all(&src, DataType::Byte, 0.0), vec![255.0; 6]);

    let mut neg = ComplexSource::new(SimpleSource::bound(constant(10.0)));
    neg.transform_mut().set_linear_scaling(-3.0, 0.0).unwrap();
    assert_eq!(read_all(&neg, DataType::Byte, 7.0), vec![0.0; 6]);
}

#[test]
fn nodata_pixels_leave_buffer_untouched() {
    let values = RasterBuffer::from_vec(3, 2, vec![1u8, 0, 1, 0, 1, 0]).unwrap();
    let mut src = ComplexSource::new(SimpleSource::bound(MemRasterBand::new(values).into_shared()));
    src.transform_mut().set_nodata(0.0).unwrap();
    src.transform_mut().set_linear_scaling(1.0, 5.0).unwrap();
    assert_eq!(
        read_all(&src, DataType::Byte, 42.0),
        vec![6.0, 42.0, 6.0, 42.0, 6.0, 42.0]
    );
    assert!(!src.is_opaque());
}

#[test]
fn mask_band_zero_means_no_contribution() {
    let flags = vec![255u8, 0, 255, 255, 0, 255];
    let mask = MemRasterBand::new(RasterBuffer::from_vec(3, 2, flags).unwrap());
    let band = MemRasterBand::constant(DataType::Byte, 3, 2, 9.0)
        .with_mask(mask.into_shared())
        .into_shared();
    let mut src = ComplexSource::new(SimpleSource::bound(band));
    src.transform_mut().set_use_mask_band(true).unwrap();
    assert_eq!(
        read_all(&src, DataType::Byte, 1.0),
        vec![9.0, 1.0, 9.0, 9.0, 1.0, 9.0]
    );
}

#[test]
fn identity_transform_is_value_preserving() {
    let src = ComplexSource::new(SimpleSource::bound(constant(7.0)));
    assert!(src.is_value_preserving());
    assert!(src.is_opaque());
    assert_eq!(src.minimum((3, 2)), Some(7.0));
    assert_eq!(read_all(&src, DataType::Byte, 0.0), vec![7.0; 6]);

    let mut scaled = ComplexSource::new(SimpleSource::bound(constant(7.0)));
    scaled.transform_mut().set_linear_scaling(2.0, 0.0).unwrap();
    assert_eq!(scaled.minimum((3, 2)), None);
}

#[test]
fn wide_working_type_keeps_precision() {
    // 16777217 is not representable as f32.
    let band = MemRasterBand::constant(DataType::Int32, 3, 2, 16_777_217.0).into_shared();
    let mut src = ComplexSource::new(SimpleSource::bound(band));
    src.transform_mut().set_linear_scaling(1.0, 0.0).unwrap();
    assert_eq!(read_all(&src, DataType::Int32, 0.0), vec![16_777_217.0; 6]);
}

#[test]
fn lut_applies_after_scaling() {
    let mut src = ComplexSource::new(SimpleSource::bound(constant(25.0)));
    src.transform_mut().set_linear_scaling(2.0, 0.0).unwrap();
    src.transform_mut()
        .set_lut(Some(Lut::new([(0.0, 0.0), (100.0, 200.0)]).unwrap()));
    assert_eq!(read_all(&src, DataType::Byte, 0.0), vec![100.0; 6]);
}

#[test]
fn scratch_vectors_are_recycled_across_reads() {
    let mut src = ComplexSource::new(SimpleSource::bound(constant(1.0)));
    src.transform_mut().set_nodata(0.0).unwrap();
    let mut buf = RasterBuffer::new(DataType::Byte, 3, 2);
    let mut scratch = WorkingBuffers::new(ScratchOpts::default());
    let req = BandRequest::unscaled(PixelWindow::full(3, 2));
    for _ in 0..3 {
        src.read(&req, (3, 2), &mut buf.full_view_mut(), &mut scratch)
            .unwrap();
    }
    let st = scratch.stats();
    assert_eq!(st.alloc_buffers, 2);
    assert_eq!(st.reused_buffers, 4);
}
