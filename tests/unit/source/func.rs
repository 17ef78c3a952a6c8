use super::*;
use crate::foundation::core::DataType;
use crate::foundation::error::VirtbandError;
use crate::raster::buffer::RasterBuffer;
use crate::scratch::ScratchOpts;

fn coords() -> FuncSource {
    FuncSource::new(|tile, out| {
        let w = tile.width();
        for (i, v) in out.iter_mut().enumerate() {
            let x = tile.window.x_off + i as u32 % w;
            let y = tile.window.y_off + i as u32 / w;
            *v = f64::from(x + 10 * y);
        }
        Ok(())
    })
}

fn read(src: &FuncSource, req: BandRequest, band: (u32, u32)) -> VirtbandResult<Vec<f64>> {
    let mut buf = RasterBuffer::filled(DataType::Int16, req.buf_width, req.buf_height, -1.0);
    let mut scratch = WorkingBuffers::new(ScratchOpts::default());
    src.read(&req, band, &mut buf.full_view_mut(), &mut scratch)?;
    Ok(buf.to_f64_vec())
}

#[test]
fn callback_sees_band_coordinates() {
    let out = read(&coords(), BandRequest::unscaled(PixelWindow::new(1, 1, 2, 2)), (4, 4)).unwrap();
    assert_eq!(out, vec![11.0, 12.0, 21.0, 22.0]);
}

#[test]
fn destination_rectangle_limits_generation() {
    let src = coords().with_dst(Rect::new(2.0, 0.0, 4.0, 1.0));
    let out = read(&src, BandRequest::unscaled(PixelWindow::full(4, 1)), (4, 1)).unwrap();
    assert_eq!(out, vec![-1.0, -1.0, 2.0, 3.0]);
}

#[test]
fn scaled_requests_pick_generated_pixels() {
    let req = BandRequest {
        window: PixelWindow::full(4, 4),
        buf_width: 2,
        buf_height: 2,
    };
    let out = read(&coords(), req, (4, 4)).unwrap();
    assert_eq!(out, vec![11.0, 13.0, 31.0, 33.0]);
}

#[test]
fn nodata_values_do_not_contribute() {
    let src = coords().with_nodata(1.0);
    let out = read(&src, BandRequest::unscaled(PixelWindow::full(3, 1)), (3, 1)).unwrap();
    assert_eq!(out, vec![0.0, -1.0, 2.0]);
}

#[test]
fn callback_errors_propagate() {
    let src = FuncSource::new(|_, _| Err(VirtbandError::io("generator offline")));
    let err = read(&src, BandRequest::unscaled(PixelWindow::full(2, 2)), (2, 2)).unwrap_err();
    assert!(matches!(err, VirtbandError::Io(_)));
}
