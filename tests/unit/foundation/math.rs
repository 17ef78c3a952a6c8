use super::*;

#[test]
fn round_edge_is_half_up() {
    assert_eq!(round_edge(0.5), 1);
    assert_eq!(round_edge(1.49), 1);
    assert_eq!(round_edge(-0.5), 0);
    assert_eq!(round_edge(2.5), 3);
}

#[test]
fn round_edge_snaps_near_integers() {
    assert_eq!(round_edge(2.999_999_999_9), 3);
    assert_eq!(round_edge(3.000_000_000_1), 3);
    assert_eq!(round_edge(0.1 + 0.2 + 0.7), 1);
}

#[test]
fn integer_pixels_round_and_saturate() {
    assert_eq!(u8::from_f64(300.0), 255);
    assert_eq!(u8::from_f64(-4.0), 0);
    assert_eq!(u8::from_f64(12.5), 13);
    assert_eq!(u8::from_f64(f64::NAN), 0);
    assert_eq!(i16::from_f64(-40000.0), i16::MIN);
    assert_eq!(u32::from_f64(7.4), 7);
}

#[test]
fn float_pixels_clamp_finite_values() {
    assert_eq!(f32::from_f64(1e300), f32::MAX);
    assert!(f32::from_f64(f64::INFINITY).is_infinite());
    assert!(f32::from_f64(f64::NAN).is_nan());
    assert_eq!(f64::from_f64(1e300), 1e300);
}
