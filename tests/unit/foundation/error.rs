use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        VirtbandError::configuration("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        VirtbandError::resource("x")
            .to_string()
            .contains("resource error:")
    );
    assert!(
        VirtbandError::geometry("x")
            .to_string()
            .contains("geometry error:")
    );
    assert!(VirtbandError::io("x").to_string().contains("io error:"));
    assert!(
        VirtbandError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = VirtbandError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
