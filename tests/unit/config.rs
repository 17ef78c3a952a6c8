use super::*;

#[test]
fn defaults_share_by_name() {
    let opts = ComposeOpts::default();
    assert!(opts.shared_by_default);
    assert_eq!(opts.block_size, (128, 128));
    assert!(opts.scan_rows > 0);
}

#[test]
fn builders_clamp_to_one() {
    let opts = ComposeOpts::default()
        .with_scan_rows(0)
        .with_block_size(0, 16)
        .with_shared_by_default(false);
    assert_eq!(opts.scan_rows, 1);
    assert_eq!(opts.block_size, (1, 16));
    assert!(!opts.shared_by_default);
}

#[test]
fn flags_parse_loosely() {
    assert_eq!(parse_flag(" TRUE "), Some(true));
    assert_eq!(parse_flag("0"), Some(false));
    assert_eq!(parse_flag("maybe"), None);
}
