use super::*;
use crate::raster::memory::{MemDataset, MemOpener, MemRasterBand};
use crate::foundation::core::DataType;

fn opener() -> Arc<MemOpener> {
    let o = MemOpener::new();
    o.register(
        "a.tif",
        MemDataset::single("a.tif", MemRasterBand::constant(DataType::Byte, 4, 4, 1.0)),
    );
    Arc::new(o)
}

#[test]
fn shared_handles_attach_and_close_at_zero() {
    let o = opener();
    let table = HandleTable::new();
    let reg = SourceRegistry::new(o.clone()).with_shared_table(table.clone());

    let h1 = reg.open_or_attach("a.tif", Ownership::SharedByName).unwrap();
    let h2 = reg.open_or_attach("a.tif", Ownership::SharedByName).unwrap();
    assert_eq!(o.open_count(), 1);
    assert_eq!(table.ref_count("a.tif"), 2);
    assert!(Arc::ptr_eq(h1.dataset(), h2.dataset()));

    reg.release(h1);
    assert_eq!(table.ref_count("a.tif"), 1);
    drop(h2);
    assert_eq!(table.ref_count("a.tif"), 0);
    assert!(table.is_empty());
}

#[test]
fn shared_handles_are_visible_across_registries() {
    let o = opener();
    let table = HandleTable::new();
    let r1 = SourceRegistry::new(o.clone()).with_shared_table(table.clone());
    let r2 = SourceRegistry::new(o.clone()).with_shared_table(table.clone());

    let _a = r1.open_or_attach("a.tif", Ownership::SharedByName).unwrap();
    let _b = r2.open_or_attach("a.tif", Ownership::SharedByName).unwrap();
    assert_eq!(o.open_count(), 1);
    assert_eq!(table.ref_count("a.tif"), 2);
}

#[test]
fn exclusive_handles_stay_private_to_one_registry() {
    let o = opener();
    let table = HandleTable::new();
    let r1 = SourceRegistry::new(o.clone()).with_shared_table(table.clone());
    let r2 = SourceRegistry::new(o.clone()).with_shared_table(table.clone());

    let a = r1.open_or_attach("a.tif", Ownership::Exclusive).unwrap();
    let _b = r1.open_or_attach("a.tif", Ownership::Exclusive).unwrap();
    let _c = r2.open_or_attach("a.tif", Ownership::Exclusive).unwrap();
    assert_eq!(o.open_count(), 2);
    assert_eq!(table.ref_count("a.tif"), 0);
    assert_eq!(r1.exclusive_table().ref_count("a.tif"), 2);
    assert_eq!(a.ownership(), Ownership::Exclusive);
}

#[test]
fn failed_open_leaves_no_entry() {
    let table = HandleTable::new();
    let reg = SourceRegistry::new(opener()).with_shared_table(table.clone());
    let err = reg
        .open_or_attach("missing.tif", Ownership::SharedByName)
        .unwrap_err();
    assert!(matches!(err, VirtbandError::Resource(_)));
    assert!(table.is_empty());
}

#[test]
fn ownership_flag_overrides_default() {
    assert_eq!(Ownership::from_flag(None, true), Ownership::SharedByName);
    assert_eq!(Ownership::from_flag(Some(false), true), Ownership::Exclusive);
    assert_eq!(Ownership::from_flag(Some(true), false), Ownership::SharedByName);
}

#[test]
fn canonical_names_collapse_equivalent_spellings() {
    let base = Path::new("/data/tiles");
    assert_eq!(
        canonical_name("./a/../b.tif", true, Some(base)).unwrap(),
        "/data/tiles/b.tif"
    );
    assert_eq!(
        canonical_name("sub\\c.tif", false, None).unwrap(),
        "sub/c.tif"
    );
    assert_eq!(
        canonical_name("/abs/x.tif", true, Some(base)).unwrap(),
        "/abs/x.tif"
    );
    assert!(canonical_name("  ", false, None).is_err());
    assert!(canonical_name("./", false, None).is_err());
}
