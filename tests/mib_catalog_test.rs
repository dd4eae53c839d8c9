//! MIB catalog file loading.

use conflux::infrastructure::snmp::mib::MibCatalog;

#[test]
fn extra_mib_entries_load_from_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mibs.json");
    std::fs::write(&path, r#"{ "1.3.6.1.4.1.999": "acmeTraps" }"#).expect("write mib file");

    let mut catalog = MibCatalog::with_defaults();
    let loaded = catalog.load_file(&path).expect("load mib file");
    assert_eq!(loaded, 1);
    assert_eq!(catalog.resolve(&[1, 3, 6, 1, 4, 1, 999, 1]), "acmeTraps.1");
    // untouched built-ins still resolve
    assert_eq!(catalog.resolve(&[1, 3, 6, 1, 2, 1, 1, 3, 0]), "sysUpTime.0");
}

#[test]
fn malformed_mib_files_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");

    let not_json = dir.path().join("broken.json");
    std::fs::write(&not_json, "{ not json").expect("write file");
    assert!(MibCatalog::with_defaults().load_file(&not_json).is_err());

    let bad_oid = dir.path().join("bad_oid.json");
    std::fs::write(&bad_oid, r#"{ "1.3.six": "nope" }"#).expect("write file");
    assert!(MibCatalog::with_defaults().load_file(&bad_oid).is_err());
}
