use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use device_config_core::{ConfigErrorKind, DeviceId, ParamKey};
use device_config_db::{
    DatabaseConfig, DeviceDatabase, FailurePolicy, FulltextIndexEntry, INDEX_BANNER, INDEX_FILE,
    ImportResolver, IndexBuilder, IndexEntry, IndexState, LocalFileSystem, TemplateCache,
    load_device_config,
};
use serde_json::{Value, json};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_json(dir: &Path, relative: &str, value: &Value) -> PathBuf {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn device_doc(label: &str, products: &[(&str, &str)], firmware: Value) -> Value {
    let devices: Vec<Value> = products
        .iter()
        .map(|(product_type, product_id)| json!({ "productType": product_type, "productId": product_id }))
        .collect();
    json!({
        "manufacturer": "Aeotec Ltd.",
        "manufacturerId": "0x0086",
        "label": label,
        "description": format!("{label} device"),
        "devices": devices,
        "firmwareVersion": firmware,
    })
}

fn range(min: &str, max: &str) -> Value {
    json!({ "min": min, "max": max })
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn later(secs: u64) -> SystemTime {
    SystemTime::now() + Duration::from_secs(secs)
}

fn database(devices: &Path) -> DeviceDatabase {
    DeviceDatabase::builder(devices)
        .failure_policy(FailurePolicy::fail_fast())
        .build()
}

fn zw100() -> DeviceId {
    DeviceId::new(0x0086, 0x0002, 0x0064)
}

// ---------------------------------------------------------------------------
// Import resolution
// ---------------------------------------------------------------------------

#[test]
fn test_import_overwrites_earlier_and_preserves_later_keys() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "t.json", &json!({ "a": true, "b": "template" }));
    let doc = dir.path().join("doc.json");
    std::fs::write(&doc, r#"{ "a": 1, "$import": "t.json", "b": 2 }"#).unwrap();

    let resolved = ImportResolver::new(&LocalFileSystem).resolve(&doc).unwrap();
    assert_eq!(resolved, json!({ "a": true, "b": 2 }));
    let keys: Vec<_> = resolved.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, ["a", "b"]);
}

#[test]
fn test_document_without_imports_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let doc = device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0"));
    let path = write_json(dir.path(), "doc.json", &doc);
    assert_eq!(ImportResolver::new(&LocalFileSystem).resolve(&path).unwrap(), doc);
}

#[test]
fn test_json5_documents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, "// comment\n{ value: 0x10, list: [1, 2,], }").unwrap();
    let resolved = ImportResolver::new(&LocalFileSystem).resolve(&path).unwrap();
    assert_eq!(resolved, json!({ "value": 16, "list": [1, 2] }));
}

#[test]
fn test_self_import_is_circular() {
    let dir = TempDir::new().unwrap();
    let path = write_json(dir.path(), "a.json", &json!({ "x": { "$import": "#" } }));
    let err = ImportResolver::new(&LocalFileSystem).resolve(&path).unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::CircularImport));
}

#[test]
fn test_mutual_imports_are_circular() {
    let dir = TempDir::new().unwrap();
    let a = write_json(dir.path(), "a.json", &json!({ "$import": "b.json" }));
    write_json(dir.path(), "b.json", &json!({ "$import": "a.json" }));
    let err = ImportResolver::new(&LocalFileSystem).resolve(&a).unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::CircularImport));
    let message = err.to_string();
    assert!(message.contains("a.json -> "), "{message}");
    assert!(message.contains("b.json -> "), "{message}");
}

#[test]
fn test_cycles_through_nested_arrays_are_detected() {
    let dir = TempDir::new().unwrap();
    let a = write_json(
        dir.path(),
        "a.json",
        &json!({ "outer": [[{ "$import": "b.json#inner" }]] }),
    );
    write_json(
        dir.path(),
        "b.json",
        &json!({ "inner": { "deep": [[{ "$import": "a.json" }]] } }),
    );
    let err = ImportResolver::new(&LocalFileSystem).resolve(&a).unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::CircularImport));
}

#[test]
fn test_importing_the_same_template_twice_is_not_a_cycle() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "t.json", &json!({ "x": 1 }));
    let doc = write_json(
        dir.path(),
        "doc.json",
        &json!({ "first": { "$import": "t.json" }, "second": { "$import": "t.json" } }),
    );
    let resolved = ImportResolver::new(&LocalFileSystem).resolve(&doc).unwrap();
    assert_eq!(resolved, json!({ "first": { "x": 1 }, "second": { "x": 1 } }));
}

#[test]
fn test_selector_into_tagged_array() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "templates/master.json",
        &json!({
            "params": [
                { "#": "enable", "label": "Enable", "defaultValue": 1 },
                { "#": "disable", "label": "Disable", "defaultValue": 0 }
            ]
        }),
    );
    let doc = write_json(
        dir.path(),
        "doc.json",
        &json!({ "p": { "$import": "templates/master.json#params/disable", "label": "Off" } }),
    );
    let resolved = ImportResolver::new(&LocalFileSystem).resolve(&doc).unwrap();
    assert_eq!(resolved["p"]["label"], json!("Off"));
    assert_eq!(resolved["p"]["defaultValue"], json!(0));

    write_json(
        dir.path(),
        "missing.json",
        &json!({ "p": { "$import": "templates/master.json#params/nope" } }),
    );
    let err = ImportResolver::new(&LocalFileSystem)
        .resolve(dir.path().join("missing.json"))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::NotFound));
}

#[test]
fn test_root_relative_imports_and_template_cache() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("devices");
    write_json(&root, "templates/master.json", &json!({ "base": { "valueSize": 1 } }));
    let doc = write_json(
        &root,
        "0x0086/zw100.json",
        &json!({ "param": { "$import": "~/templates/master.json#base" } }),
    );

    let cache = TemplateCache::new();
    let resolver = ImportResolver::new(&LocalFileSystem)
        .with_root_dir(&root)
        .with_cache(&cache);
    let resolved = resolver.resolve(&doc).unwrap();
    assert_eq!(resolved, json!({ "param": { "valueSize": 1 } }));
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&root.join("templates/master.json")).is_some());
}

#[test]
fn test_imports_outside_the_root_are_rejected() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("devices");
    write_json(dir.path(), "secret.json", &json!({ "x": 1 }));
    let doc = write_json(&root, "doc.json", &json!({ "$import": "../secret.json" }));

    let err = ImportResolver::new(&LocalFileSystem)
        .with_root_dir(&root)
        .resolve(&doc)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::Invalid));
}

#[test]
fn test_missing_import_target() {
    let dir = TempDir::new().unwrap();
    let doc = write_json(dir.path(), "doc.json", &json!({ "$import": "nope.json" }));
    let err = ImportResolver::new(&LocalFileSystem).resolve(&doc).unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::NotFound));
}

// ---------------------------------------------------------------------------
// Index building and caching
// ---------------------------------------------------------------------------

#[test]
fn test_index_excludes_templates_and_index_files() {
    let dir = TempDir::new().unwrap();
    let devices = dir.path();
    write_json(devices, "0x0086/zw100.json", &device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    write_json(devices, "templates/master.json", &json!({ "base": {} }));

    let builder = IndexBuilder::new(&LocalFileSystem, devices).with_failure_policy(FailurePolicy::fail_fast());
    let entries = builder.rebuild::<IndexEntry>(&devices.join(INDEX_FILE)).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].filename, "0x0086/zw100.json");

    let text = std::fs::read_to_string(devices.join(INDEX_FILE)).unwrap();
    assert!(text.starts_with(INDEX_BANNER));

    // The written index must not be picked up as a document.
    let again = builder.build::<IndexEntry>().unwrap();
    assert_eq!(again, entries);
}

#[test]
fn test_one_entry_per_declared_product() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "0x0086/multi.json",
        &device_doc("Multi", &[("0x0002", "0x0064"), ("0x0102", "0x0064")], range("1.0", "2.0")),
    );
    let entries: Vec<IndexEntry> = IndexBuilder::new(&LocalFileSystem, dir.path())
        .with_failure_policy(FailurePolicy::fail_fast())
        .build()
        .unwrap();
    let products: Vec<_> = entries.iter().map(|e| (e.product_type, e.product_id)).collect();
    assert_eq!(products, [(0x0002, 0x0064), (0x0102, 0x0064)]);
}

#[test]
fn test_index_staleness() {
    let dir = TempDir::new().unwrap();
    let devices = dir.path();
    let doc = write_json(devices, "0x0086/zw100.json", &device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    let index_path = devices.join(INDEX_FILE);
    let builder = IndexBuilder::new(&LocalFileSystem, devices).with_failure_policy(FailurePolicy::fail_fast());

    let first = builder.load::<IndexEntry>(&index_path).unwrap();
    assert_eq!(first.state, IndexState::Missing);

    // Plant a marker entry and make the index newer than every document.
    let mut marker = first.entries[0].clone();
    marker.filename = "marker.json".into();
    let mut planted = first.entries.clone();
    planted.push(marker);
    builder.write_index(&index_path, &planted).unwrap();
    set_mtime(&index_path, later(3600));

    let fresh = builder.load::<IndexEntry>(&index_path).unwrap();
    assert_eq!(fresh.state, IndexState::Fresh);
    assert!(fresh.entries.iter().any(|e| e.filename == "marker.json"));
    assert_eq!(fresh.entries[0].root_dir.as_deref(), Some(devices));

    // Touching a document makes the index stale.
    set_mtime(&doc, later(7200));
    assert_eq!(builder.state::<IndexEntry>(&index_path).unwrap(), IndexState::Stale);
    let rebuilt = builder.load::<IndexEntry>(&index_path).unwrap();
    assert_eq!(rebuilt.state, IndexState::Stale);
    assert!(rebuilt.entries.iter().all(|e| e.filename != "marker.json"));

    // Touching only the index does not.
    set_mtime(&index_path, later(10800));
    assert_eq!(builder.load::<IndexEntry>(&index_path).unwrap().state, IndexState::Fresh);
}

#[test]
fn test_malformed_index_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let devices = dir.path();
    write_json(devices, "0x0086/zw100.json", &device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    let index_path = devices.join(INDEX_FILE);
    std::fs::write(&index_path, "[{ \"manufacturerId\": ").unwrap();
    set_mtime(&index_path, later(3600));

    let builder = IndexBuilder::new(&LocalFileSystem, devices).with_failure_policy(FailurePolicy::fail_fast());
    assert_eq!(builder.state::<IndexEntry>(&index_path).unwrap(), IndexState::Malformed);
    let loaded = builder.load::<IndexEntry>(&index_path).unwrap();
    assert_eq!(loaded.state, IndexState::Malformed);
    assert_eq!(loaded.entries.len(), 1);
}

#[test]
fn test_failure_policy() {
    let dir = TempDir::new().unwrap();
    let devices = dir.path();
    write_json(devices, "0x0086/good.json", &device_doc("Good", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    let mut broken = device_doc("Broken", &[("0x0002", "0x0065")], range("1.0", "2.0"));
    broken["manufacturerId"] = json!("0x86");
    write_json(devices, "0x0086/broken.json", &broken);

    let skipped: Vec<IndexEntry> = IndexBuilder::new(&LocalFileSystem, devices)
        .with_failure_policy(FailurePolicy::skip())
        .build()
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].filename, "0x0086/good.json");

    let err = IndexBuilder::new(&LocalFileSystem, devices)
        .with_failure_policy(FailurePolicy::fail_fast())
        .build::<IndexEntry>()
        .unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::Invalid));
    assert!(err.to_string().starts_with("0x0086/broken.json: "), "{err}");
}

#[test]
fn test_custom_index_file_names_are_not_documents() {
    let dir = TempDir::new().unwrap();
    let devices = dir.path();
    let doc = write_json(devices, "0x0086/zw100.json", &device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    let mut db = DeviceDatabase::builder(devices)
        .index_file("devices.json")
        .fulltext_index_file("search.json")
        .failure_policy(FailurePolicy::fail_fast())
        .build();

    assert_eq!(db.load_index().unwrap(), IndexState::Missing);
    assert_eq!(db.load_fulltext_index().unwrap(), IndexState::Missing);
    set_mtime(&devices.join("devices.json"), later(3600));
    set_mtime(&devices.join("search.json"), later(3700));

    // A newer full-text index does not make the compact one stale.
    assert_eq!(db.index_state().unwrap(), IndexState::Fresh);

    set_mtime(&doc, later(7200));
    assert_eq!(db.load_index().unwrap(), IndexState::Stale);
    assert_eq!(db.entries().unwrap().count(), 1);
    assert_eq!(db.load_fulltext_index().unwrap(), IndexState::Stale);
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[test]
fn test_end_to_end_inferred_parameter_range() {
    let dir = TempDir::new().unwrap();
    let mut doc = device_doc("ZW100", &[("0x0002", "0x0064"), ("0x0102", "0x0064")], range("1.0", "255.255"));
    doc["paramInformation"] = json!({
        "3": {
            "label": "Motion timeout",
            "valueSize": 1,
            "defaultValue": 1,
            "allowManualEntry": false,
            "options": [
                { "label": "Short", "value": 1 },
                { "label": "Long", "value": 5 }
            ]
        }
    });
    write_json(dir.path(), "0x0086/zw100.json", &doc);

    let mut db = database(dir.path());
    db.load_index().unwrap();
    for product_type in [0x0002, 0x0102] {
        let config = db
            .lookup_device(&DeviceId::new(0x0086, product_type, 0x0064).with_firmware("1.5"))
            .unwrap()
            .unwrap();
        let param = config.param(&ParamKey::new(3)).unwrap();
        assert_eq!((param.min_value, param.max_value), (1, 5));
        assert!(config.is_embedded);
    }
}

#[test]
fn test_firmware_lookup() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "0x0086/zw100_old.json", &device_doc("Old", &[("0x0002", "0x0064")], range("1.0", "1.9")));
    write_json(dir.path(), "0x0086/zw100_new.json", &device_doc("New", &[("0x0002", "0x0064")], range("1.10", "255.255")));

    let mut db = database(dir.path());
    db.load_index().unwrap();

    let label = |firmware: &str| {
        db.lookup_device(&zw100().with_firmware(firmware))
            .unwrap()
            .map(|config| config.label)
    };
    assert_eq!(label("1.5").as_deref(), Some("Old"));
    assert_eq!(label("1.9").as_deref(), Some("Old"));
    assert_eq!(label("1.10").as_deref(), Some("New"));
    assert_eq!(label("0.5"), None);

    // Without a firmware version the first match in filename order wins.
    assert_eq!(db.find(&zw100()).unwrap().unwrap().filename, "0x0086/zw100_new.json");
    assert!(db.find_unversioned(&zw100()).unwrap().is_none());
    assert_eq!(db.overlaps().unwrap().len(), 0);
}

#[test]
fn test_conditional_values_use_the_lookup_firmware() {
    let dir = TempDir::new().unwrap();
    let mut doc = device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "255.255"));
    doc["description"] = json!([
        { "$if": "firmwareVersion < 1.10", "value": "Early" },
        "Late"
    ]);
    write_json(dir.path(), "0x0086/zw100.json", &doc);

    let mut db = database(dir.path());
    db.load_index().unwrap();
    let description = |firmware: &str| {
        db.lookup_device(&zw100().with_firmware(firmware))
            .unwrap()
            .unwrap()
            .description
    };
    assert_eq!(description("1.9"), "Early");
    assert_eq!(description("1.10"), "Late");
}

#[test]
fn test_unversioned_lookup() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "0x0086/a.json", &device_doc("Ranged", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    write_json(dir.path(), "0x0086/b.json", &device_doc("Plain", &[("0x0002", "0x0064")], json!(false)));

    let mut db = database(dir.path());
    db.load_index().unwrap();
    let config = db
        .lookup_unversioned(&zw100().with_firmware("1.5"))
        .unwrap()
        .unwrap();
    assert_eq!(config.label, "Plain");
    assert!(config.firmware_version.is_unversioned());
}

#[test]
fn test_lookup_before_loading_fails() {
    let dir = TempDir::new().unwrap();
    let db = database(dir.path());
    let err = db.lookup_device(&zw100()).unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::NotLoaded));
    let err = db.search("zw100").unwrap_err();
    assert_eq!(err.kind(), Some(ConfigErrorKind::NotLoaded));
}

#[test]
fn test_priority_directory_wins() {
    let dir = TempDir::new().unwrap();
    let devices = dir.path().join("devices");
    let user = dir.path().join("user");
    write_json(&devices, "0x0086/zw100.json", &device_doc("Embedded", &[("0x0002", "0x0064")], range("1.0", "255.255")));
    write_json(&user, "zw100.json", &device_doc("Custom", &[("0x0002", "0x0064")], range("1.0", "255.255")));

    let mut db = DeviceDatabase::builder(&devices)
        .priority_dir(&user)
        .failure_policy(FailurePolicy::fail_fast())
        .build();
    db.load_index().unwrap();

    let config = db.lookup_device(&zw100().with_firmware("1.5")).unwrap().unwrap();
    assert_eq!(config.label, "Custom");
    assert!(!config.is_embedded);

    // The priority directory is never persisted.
    assert!(!user.join(INDEX_FILE).exists());
    let persisted: Vec<IndexEntry> =
        json5::from_str(&std::fs::read_to_string(devices.join(INDEX_FILE)).unwrap()).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].filename, "0x0086/zw100.json");
    assert_eq!(db.entries().unwrap().count(), 2);
}

#[test]
fn test_preferred_document_wins() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "0x0086/a.json", &device_doc("Generic", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    let mut preferred = device_doc("Specific", &[("0x0002", "0x0064")], range("1.0", "2.0"));
    preferred["preferred"] = json!(true);
    write_json(dir.path(), "0x0086/b.json", &preferred);

    let mut db = database(dir.path());
    db.load_index().unwrap();
    let config = db.lookup_device(&zw100().with_firmware("1.5")).unwrap().unwrap();
    assert_eq!(config.label, "Specific");
    assert!(db.overlaps().unwrap().is_empty());
}

#[test]
fn test_overlapping_documents_are_reported() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "0x0086/a.json", &device_doc("A", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    write_json(dir.path(), "0x0086/b.json", &device_doc("B", &[("0x0002", "0x0064")], range("1.5", "3.0")));

    let mut db = database(dir.path());
    db.load_index().unwrap();
    let overlaps = db.overlaps().unwrap();
    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].first.filename, "0x0086/a.json");
    assert_eq!(overlaps[0].second.filename, "0x0086/b.json");
}

#[test]
fn test_fulltext_search() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "0x0086/zw100.json", &device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0")));
    write_json(dir.path(), "0x0086/zw096.json", &device_doc("ZW096", &[("0x0003", "0x0060")], range("1.0", "2.0")));

    let mut db = database(dir.path());
    assert_eq!(db.load_fulltext_index().unwrap(), IndexState::Missing);
    let hits = db.search("zw096").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].label, "ZW096");
    assert_eq!(db.search("aeotec device").unwrap().len(), 2);

    let persisted: Vec<FulltextIndexEntry> =
        json5::from_str(&std::fs::read_to_string(db.fulltext_index_path()).unwrap()).unwrap();
    assert_eq!(persisted.len(), 2);
}

#[test]
fn test_partial_parameter_bit_alignment() {
    let dir = TempDir::new().unwrap();
    let mut doc = device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0"));
    doc["paramInformation"] = json!({
        "10[0x0c]": {
            "label": "Mode",
            "valueSize": 1,
            "minValue": 1,
            "maxValue": 3,
            "defaultValue": 1,
            "unsigned": true
        }
    });
    let path = write_json(dir.path(), "good.json", &doc);
    let resolver = ImportResolver::new(&LocalFileSystem).with_root_dir(dir.path());
    let config = load_device_config(&resolver, dir.path(), &path, true)
        .unwrap()
        .evaluate(None)
        .unwrap();
    assert!(config.param(&ParamKey::partial(10, 0x0c)).is_some());
    assert_eq!(config.partial_params(10).count(), 1);

    doc["paramInformation"]["10[0x0c]"]["maxValue"] = json!(4);
    let path = write_json(dir.path(), "bad.json", &doc);
    let err = load_device_config(&resolver, dir.path(), &path, true)
        .unwrap()
        .evaluate(None)
        .unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::Invalid);
    assert!(err.to_string().starts_with("bad.json: "), "{err}");
}

#[test]
fn test_database_from_config_file() {
    let dir = TempDir::new().unwrap();
    let devices = dir.path().join("devices");
    write_json(&devices, "0x0086/zw100.json", &device_doc("ZW100", &[("0x0002", "0x0064")], range("1.0", "2.0")));

    let mut config = DatabaseConfig::new(&devices);
    config.index_file = "devices.json".into();
    config.fail_on_error = Some(true);
    let config_path = dir.path().join("devcfg.yml");
    config.save(&config_path).unwrap();

    let mut db = DatabaseConfig::load(&config_path).unwrap().builder().build();
    assert_eq!(db.load_index().unwrap(), IndexState::Missing);
    assert!(devices.join("devices.json").exists());
    assert!(!devices.join(INDEX_FILE).exists());
    assert!(db.find(&zw100()).unwrap().is_some());
}
