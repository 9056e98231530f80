use std::io::Write;
use std::sync::Arc;
use widget_runtime_core::{
    BundleLoader, BundleLocation, CompositeBundleSource, ConstructionError, HeadlessPresenter,
    InMemoryBundleSource, LoadError, LogicCatalog, ModuleInstance, PropertySet, RuntimeConfig,
    RuntimeController, RuntimeError, RuntimeState,
};

struct Banner;

impl ModuleInstance for Banner {}

fn banner(_props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
    Ok(Box::new(Banner))
}

fn runtime_for(location: &str) -> RuntimeController {
    let catalog = LogicCatalog::new().with("demo.banner", banner).unwrap();
    RuntimeController::new(
        BundleLocation::parse(location).unwrap(),
        BundleLoader::new(
            Arc::new(CompositeBundleSource::new(InMemoryBundleSource::new())),
            catalog,
        ),
        Arc::new(HeadlessPresenter::new()),
        RuntimeConfig::default(),
    )
}

#[test]
fn starts_from_bundle_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"format_version":1,"bundle_id":"demo.files","version":"2.0.0","modules":[{{"name":"Banner","entry":"demo.banner"}}]}}"#
    )
    .unwrap();
    file.flush().unwrap();

    let location = format!("file://{}", file.path().display());
    let runtime = runtime_for(&location);
    runtime.start().unwrap();
    assert_eq!(runtime.module_names(), vec!["Banner"]);

    let receipt = runtime.load_receipt().unwrap();
    assert_eq!(receipt.bundle_id, "demo.files");
    assert_eq!(
        receipt.byte_len as u64,
        std::fs::metadata(file.path()).unwrap().len()
    );

    let handle = runtime.create_surface("Banner", PropertySet::new()).unwrap();
    assert!(handle.is_live());
}

#[test]
fn duplicate_module_in_file_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.json");
    std::fs::write(
        &path,
        r#"{"format_version":1,"bundle_id":"demo.dup","version":"1.0.0","modules":[
            {"name":"Banner","entry":"demo.banner"},
            {"name":"Banner","entry":"demo.banner"}]}"#,
    )
    .unwrap();

    let runtime = runtime_for(path.to_str().unwrap());
    let err = runtime.start().unwrap_err();
    assert_eq!(
        err,
        RuntimeError::Load(LoadError::DuplicateModule("Banner".to_string()))
    );
    assert_eq!(runtime.state(), RuntimeState::Invalidated);
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let runtime = runtime_for(path.to_str().unwrap());
    let err = runtime.start().unwrap_err();
    assert!(matches!(err, RuntimeError::Load(LoadError::NotFound(_))));
}
