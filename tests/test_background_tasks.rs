use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use rastac::io::metadata_xml::MetadataXmlFetcher;
use rastac::{
    Asset, CancelToken, CrsSource, Item, LayerMaterializer, LoadRequest, RastacError,
    RastacResult, TaskOutcome, TaskRunner,
};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a small GeoTIFF fixture, optionally without a CRS.
fn create_gtiff(path: &Path, epsg: Option<u32>) {
    let driver = DriverManager::get_driver_by_name("GTiff").expect("GTiff driver");
    let mut dataset = driver.create(path, 4, 4, 1).expect("create fixture");
    dataset
        .set_geo_transform(&[0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
        .expect("set geotransform");
    if let Some(code) = epsg {
        let srs = SpatialRef::from_epsg(code).expect("srs");
        dataset.set_spatial_ref(&srs).expect("set srs");
    }
}

fn item_with_tiff(id: &str, tiff_path: &Path, with_metadata_asset: bool) -> Item {
    let mut item = Item::new(id);
    item.assets.insert(
        "data".to_string(),
        Asset::new("data", tiff_path.to_string_lossy()).with_media_type("image/tiff"),
    );
    if with_metadata_asset {
        item.assets.insert(
            "metadata".to_string(),
            Asset::new("metadata", "https://example.com/meta.xml"),
        );
    }
    item
}

fn request(item: Item) -> LoadRequest {
    LoadRequest {
        item,
        asset_key: "data".to_string(),
        selected_variable_names: None,
    }
}

/// Fetcher that parks until the test releases it, making task overlap
/// deterministic. Signals `started` when a fetch begins.
struct BlockingFetcher {
    started: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl BlockingFetcher {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel();
        let fetcher = Arc::new(BlockingFetcher {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        });
        (fetcher, started_rx, release_tx)
    }
}

impl MetadataXmlFetcher for BlockingFetcher {
    fn fetch_xml(&self, _url: &str) -> RastacResult<String> {
        let _ = self.started.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        Ok("<empty/>".to_string())
    }
}

/// Fetcher that should never run.
struct PanicFetcher;

impl MetadataXmlFetcher for PanicFetcher {
    fn fetch_xml(&self, url: &str) -> RastacResult<String> {
        panic!("metadata XML fetched unexpectedly: {}", url);
    }
}

#[test]
fn load_task_succeeds_for_a_georeferenced_tiff() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let tiff = dir.path().join("scene.tif");
    create_gtiff(&tiff, Some(32630));

    let runner = TaskRunner::new();
    let handle = runner
        .spawn_load(request(item_with_tiff("scene-a", &tiff, true)), Arc::new(PanicFetcher))
        .expect("spawn should succeed");

    match handle.wait() {
        TaskOutcome::Completed(result) => {
            assert_eq!(result.layers.len(), 1);
            let layer = &result.layers[0];
            assert_eq!(layer.name, "scene-a_data");
            let crs = layer.crs.as_ref().expect("layer CRS resolved");
            assert_eq!(crs.epsg_code, "32630");
            assert_eq!(crs.source, CrsSource::Layer);
            assert!(result.errors.is_empty());
        }
        other => panic!("expected Completed, got {:?}", outcome_name(&other)),
    }
}

#[test]
fn duplicate_pair_is_rejected_while_the_first_task_runs() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let tiff = dir.path().join("scene.tif");
    // No CRS anywhere: resolution reaches the (blocking) XML stage
    create_gtiff(&tiff, None);

    let (fetcher, started, release) = BlockingFetcher::new();
    let runner = TaskRunner::new();

    let first = runner
        .spawn_load(request(item_with_tiff("scene-b", &tiff, true)), fetcher.clone())
        .expect("first spawn");
    started.recv().expect("task should reach the XML stage");

    // Same (item, asset) pair while the first is in flight
    let duplicate = runner.spawn_load(request(item_with_tiff("scene-b", &tiff, true)), fetcher.clone());
    assert!(matches!(duplicate, Err(RastacError::DuplicateTask(_))));

    release.send(()).unwrap();
    match first.wait() {
        TaskOutcome::Completed(result) => {
            assert_eq!(result.layers.len(), 1);
            // CRS unresolved: layer kept, flagged for manual assignment
            assert!(result.layers[0].crs.is_none());
            assert!(result.errors.iter().any(|e| e.contains("No CRS")));
        }
        other => panic!("expected Completed, got {:?}", outcome_name(&other)),
    }

    // Terminal state releases the slot
    let again = runner
        .spawn_load(request(item_with_tiff("scene-b", &tiff, true)), fetcher)
        .expect("slot should be free after completion");
    started.recv().unwrap();
    release.send(()).unwrap();
    again.wait();
}

#[test]
fn cancelled_task_yields_the_cancelled_marker() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let tiff = dir.path().join("scene.tif");
    create_gtiff(&tiff, None);

    let (fetcher, started, release) = BlockingFetcher::new();
    let runner = TaskRunner::new();

    let handle = runner
        .spawn_load(request(item_with_tiff("scene-c", &tiff, true)), fetcher)
        .expect("spawn");
    started.recv().expect("task should reach the XML stage");

    handle.cancel();
    release.send(()).unwrap();

    match handle.wait() {
        TaskOutcome::Cancelled => {}
        other => panic!("expected Cancelled, got {:?}", outcome_name(&other)),
    }
}

#[test]
fn missing_asset_fails_with_a_task_error() {
    init_logging();
    let runner = TaskRunner::new();
    let request = LoadRequest {
        item: Item::new("scene-d"),
        asset_key: "data".to_string(),
        selected_variable_names: None,
    };

    let handle = runner.spawn_load(request, Arc::new(PanicFetcher)).unwrap();
    match handle.wait() {
        TaskOutcome::Failed(error) => {
            assert!(error.contains("no asset"), "unexpected error: {}", error);
        }
        other => panic!("expected Failed, got {:?}", outcome_name(&other)),
    }
}

#[test]
fn unreadable_source_aggregates_into_one_error() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.tif");

    let runner = TaskRunner::new();
    let handle = runner
        .spawn_load(
            request(item_with_tiff("scene-e", &missing, false)),
            Arc::new(PanicFetcher),
        )
        .unwrap();

    match handle.wait() {
        TaskOutcome::Failed(error) => {
            assert!(
                error.contains("No valid layers created for data"),
                "unexpected error: {}",
                error
            );
        }
        other => panic!("expected Failed, got {:?}", outcome_name(&other)),
    }
}

#[test]
fn prefetch_completes_empty_for_items_without_kerchunk() {
    init_logging();
    let runner = TaskRunner::new();
    let handle = runner.spawn_kerchunk_prefetch(Item::new("scene-f"));

    match handle.wait() {
        TaskOutcome::Completed(variables) => assert!(variables.is_empty()),
        other => panic!("expected Completed, got {:?}", outcome_name(&other)),
    }
}

#[test]
fn precancelled_token_stops_the_load_before_any_work() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let tiff = dir.path().join("scene.tif");
    create_gtiff(&tiff, Some(4326));

    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = LayerMaterializer::load(
        &request(item_with_tiff("scene-g", &tiff, false)),
        &PanicFetcher,
        &mut |_| {},
        &cancel,
    );
    assert!(matches!(outcome, Err(RastacError::TaskCancelled)));
}

fn outcome_name<T>(outcome: &TaskOutcome<T>) -> &'static str {
    match outcome {
        TaskOutcome::Completed(_) => "Completed",
        TaskOutcome::Failed(_) => "Failed",
        TaskOutcome::Cancelled => "Cancelled",
    }
}
