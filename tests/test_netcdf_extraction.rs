//! NetCDF-path extraction against a real file.
//!
//! These tests need a CF-convention NetCDF product on disk (any gridded
//! file with xc/yc coordinates and a grid-mapping variable works, e.g. a
//! sea-ice thickness product). Point RASTAC_TEST_NETCDF at one to run
//! them; without it they skip, like the raw-product tests upstream.

use rastac::core::geotransform::GeotransformCalculator;
use rastac::{LayerMaterializer, NetcdfMetadataExtractor};
use rastac::{Asset, CancelToken, Item, LoadRequest};

fn test_file() -> Option<String> {
    let path = std::env::var("RASTAC_TEST_NETCDF").ok()?;
    if std::path::Path::new(&path).exists() {
        Some(path)
    } else {
        println!("Test data not found at {}, skipping", path);
        None
    }
}

#[test]
fn consolidated_extraction_uses_at_most_two_opens_worth_of_metadata() {
    let Some(path) = test_file() else { return };

    let metadata = NetcdfMetadataExtractor::extract(&path);
    println!(
        "variables: {:?}, epsg: {:?}, geotransform: {:?}",
        metadata.data_variables, metadata.epsg, metadata.geotransform
    );

    assert!(
        !metadata.data_variables.is_empty(),
        "expected at least one data variable"
    );
    for (uri, name) in &metadata.data_variables {
        assert!(uri.contains(name), "subdataset URI should carry the name");
        assert!(!name.ends_with("_bnds"));
        assert!(!name.ends_with("_bounds"));
    }

    if let Some(gt) = metadata.geotransform {
        assert!(gt.pixel_height() <= 0.0);
        assert_eq!(gt.0[2], 0.0);
        assert_eq!(gt.0[4], 0.0);
    }
}

#[test]
fn epsg_only_probe_agrees_with_the_full_pull() {
    let Some(path) = test_file() else { return };

    let metadata = NetcdfMetadataExtractor::extract(&path);
    let probe = NetcdfMetadataExtractor::extract_epsg(&path);
    assert_eq!(metadata.epsg, probe);
}

#[test]
fn selection_limits_materialized_layers() {
    let Some(path) = test_file() else { return };

    let metadata = NetcdfMetadataExtractor::extract(&path);
    let Some((_, first_variable)) = metadata.data_variables.first() else {
        return;
    };

    let mut item = Item::new("netcdf-test");
    item.assets.insert(
        "data".to_string(),
        Asset::new("data", &path).with_media_type("application/x-netcdf"),
    );

    // With a selection: exactly one layer
    let selected = LoadRequest {
        item: item.clone(),
        asset_key: "data".to_string(),
        selected_variable_names: Some(vec![first_variable.clone()]),
    };
    let result = LayerMaterializer::materialize(
        &selected.item,
        "data",
        &selected.item.assets["data"],
        selected.selected_variable_names.as_deref(),
        &mut |_| {},
        &CancelToken::new(),
    )
    .expect("materialize");
    assert_eq!(result.layers.len(), 1);
    assert_eq!(result.layers[0].variable.as_deref(), Some(first_variable.as_str()));

    // Without a selection: one layer per discovered data variable
    let result = LayerMaterializer::materialize(
        &item,
        "data",
        &item.assets["data"],
        None,
        &mut |_| {},
        &CancelToken::new(),
    )
    .expect("materialize");
    assert_eq!(result.layers.len(), metadata.data_variables.len());

    // Stable name-sorted order
    let names: Vec<_> = result
        .layers
        .iter()
        .filter_map(|l| l.variable.clone())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn geotransform_is_shared_between_both_paths() {
    let Some(path) = test_file() else { return };

    // The NetCDF path feeds its coordinate arrays through the same
    // calculator the kerchunk path uses; re-deriving from the extracted
    // transform must be self-consistent.
    let metadata = NetcdfMetadataExtractor::extract(&path);
    let Some(gt) = metadata.geotransform else { return };

    let x = [gt.origin_x() + gt.pixel_width() / 2.0, gt.origin_x() + 1.5 * gt.pixel_width()];
    let y = [gt.origin_y() - gt.pixel_height().abs() / 2.0, gt.origin_y() - 1.5 * gt.pixel_height().abs()];
    let rederived = GeotransformCalculator::compute(&x, &y).unwrap();
    assert_eq!(rederived.pixel_width(), gt.pixel_width());
}
