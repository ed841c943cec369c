//! NetCDF metadata extraction through the GDAL multidimensional API.
//!
//! Mirrors the kerchunk path's classification, EPSG and geotransform rules
//! against a real array store. A full metadata pull costs at most two
//! dataset opens (one classic open for the subdataset listing, one
//! multidim open for attributes and coordinate arrays) — each open is a
//! network round trip for remote sources, so per-variable re-opening is
//! off the table.

use crate::core::cf;
use crate::core::geotransform::GeotransformCalculator;
use crate::types::Geotransform;
use gdal::cpl::CslStringList;
use gdal::raster::{Group, MDArray};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags, Metadata};

/// Consolidated metadata pulled from one NetCDF file.
#[derive(Debug, Clone, Default)]
pub struct NetcdfMetadata {
    /// (subdataset URI, variable name) per data variable, listing order.
    pub data_variables: Vec<(String, String)>,
    pub geotransform: Option<Geotransform>,
    pub epsg: Option<String>,
}

/// Metadata extractor over the GDAL multidim API.
pub struct NetcdfMetadataExtractor;

impl NetcdfMetadataExtractor {
    /// Extract variables, geotransform and EPSG with at most two opens.
    ///
    /// Absence of any piece is not an error: the partial metadata
    /// collected so far is returned and the gaps stay None/empty.
    pub fn extract(file_path: &str) -> NetcdfMetadata {
        let file_path = strip_subdataset_wrapper(file_path);
        let mut metadata = NetcdfMetadata::default();

        // Open 1: classic open for the subdataset listing
        let subdataset_uris = match Dataset::open(&file_path) {
            Ok(dataset) => subdataset_names(&dataset),
            Err(e) => {
                log::warn!("Could not open {}: {}", file_path, e);
                return metadata;
            }
        };

        // Open 2: multidim open for attribute and coordinate access
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_MULTIDIM_RASTER,
            ..DatasetOptions::default()
        };
        let md_dataset = match Dataset::open_ex(&file_path, options) {
            Ok(dataset) => dataset,
            Err(e) => {
                log::warn!("Multidim open failed for {}: {}", file_path, e);
                return metadata;
            }
        };
        let root = match md_dataset.root_group() {
            Ok(root) => root,
            Err(e) => {
                log::warn!("No root group in {}: {}", file_path, e);
                return metadata;
            }
        };

        for uri in subdataset_uris {
            let variable_name = match uri.rsplit(':').next() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue,
            };
            if cf::is_bounds_name(&variable_name) {
                continue;
            }
            if let Ok(array) = open_array(&root, &variable_name) {
                if is_coordinate_variable(&array) {
                    continue;
                }
            }
            metadata.data_variables.push((uri, variable_name));
        }

        metadata.epsg = extract_epsg_from_group(&root);
        metadata.geotransform = extract_geotransform_from_group(&root);
        metadata
    }

    /// EPSG-only probe: one multidim open, no subdataset listing.
    ///
    /// Used by the CRS resolution chain, where the variable listing has
    /// already happened elsewhere and a second full pull would double the
    /// round trips.
    pub fn extract_epsg(file_path: &str) -> Option<String> {
        let file_path = strip_subdataset_wrapper(file_path);
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_MULTIDIM_RASTER,
            ..DatasetOptions::default()
        };
        let dataset = Dataset::open_ex(&file_path, options).ok()?;
        let root = dataset.root_group().ok()?;
        extract_epsg_from_group(&root)
    }
}

/// Classify a multidim array as coordinate machinery or data.
///
/// Same rules as the kerchunk path: scalar arrays, coordinate-flavored
/// standard_name values, or any axis attribute mean "coordinate".
fn is_coordinate_variable(array: &MDArray) -> bool {
    let dimension_count = array.dimensions().map(|d| d.len()).unwrap_or(0);
    if dimension_count == 0 {
        return true;
    }

    if let Ok(attribute) = array.attribute("standard_name") {
        if cf::is_coordinate_standard_name(&attribute.read_as_string()) {
            return true;
        }
    }

    array.attribute("axis").is_ok()
}

/// EPSG from the first grid-mapping variable carrying a known attribute.
fn extract_epsg_from_group(root: &Group) -> Option<String> {
    for gm_name in cf::GRID_MAPPING_NAMES {
        let array = match open_array(root, gm_name) {
            Ok(array) => array,
            Err(_) => continue,
        };
        for attr_name in cf::EPSG_ATTRIBUTE_NAMES {
            if let Ok(attribute) = array.attribute(attr_name) {
                return Some(cf::normalize_epsg(&attribute.read_as_string()));
            }
        }
    }
    None
}

/// Geotransform from the first 1-D x/y coordinate array pair.
fn extract_geotransform_from_group(root: &Group) -> Option<Geotransform> {
    let x_coords = read_coordinate_array(root, &cf::X_COORDINATE_NAMES)?;
    let y_coords = read_coordinate_array(root, &cf::Y_COORDINATE_NAMES)?;
    GeotransformCalculator::compute(&x_coords, &y_coords)
}

fn read_coordinate_array(root: &Group, candidates: &[&str]) -> Option<Vec<f64>> {
    for name in candidates {
        let array = match open_array(root, name) {
            Ok(array) => array,
            Err(_) => continue,
        };
        let dimensions = match array.dimensions() {
            Ok(dimensions) => dimensions,
            Err(_) => continue,
        };
        if dimensions.len() != 1 {
            continue;
        }
        let size = dimensions[0].size() as usize;
        match array.read_as::<f64>(vec![0], vec![size]) {
            Ok(values) => return Some(values),
            Err(e) => {
                log::warn!("Could not read coordinate array '{}': {}", name, e);
                continue;
            }
        }
    }
    None
}

fn open_array<'a>(root: &'a Group, name: &str) -> gdal::errors::Result<MDArray<'a>> {
    root.open_md_array(name, CslStringList::new())
}

/// Subdataset URIs from the SUBDATASETS metadata domain (the *_NAME keys).
fn subdataset_names(dataset: &Dataset) -> Vec<String> {
    dataset
        .metadata_domain("SUBDATASETS")
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            if key.ends_with("_NAME") {
                Some(value.to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Reduce NETCDF:"path":variable inputs to the inner file path.
fn strip_subdataset_wrapper(file_path: &str) -> String {
    if !file_path.starts_with("NETCDF:") {
        return file_path.to_string();
    }
    let parts: Vec<&str> = file_path.split(':').collect();
    if parts.len() >= 3 {
        parts[1..parts.len() - 1].join(":").trim_matches('"').to_string()
    } else {
        file_path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdataset_wrapper_is_stripped() {
        assert_eq!(
            strip_subdataset_wrapper("NETCDF:\"/data/ice.nc\":sea_ice_thickness"),
            "/data/ice.nc"
        );
        assert_eq!(strip_subdataset_wrapper("/data/ice.nc"), "/data/ice.nc");
    }

    #[test]
    fn windows_drive_letters_survive_stripping() {
        assert_eq!(
            strip_subdataset_wrapper("NETCDF:\"C:/data/ice.nc\":thickness"),
            "C:/data/ice.nc"
        );
    }
}
