//! Layer construction for classified assets.
//!
//! NetCDF assets are downloaded to a local temp file first (synthetic
//! georeferencing needs random access), then split into one layer per data
//! variable. Plain rasters open in place, remote COG/GeoTIFF through
//! /vsicurl/ so only the needed byte ranges move. Layers leave here without
//! an asserted CRS; the resolution chain runs per layer afterwards.

use crate::core::classifier::AssetClassifier;
use crate::core::crs::{self, CrsResolver};
use crate::io::download;
use crate::io::metadata_xml::MetadataXmlFetcher;
use crate::io::netcdf::NetcdfMetadataExtractor;
use crate::types::{
    Asset, CancelToken, Geotransform, Item, LoadRequest, LoadResult, RastacError, RastacResult,
    RasterLayer,
};
use gdal::raster::RasterCreationOption;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};

/// Share of the progress range consumed by the download phase.
const DOWNLOAD_PROGRESS_CEILING: u8 = 80;

/// Builds raster layers for one asset of one item.
pub struct LayerMaterializer;

impl LayerMaterializer {
    /// Full load flow: materialize layers, then resolve a CRS per layer.
    ///
    /// This is what a background task executes end-to-end. Layers whose
    /// CRS stays unresolved are kept and flagged in `errors` so the
    /// collaborator can offer manual assignment.
    pub fn load(
        request: &LoadRequest,
        metadata_xml_fetcher: &dyn MetadataXmlFetcher,
        progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> RastacResult<LoadResult> {
        let item = &request.item;
        let asset = item.assets.get(&request.asset_key).ok_or_else(|| {
            RastacError::UnsupportedAsset(format!(
                "Item {} has no asset '{}'",
                item.id, request.asset_key
            ))
        })?;

        let classification = AssetClassifier::classify(asset, Some(&request.asset_key));
        if !classification.is_loadable {
            return Err(RastacError::UnsupportedAsset(format!(
                "Asset '{}' ({}) is not loadable",
                request.asset_key, classification.file_type
            )));
        }

        let mut result = Self::materialize(
            item,
            &request.asset_key,
            asset,
            request.selected_variable_names.as_deref(),
            progress,
            cancel,
        )?;

        cancel.check()?;

        let item_epsg = crs::extract_epsg_from_item(item);
        let LoadResult { layers, errors, .. } = &mut result;
        for layer in layers.iter_mut() {
            cancel.check()?;

            let layer_authid = crs::layer_authority(&layer.source);
            let resolved = CrsResolver::resolve(
                layer_authid.as_deref(),
                asset,
                item_epsg.as_deref(),
                Some(item),
                metadata_xml_fetcher,
                Some(&layer.source),
            );

            match resolved {
                Some(resolved) => {
                    log::info!(
                        "{}: CRS {} from {:?}",
                        layer.name,
                        resolved.authid(),
                        resolved.source
                    );
                    layer.crs = Some(resolved);
                }
                None => {
                    // Kept, not dropped: the collaborator assigns manually.
                    errors.push(format!("No CRS found for layer '{}'", layer.name));
                }
            }
        }

        progress(99);
        Ok(result)
    }

    /// Build layers for one asset, branched by detected type.
    ///
    /// Download progress is scaled to 0-80; construction uses the rest.
    /// Per-variable failures land in `errors` while siblings proceed.
    pub fn materialize(
        item: &Item,
        asset_key: &str,
        asset: &Asset,
        selected_variable_names: Option<&[String]>,
        progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> RastacResult<LoadResult> {
        cancel.check()?;

        let mut result = LoadResult::default();
        let layer_name = format!("{}_{}", item.id, asset_key);
        let mut url = asset.href.clone();
        let is_netcdf = AssetClassifier::is_netcdf(asset);

        // NetCDF from the network: local random access is required for the
        // synthetic georeferencing step, so download first.
        if is_netcdf && url.starts_with("http") {
            let temp_file = tempfile::Builder::new()
                .prefix("rastac_")
                .suffix(".nc")
                .tempfile()?;
            let temp_path = temp_file.into_temp_path();

            let mut scaled = |percent: u8| {
                progress((percent as u16 * DOWNLOAD_PROGRESS_CEILING as u16 / 100) as u8)
            };
            download::download_with_progress(&url, &temp_path, &mut scaled, cancel)?;

            url = temp_path.to_string_lossy().to_string();
            result.temp_resources.push(temp_path);
        }
        progress(DOWNLOAD_PROGRESS_CEILING);
        cancel.check()?;

        if is_netcdf {
            result.layers = Self::netcdf_layers(
                &url,
                &layer_name,
                selected_variable_names,
                &mut result.errors,
                cancel,
            )?;
            if !result.layers.is_empty() {
                return Ok(result);
            }
            // No subdatasets worth loading; fall through to a direct open.
        }

        let open_url = if !is_netcdf
            && AssetClassifier::is_streamable_tiff(asset)
            && url.starts_with("http")
        {
            format!("/vsicurl/{}", url)
        } else {
            url
        };

        log::info!("Creating layer '{}' from {}", layer_name, open_url);
        match Self::open_layer(&open_url, &layer_name) {
            Ok(layer) => result.layers.push(layer),
            Err(e) => {
                log::warn!("Layer invalid for {}: {}", asset_key, e);
                result.errors.push(format!("{}: {}", asset_key, e));
            }
        }

        Ok(result)
    }

    /// One layer per data variable of a NetCDF file, name-sorted.
    ///
    /// Variables with both a geotransform and an EPSG hint get a synthetic
    /// georeferenced wrapper; the rest open as plain subdatasets. One
    /// variable failing never drops or reorders its siblings.
    fn netcdf_layers(
        url: &str,
        base_name: &str,
        selected_variable_names: Option<&[String]>,
        errors: &mut Vec<String>,
        cancel: &CancelToken,
    ) -> RastacResult<Vec<RasterLayer>> {
        let metadata = NetcdfMetadataExtractor::extract(url);

        let mut data_variables = metadata.data_variables;
        if let Some(selected) = selected_variable_names {
            data_variables.retain(|(_, name)| selected.contains(name));
        }
        data_variables.sort_by(|a, b| a.1.cmp(&b.1));

        if data_variables.is_empty() {
            log::warn!("NetCDF has no loadable data variables: {}", url);
            return Ok(Vec::new());
        }

        log::info!("NetCDF has {} data variables to load", data_variables.len());
        if let (Some(gt), Some(epsg)) = (&metadata.geotransform, &metadata.epsg) {
            log::info!("NetCDF georeferencing: {:?}, EPSG:{}", gt, epsg);
        }

        let mut layers = Vec::new();
        for (subdataset_uri, variable_name) in data_variables {
            cancel.check()?;

            let layer_name = format!("{}_{}", base_name, variable_name);
            let built = match (&metadata.geotransform, &metadata.epsg) {
                (Some(geotransform), Some(epsg)) => {
                    Self::build_georeferenced_vrt(&subdataset_uri, &layer_name, geotransform, epsg)
                        .or_else(|e| {
                            log::warn!(
                                "Georeferencing failed for {}, trying direct open: {}",
                                variable_name,
                                e
                            );
                            Self::open_layer(&subdataset_uri, &layer_name)
                        })
                }
                _ => Self::open_layer(&subdataset_uri, &layer_name),
            };

            match built {
                Ok(mut layer) => {
                    layer.variable = Some(variable_name);
                    layers.push(layer);
                }
                Err(e) => {
                    log::warn!("Failed to load NetCDF variable {}: {}", variable_name, e);
                    errors.push(format!("{}: {}", variable_name, e));
                }
            }
        }

        Ok(layers)
    }

    /// Wrap one subdataset in an in-memory VRT carrying the geotransform
    /// and an EPSG-derived projection, for files without native CF
    /// georeferencing.
    fn build_georeferenced_vrt(
        subdataset_uri: &str,
        layer_name: &str,
        geotransform: &Geotransform,
        epsg: &str,
    ) -> RastacResult<RasterLayer> {
        let source = Dataset::open(subdataset_uri)
            .map_err(|e| RastacError::LayerConstruction(format!("open {}: {}", subdataset_uri, e)))?;

        let code: u32 = epsg
            .parse()
            .map_err(|_| RastacError::LayerConstruction(format!("bad EPSG code '{}'", epsg)))?;
        let srs = SpatialRef::from_epsg(code)
            .map_err(|e| RastacError::LayerConstruction(format!("EPSG:{}: {}", code, e)))?;

        let driver = DriverManager::get_driver_by_name("VRT")?;
        let vrt_path = format!("/vsimem/{}.vrt", layer_name);
        let options: &[RasterCreationOption] = &[];
        let mut vrt = source
            .create_copy(&driver, &vrt_path, options)
            .map_err(|e| RastacError::LayerConstruction(format!("VRT copy: {}", e)))?;

        vrt.set_geo_transform(&geotransform.0)?;
        vrt.set_spatial_ref(&srs)?;
        // Closing the dataset persists the VRT into /vsimem
        drop(vrt);

        log::info!("Created georeferenced layer {} with EPSG:{}", layer_name, code);
        Ok(RasterLayer {
            name: layer_name.to_string(),
            variable: None,
            source: vrt_path,
            crs: None,
        })
    }

    /// Open a source directly and hand back a validated plain layer.
    fn open_layer(source: &str, layer_name: &str) -> RastacResult<RasterLayer> {
        let dataset = Dataset::open(source)
            .map_err(|e| RastacError::LayerConstruction(format!("open {}: {}", source, e)))?;

        if dataset.raster_count() == 0 {
            return Err(RastacError::LayerConstruction(format!(
                "{} has no raster bands",
                source
            )));
        }

        Ok(RasterLayer {
            name: layer_name.to_string(),
            variable: None,
            source: source.to_string(),
            crs: None,
        })
    }
}
