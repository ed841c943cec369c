//! CRS resolution for materialized layers.
//!
//! A layer's CRS can come from five places, probed in a strict order that
//! keeps network access last: the layer itself, asset-level projection
//! fields, item-level properties, a fetched ISO 19115 metadata XML, and
//! finally the NetCDF grid-mapping variable. The chain is an ordered list
//! of resolver stages combined first-success-wins, so the
//! no-unnecessary-network-call invariant is testable per stage.

use crate::io::metadata_xml::{self, MetadataXmlFetcher};
use crate::io::netcdf::NetcdfMetadataExtractor;
use crate::types::{Asset, CrsSource, Item, ResolvedCrs};
use gdal::spatial_ref::SpatialRef;
use gdal::Dataset;
use serde_json::Value;

/// Keys that may carry projection info on assets and items.
pub const PROJECTION_KEYS: [&str; 4] = ["proj:epsg", "proj:code", "epsg", "crs"];

/// Ordered, short-circuiting CRS resolution.
pub struct CrsResolver;

impl CrsResolver {
    /// Resolve a CRS for one layer.
    ///
    /// `layer_current_crs` is the layer's own authority id ("EPSG:3413")
    /// when it already carries one; `item_epsg_hint` is the pre-extracted
    /// item-level code so repeated layers of one asset don't re-probe the
    /// item. The metadata-XML fetcher is only invoked when the first three
    /// stages fail; `netcdf_source` gates the grid-mapping stage to
    /// NetCDF-backed layers.
    pub fn resolve(
        layer_current_crs: Option<&str>,
        asset: &Asset,
        item_epsg_hint: Option<&str>,
        item: Option<&Item>,
        metadata_xml_fetcher: &dyn MetadataXmlFetcher,
        netcdf_source: Option<&str>,
    ) -> Option<ResolvedCrs> {
        let stages: [&dyn Fn() -> Option<ResolvedCrs>; 5] = [
            &|| Self::from_layer(layer_current_crs),
            &|| Self::from_asset(asset),
            &|| Self::from_item_hint(item_epsg_hint),
            &|| Self::from_metadata_xml(item, metadata_xml_fetcher),
            &|| Self::from_netcdf(netcdf_source),
        ];

        stages.iter().find_map(|stage| stage())
    }

    /// Stage 1: the layer already has a valid authority-identified CRS.
    fn from_layer(layer_current_crs: Option<&str>) -> Option<ResolvedCrs> {
        let authid = layer_current_crs?;
        let code = authid.rsplit(':').next()?;
        Self::validate(code, CrsSource::Layer)
    }

    /// Stage 2: projection-extension fields on the asset.
    fn from_asset(asset: &Asset) -> Option<ResolvedCrs> {
        let code = extract_epsg_from_asset(asset)?;
        Self::validate(&code, CrsSource::Asset)
    }

    /// Stage 3: the parent item's properties.
    fn from_item_hint(item_epsg_hint: Option<&str>) -> Option<ResolvedCrs> {
        Self::validate(item_epsg_hint?, CrsSource::Item)
    }

    /// Stage 4: fetched metadata XML. Only reached when 1-3 failed.
    fn from_metadata_xml(
        item: Option<&Item>,
        fetcher: &dyn MetadataXmlFetcher,
    ) -> Option<ResolvedCrs> {
        let code = metadata_xml::extract_epsg_from_metadata_xml(item?, fetcher)?;
        Self::validate(&code, CrsSource::MetadataXml)
    }

    /// Stage 5: NetCDF grid-mapping variable, NetCDF-backed sources only.
    fn from_netcdf(netcdf_source: Option<&str>) -> Option<ResolvedCrs> {
        let source = netcdf_source?;
        if !source.ends_with(".nc") && !source.contains("NETCDF:") {
            return None;
        }
        let code = NetcdfMetadataExtractor::extract_epsg(source)?;
        Self::validate(&code, CrsSource::NetcdfGridMapping)
    }

    /// A candidate only survives if GDAL can construct the authority CRS.
    /// Invalid candidates fall through to the next stage, never raise.
    fn validate(code: &str, source: CrsSource) -> Option<ResolvedCrs> {
        let numeric: u32 = code.trim().parse().ok()?;
        match SpatialRef::from_epsg(numeric) {
            Ok(_) => Some(ResolvedCrs {
                epsg_code: numeric.to_string(),
                source,
            }),
            Err(e) => {
                log::debug!("Rejected CRS candidate EPSG:{}: {}", code, e);
                None
            }
        }
    }
}

/// EPSG code from an asset's projection-extension/extra fields.
///
/// "AUTHORITY:CODE" strings reduce to the code segment.
pub fn extract_epsg_from_asset(asset: &Asset) -> Option<String> {
    probe_projection_keys(|key| asset.extra_fields.get(key))
}

/// EPSG code from an item's properties, same key set as assets.
pub fn extract_epsg_from_item(item: &Item) -> Option<String> {
    probe_projection_keys(|key| item.properties.get(key))
}

fn probe_projection_keys<'a>(get: impl Fn(&str) -> Option<&'a Value>) -> Option<String> {
    for key in PROJECTION_KEYS {
        if let Some(code) = get(key).and_then(epsg_from_value) {
            return Some(code);
        }
    }
    None
}

fn epsg_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => {
            match text.rsplit_once(':') {
                Some((_, code)) => Some(code.to_string()),
                None => Some(text.clone()),
            }
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// The authority id of a layer's own CRS ("EPSG:3413"), read by opening
/// its source. None when the source has no SRS or no authority identity.
pub fn layer_authority(source: &str) -> Option<String> {
    let dataset = Dataset::open(source).ok()?;
    let srs = dataset.spatial_ref().ok()?;
    let name = srs.auth_name().ok()?;
    let code = srs.auth_code().ok()?;
    Some(format!("{}:{}", name, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn authority_code_strings_reduce_to_code() {
        assert_eq!(epsg_from_value(&json!("EPSG:4326")), Some("4326".to_string()));
        assert_eq!(epsg_from_value(&json!("4326")), Some("4326".to_string()));
        assert_eq!(epsg_from_value(&json!(3413)), Some("3413".to_string()));
        assert_eq!(epsg_from_value(&json!(null)), None);
        assert_eq!(epsg_from_value(&json!("")), None);
    }

    #[test]
    fn asset_keys_probe_in_fixed_order() {
        let mut asset = Asset::new("data", "https://example.com/a.tif");
        asset
            .extra_fields
            .insert("epsg".to_string(), json!(32630));
        asset
            .extra_fields
            .insert("proj:epsg".to_string(), json!(4326));
        // proj:epsg outranks epsg whatever the map order says
        assert_eq!(extract_epsg_from_asset(&asset), Some("4326".to_string()));
    }
}
