//! Loadability and file-type rules for STAC assets.

use crate::types::{Asset, FileType, Item};

/// MIME types that can be materialized as raster layers.
///
/// Matching is substring-based in both directions: a provider may report
/// either a more specific or a truncated variant of these strings.
pub const LOADABLE_MEDIA_TYPES: [&str; 7] = [
    "image/tiff; application=geotiff; profile=cloud-optimized",
    "image/tiff; application=geotiff",
    "application/x-netcdf",
    "application/netcdf",
    "image/tiff",
    "image/png",
    "image/jpeg",
];

/// File extensions that can be materialized as raster layers.
pub const LOADABLE_EXTENSIONS: [&str; 6] = [".tif", ".tiff", ".nc", ".png", ".jpg", ".jpeg"];

/// NetCDF MIME types (also used to pick the download-first branch).
pub const NETCDF_MEDIA_TYPES: [&str; 2] = ["application/x-netcdf", "application/netcdf"];

/// COG/GeoTIFF MIME types eligible for /vsicurl/ streaming.
pub const COG_MEDIA_TYPES: [&str; 3] = [
    "image/tiff; application=geotiff; profile=cloud-optimized",
    "image/tiff; application=geotiff",
    "image/tiff",
];

/// Asset keys that usually hold data when no media type is declared.
pub const PROBABLE_DATA_KEYS: [&str; 4] = ["quicklook", "data", "visual", "image"];

const THUMBNAIL_ROLE: &str = "thumbnail";

/// Result of classifying one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_loadable: bool,
    pub file_type: FileType,
}

/// Pure loadability/file-type rules over asset metadata. No I/O.
pub struct AssetClassifier;

impl AssetClassifier {
    /// Classify an asset: can it become a raster layer, and what is it?
    ///
    /// `asset_key` is the key under which the asset appears in its item;
    /// it participates in thumbnail rejection and the probable-data-key
    /// fallback.
    pub fn classify(asset: &Asset, asset_key: Option<&str>) -> Classification {
        Classification {
            is_loadable: Self::is_loadable(asset, asset_key),
            file_type: Self::file_type(asset),
        }
    }

    fn is_loadable(asset: &Asset, asset_key: Option<&str>) -> bool {
        if asset.href.is_empty() {
            return false;
        }

        // Thumbnails are never loadable, whatever their media type says.
        if asset.roles.contains(THUMBNAIL_ROLE) || asset_key == Some(THUMBNAIL_ROLE) {
            return false;
        }

        if let Some(media_type) = &asset.media_type {
            for lt in LOADABLE_MEDIA_TYPES {
                if media_type.contains(lt) || lt.contains(media_type.as_str()) {
                    return true;
                }
            }
        }

        let href = asset.href.to_lowercase();
        for ext in LOADABLE_EXTENSIONS {
            if href.ends_with(ext) {
                return true;
            }
        }

        // Untyped assets under well-known keys are worth trying anyway.
        if asset.media_type.is_none() {
            if let Some(key) = asset_key {
                if PROBABLE_DATA_KEYS.contains(&key) {
                    return true;
                }
            }
        }

        false
    }

    /// Determine the display file type from media type, then extension.
    pub fn file_type(asset: &Asset) -> FileType {
        if let Some(media_type) = &asset.media_type {
            let lowered = media_type.to_lowercase();
            if lowered.contains("geotiff") || media_type == "image/tiff" {
                if lowered.contains("cloud-optimized") {
                    return FileType::Cog;
                }
                return FileType::GeoTiff;
            }
            if lowered.contains("netcdf") {
                return FileType::NetCdf;
            }
            if media_type == "image/png" {
                return FileType::Png;
            }
            if media_type == "image/jpeg" || media_type == "image/jpg" {
                return FileType::Jpeg;
            }
            if lowered.contains("xml") {
                return FileType::Xml;
            }
            if lowered.contains("json") {
                return FileType::Json;
            }
            if lowered.contains("text") {
                return FileType::Text;
            }
        }

        let href = asset.href.to_lowercase();
        if !href.is_empty() {
            if href.ends_with(".tif") || href.ends_with(".tiff") {
                return FileType::GeoTiff;
            }
            if href.ends_with(".nc") {
                return FileType::NetCdf;
            }
            if href.ends_with(".png") {
                return FileType::Png;
            }
            if href.ends_with(".jpg") || href.ends_with(".jpeg") {
                return FileType::Jpeg;
            }
            if href.ends_with(".xml") {
                return FileType::Xml;
            }
            if href.ends_with(".json") {
                return FileType::Json;
            }

            // Unknown type: surface the raw extension, query string stripped
            if let Some((_, ext)) = asset.href.rsplit_once('.') {
                let ext = ext.split('?').next().unwrap_or("");
                if !ext.is_empty() {
                    return FileType::Extension(ext.to_uppercase());
                }
            }
        }

        FileType::Unknown
    }

    /// All loadable assets of an item, in asset-map order.
    pub fn loadable_assets(item: &Item) -> Vec<(&str, &Asset)> {
        item.assets
            .iter()
            .filter(|(key, asset)| Self::classify(asset, Some(key)).is_loadable)
            .map(|(key, asset)| (key.as_str(), asset))
            .collect()
    }

    /// True when the asset is NetCDF-backed (media type or .nc extension).
    pub fn is_netcdf(asset: &Asset) -> bool {
        let media_type = asset.media_type.as_deref().unwrap_or("");
        NETCDF_MEDIA_TYPES
            .iter()
            .any(|nc| media_type.contains(nc))
            || asset.href.ends_with(".nc")
    }

    /// True when the asset should stream via /vsicurl/ instead of being
    /// downloaded (remote COG/GeoTIFF).
    pub fn is_streamable_tiff(asset: &Asset) -> bool {
        let media_type = asset.media_type.as_deref().unwrap_or("");
        COG_MEDIA_TYPES.iter().any(|cog| media_type.contains(cog))
            || asset.href.ends_with(".tif")
            || asset.href.ends_with(".tiff")
    }
}

/// Format a bounding box with direction labels, "N/A" when absent.
pub fn format_bbox(bbox: Option<&[f64; 4]>) -> String {
    match bbox {
        Some([west, south, east, north]) => {
            format!("W: {:.2}, S: {:.2}, E: {:.2}, N: {:.2}", west, south, east, north)
        }
        None => "N/A".to_string(),
    }
}

/// Summarize an item's assets as "key (type, epsg)" entries.
pub fn describe_assets(item: &Item) -> String {
    if item.assets.is_empty() {
        return "N/A".to_string();
    }

    let parts: Vec<String> = item
        .assets
        .iter()
        .map(|(key, asset)| {
            let file_type = AssetClassifier::file_type(asset);
            match crate::core::crs::extract_epsg_from_asset(asset) {
                Some(epsg) => format!("{} ({}, {})", key, file_type, epsg),
                None => format!("{} ({})", key, file_type),
            }
        })
        .collect();

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_key_is_never_loadable() {
        let asset = Asset::new("thumbnail", "https://example.com/thumb.png")
            .with_media_type("image/png");
        let c = AssetClassifier::classify(&asset, Some("thumbnail"));
        assert!(!c.is_loadable);
    }

    #[test]
    fn thumbnail_role_is_never_loadable() {
        let asset = Asset::new("preview", "https://example.com/thumb.tif")
            .with_media_type("image/tiff")
            .with_role("thumbnail");
        assert!(!AssetClassifier::classify(&asset, Some("preview")).is_loadable);
    }

    #[test]
    fn missing_href_is_never_loadable() {
        let asset = Asset::new("data", "").with_media_type("image/tiff");
        assert!(!AssetClassifier::classify(&asset, Some("data")).is_loadable);
    }

    #[test]
    fn probable_data_key_requires_absent_media_type() {
        let untyped = Asset::new("quicklook", "https://example.com/quicklook");
        assert!(AssetClassifier::classify(&untyped, Some("quicklook")).is_loadable);

        let typed = Asset::new("quicklook", "https://example.com/quicklook")
            .with_media_type("application/pdf");
        assert!(!AssetClassifier::classify(&typed, Some("quicklook")).is_loadable);
    }

    #[test]
    fn cog_media_type_maps_to_cog_file_type() {
        let asset = Asset::new("data", "https://example.com/scene.tif")
            .with_media_type("image/tiff; application=geotiff; profile=cloud-optimized");
        assert_eq!(AssetClassifier::file_type(&asset), FileType::Cog);
    }

    #[test]
    fn unknown_extension_is_uppercased_with_query_stripped() {
        let asset = Asset::new("data", "https://example.com/file.hdf?token=abc");
        assert_eq!(
            AssetClassifier::file_type(&asset),
            FileType::Extension("HDF".to_string())
        );
        assert_eq!(AssetClassifier::file_type(&asset).to_string(), ".HDF");
    }

    #[test]
    fn bbox_formatting() {
        assert_eq!(
            format_bbox(Some(&[-180.0, -90.0, 180.0, 90.0])),
            "W: -180.00, S: -90.00, E: 180.00, N: 90.00"
        );
        assert_eq!(format_bbox(None), "N/A");
    }
}
