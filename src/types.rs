use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tempfile::TempPath;

/// A single STAC asset: one retrievable file referenced by an item.
///
/// Provider-specific representations are normalized into this struct once,
/// at the catalog boundary. An empty `href` means the asset carries no
/// retrievable location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    pub key: String,
    pub href: String,
    pub media_type: Option<String>,
    pub roles: BTreeSet<String>,
    /// Extra provider fields (e.g. "proj:epsg") kept as raw JSON values.
    pub extra_fields: BTreeMap<String, serde_json::Value>,
}

impl Asset {
    pub fn new(key: impl Into<String>, href: impl Into<String>) -> Self {
        Asset {
            key: key.into(),
            href: href.into(),
            ..Default::default()
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }
}

/// A STAC item: catalog metadata for one acquisition, owning its assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub collection: Option<String>,
    pub datetime: Option<DateTime<Utc>>,
    pub bbox: Option<[f64; 4]>,
    pub geometry: Option<serde_json::Value>,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub assets: BTreeMap<String, Asset>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Item {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// A data variable described by either metadata path (kerchunk reference
/// document or native NetCDF store). Never a coordinate or bounds variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub long_name: Option<String>,
    pub standard_name: Option<String>,
    pub units: Option<String>,
    pub shape: Vec<usize>,
    pub dimension_names: Vec<String>,
}

impl VariableDescriptor {
    /// Selection-dialog label, e.g.
    /// "sea_ice_thickness - Sea ice thickness (m) [1, 2240, 1520]".
    pub fn display(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if let Some(long_name) = &self.long_name {
            parts.push(format!("- {}", long_name));
        }
        if let Some(units) = &self.units {
            parts.push(format!("({})", units));
        }
        let shape = self
            .shape
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("[{}]", shape));
        parts.join(" ")
    }
}

/// North-up affine geotransform:
/// (origin_x, pixel_width, 0, origin_y, 0, pixel_height).
///
/// Skew terms are always zero and pixel_height is always <= 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geotransform(pub [f64; 6]);

impl Geotransform {
    pub fn origin_x(&self) -> f64 {
        self.0[0]
    }

    pub fn pixel_width(&self) -> f64 {
        self.0[1]
    }

    pub fn origin_y(&self) -> f64 {
        self.0[3]
    }

    pub fn pixel_height(&self) -> f64 {
        self.0[5]
    }
}

/// Which source in the resolution chain produced a CRS decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrsSource {
    Layer,
    Asset,
    Item,
    MetadataXml,
    NetcdfGridMapping,
}

/// A CRS decision for one layer. The source is retained so the resolution
/// order stays observable in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCrs {
    pub epsg_code: String,
    pub source: CrsSource,
}

impl ResolvedCrs {
    pub fn authid(&self) -> String {
        format!("EPSG:{}", self.epsg_code)
    }
}

/// Display file type of an asset, derived from media type or extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileType {
    Cog,
    GeoTiff,
    NetCdf,
    Png,
    Jpeg,
    Xml,
    Json,
    Text,
    /// Unrecognized extension, uppercased (e.g. ".HDF").
    Extension(String),
    Unknown,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Cog => write!(f, "COG"),
            FileType::GeoTiff => write!(f, "GeoTIFF"),
            FileType::NetCdf => write!(f, "NetCDF"),
            FileType::Png => write!(f, "PNG"),
            FileType::Jpeg => write!(f, "JPEG"),
            FileType::Xml => write!(f, "XML"),
            FileType::Json => write!(f, "JSON"),
            FileType::Text => write!(f, "Text"),
            FileType::Extension(ext) => write!(f, ".{}", ext),
            FileType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One materialized raster layer. A plain-data handle: `source` is a
/// GDAL-openable URI (file path, subdataset URI, /vsimem/ VRT or /vsicurl/
/// prefixed URL) that consumers re-open on demand, so handles cross thread
/// boundaries without cloning driver objects.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    pub name: String,
    /// NetCDF variable this layer was built from, if any.
    pub variable: Option<String>,
    pub source: String,
    pub crs: Option<ResolvedCrs>,
}

/// A request to materialize one asset of one item.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub item: Item,
    pub asset_key: String,
    /// NetCDF only: restrict to these variables. None loads all data
    /// variables.
    pub selected_variable_names: Option<Vec<String>>,
}

/// The outcome of materializing one asset: layers in stable variable order
/// plus per-variable warnings. Temporary downloads are owned here; dropping
/// the result deletes them.
#[derive(Debug, Default)]
pub struct LoadResult {
    pub layers: Vec<RasterLayer>,
    pub errors: Vec<String>,
    pub temp_resources: Vec<TempPath>,
}

/// Cooperative cancellation flag shared between a task and its handle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Err(TaskCancelled) once the flag is set; checked between phases.
    pub fn check(&self) -> RastacResult<()> {
        if self.is_cancelled() {
            Err(RastacError::TaskCancelled)
        } else {
            Ok(())
        }
    }
}

/// Error types for asset loading
#[derive(Debug, thiserror::Error)]
pub enum RastacError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("Layer construction failed: {0}")]
    LayerConstruction(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("A task for this item/asset pair is already running: {0}")]
    DuplicateTask(String),

    #[error("Task cancelled")]
    TaskCancelled,
}

/// Result type for asset loading operations
pub type RastacResult<T> = Result<T, RastacError>;
