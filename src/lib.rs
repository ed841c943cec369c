//! rastac: A Fast, Modular STAC Raster Asset Loader
//!
//! This library turns STAC catalog metadata into georeferenced raster
//! layers while downloading as little as possible: kerchunk reference
//! documents recover NetCDF schemas without touching the data file, remote
//! COGs stream through ranged reads, and the CRS resolution chain only
//! goes to the network when every local source has failed.

pub mod config;
pub mod core;
pub mod io;
pub mod task;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    Asset, CancelToken, CrsSource, FileType, Geotransform, Item, LoadRequest, LoadResult,
    RastacError, RastacResult, RasterLayer, ResolvedCrs, VariableDescriptor,
};

pub use config::VsicurlConfigScope;
pub use crate::core::{
    AssetClassifier, Classification, CrsResolver, GeotransformCalculator, LayerMaterializer,
};
pub use io::{HttpMetadataXmlFetcher, KerchunkDocument, MetadataXmlFetcher, NetcdfMetadataExtractor};
pub use task::{TaskHandle, TaskOutcome, TaskRunner, TaskState};
