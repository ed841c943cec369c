//! Metadata extraction and network I/O modules

pub mod download;
pub mod kerchunk;
pub mod metadata_xml;
pub mod netcdf;

// Re-export main types
pub use kerchunk::KerchunkDocument;
pub use metadata_xml::{HttpMetadataXmlFetcher, MetadataXmlFetcher};
pub use netcdf::{NetcdfMetadata, NetcdfMetadataExtractor};
