//! Core classification, resolution and materialization modules

pub mod cf;
pub mod classifier;
pub mod crs;
pub mod geotransform;
pub mod materializer;

// Re-export main types
pub use classifier::{AssetClassifier, Classification};
pub use crs::CrsResolver;
pub use geotransform::GeotransformCalculator;
pub use materializer::LayerMaterializer;
