//! Kerchunk reference document parsing.
//!
//! A kerchunk document maps zarr-style chunk keys to inline payloads or
//! byte ranges inside a remote file. Parsing one recovers the variable
//! schema and coordinate-system hints of a CF-convention NetCDF store
//! without downloading it. The only I/O in this module is the lazy fetch
//! of 1-D coordinate payloads for geotransform computation.

use crate::core::cf;
use crate::core::geotransform::GeotransformCalculator;
use crate::io::download::{self, METADATA_FETCH_TIMEOUT};
use crate::types::{Geotransform, Item, RastacResult, VariableDescriptor};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::Value;

/// Zarr array metadata parsed from a "{name}/.zarray" entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ZarrayMeta {
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub chunks: Option<Vec<usize>>,
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default)]
    pub compressor: Option<Value>,
    #[serde(default)]
    pub filters: Option<Value>,
}

/// Whether a variable is a coordinate (axis/CRS machinery) or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Coordinate,
    Data,
}

/// A parsed kerchunk reference document.
pub struct KerchunkDocument {
    refs: serde_json::Map<String, Value>,
}

impl KerchunkDocument {
    /// Recognize a parsed JSON value as a kerchunk document.
    ///
    /// Absence of the "refs" mapping means "not a reference document",
    /// which callers treat as "no kerchunk found", not as an error.
    pub fn from_value(value: Value) -> Option<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            _ => return None,
        };
        match object.remove("refs") {
            Some(Value::Object(refs)) => Some(KerchunkDocument { refs }),
            _ => None,
        }
    }

    /// Parse a JSON string, returning None unless it is a kerchunk document.
    pub fn parse_str(text: &str) -> Option<Self> {
        serde_json::from_str::<Value>(text).ok().and_then(Self::from_value)
    }

    /// Load a document from an http(s) URL or a local path.
    ///
    /// Ok(None) means the source parsed but is not a kerchunk document.
    pub fn fetch(href: &str) -> RastacResult<Option<Self>> {
        let text = if href.starts_with("http://") || href.starts_with("https://") {
            download::fetch_text(href, METADATA_FETCH_TIMEOUT)?
        } else {
            std::fs::read_to_string(href)?
        };
        Ok(Self::parse_str(&text))
    }

    /// All variable names present in the document, ascending.
    ///
    /// A variable exists wherever a "{name}/.zarray" key does.
    pub fn enumerate_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .refs
            .keys()
            .filter_map(|key| key.strip_suffix("/.zarray"))
            .map(|name| name.to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Classify a variable from its attributes and array metadata.
    ///
    /// Scalar (0-dimensional) entries are grid-mapping/CRS machinery; a
    /// coordinate-flavored standard_name or any "axis" attribute also
    /// marks a coordinate.
    pub fn classify(zattrs: &serde_json::Map<String, Value>, zarray: &ZarrayMeta) -> VariableKind {
        if zarray.shape.is_empty() {
            return VariableKind::Coordinate;
        }

        if let Some(standard_name) = zattrs.get("standard_name").and_then(Value::as_str) {
            if cf::is_coordinate_standard_name(standard_name) {
                return VariableKind::Coordinate;
            }
        }

        if zattrs.contains_key("axis") {
            return VariableKind::Coordinate;
        }

        VariableKind::Data
    }

    /// Data-variable descriptors, ascending by name.
    ///
    /// Bounds variables are excluded outright; a variable whose .zarray or
    /// .zattrs sub-document fails to parse is skipped, never aborting the
    /// whole extraction.
    pub fn extract_variables(&self) -> Vec<VariableDescriptor> {
        let mut variables = Vec::new();

        for name in self.enumerate_variables() {
            if cf::is_bounds_name(&name) {
                continue;
            }

            let zarray = match self.zarray(&name) {
                Some(zarray) => zarray,
                None => continue,
            };
            let zattrs = self.zattrs(&name).unwrap_or_default();

            if Self::classify(&zattrs, &zarray) == VariableKind::Coordinate {
                continue;
            }

            let dimension_names = zattrs
                .get("_ARRAY_DIMENSIONS")
                .and_then(Value::as_array)
                .map(|dims| {
                    dims.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            variables.push(VariableDescriptor {
                name,
                long_name: string_attr(&zattrs, "long_name"),
                standard_name: string_attr(&zattrs, "standard_name"),
                units: string_attr(&zattrs, "units"),
                shape: zarray.shape,
                dimension_names,
            });
        }

        variables
    }

    /// EPSG code from the first grid-mapping variable that carries one.
    ///
    /// Probes the fixed grid-mapping name list in order, then the fixed
    /// EPSG attribute key list; the first hit is returned stringified.
    pub fn extract_epsg(&self) -> Option<String> {
        for gm_name in cf::GRID_MAPPING_NAMES {
            let zattrs = match self.zattrs(gm_name) {
                Some(zattrs) => zattrs,
                None => continue,
            };
            for attr_name in cf::EPSG_ATTRIBUTE_NAMES {
                if let Some(value) = zattrs.get(attr_name) {
                    return Some(stringify_epsg(value));
                }
            }
        }
        None
    }

    /// Compute a geotransform from the document's x/y coordinate arrays.
    ///
    /// The coordinate payloads are fetched lazily (inline entries decoded
    /// in place, remote entries via ranged HTTP reads); any failure is
    /// "no geotransform available", never an error.
    pub fn extract_geotransform(&self) -> Option<Geotransform> {
        let x_coords = self.read_coordinate_array(&cf::X_COORDINATE_NAMES)?;
        let y_coords = self.read_coordinate_array(&cf::Y_COORDINATE_NAMES)?;
        GeotransformCalculator::compute(&x_coords, &y_coords)
    }

    /// Read the first 1-D coordinate array matching one of `candidates`.
    fn read_coordinate_array(&self, candidates: &[&str]) -> Option<Vec<f64>> {
        for name in candidates {
            let zarray = match self.zarray(name) {
                Some(zarray) => zarray,
                None => continue,
            };
            if zarray.shape.len() != 1 {
                continue;
            }
            match self.read_1d_array(name, &zarray) {
                Some(values) => return Some(values),
                None => {
                    log::warn!("Could not read coordinate payload for '{}'", name);
                    continue;
                }
            }
        }
        None
    }

    /// Assemble a 1-D array from its chunk payloads, in chunk-index order.
    ///
    /// Compressed or filtered coordinate arrays are out of scope; reading
    /// them would mean pulling in a codec stack for what is a hint.
    fn read_1d_array(&self, name: &str, zarray: &ZarrayMeta) -> Option<Vec<f64>> {
        if zarray.compressor.as_ref().map_or(false, |c| !c.is_null()) {
            return None;
        }
        if zarray.filters.as_ref().map_or(false, |f| !f.is_null()) {
            return None;
        }

        let len = zarray.shape[0];
        let dtype = zarray.dtype.as_deref()?;
        let chunk_len = zarray
            .chunks
            .as_ref()
            .and_then(|chunks| chunks.first().copied())
            .unwrap_or(len);
        if chunk_len == 0 {
            return None;
        }
        let chunk_count = (len + chunk_len - 1) / chunk_len;

        let mut values = Vec::with_capacity(len);
        for index in 0..chunk_count {
            let payload = self.chunk_payload(&format!("{}/{}", name, index))?;
            values.extend(decode_numeric(&payload, dtype)?);
        }
        values.truncate(len);
        if values.len() == len {
            Some(values)
        } else {
            None
        }
    }

    /// Resolve one chunk key to raw bytes.
    ///
    /// Inline string entries hold the bytes directly (optionally base64
    /// encoded); array entries are [url] or [url, offset, length] and are
    /// fetched over HTTP, ranged when offset/length are present.
    fn chunk_payload(&self, key: &str) -> Option<Vec<u8>> {
        match self.refs.get(key)? {
            Value::String(inline) => Some(decode_inline(inline)),
            Value::Array(parts) => {
                let url = parts.first()?.as_str()?;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return None;
                }
                let range = match (parts.get(1), parts.get(2)) {
                    (Some(offset), Some(length)) => {
                        Some((offset.as_u64()?, length.as_u64()?))
                    }
                    _ => None,
                };
                download::fetch_bytes(url, range, METADATA_FETCH_TIMEOUT).ok()
            }
            _ => None,
        }
    }

    /// Parsed "{name}/.zarray" entry; None when absent or malformed.
    fn zarray(&self, name: &str) -> Option<ZarrayMeta> {
        let raw = self.refs.get(&format!("{}/.zarray", name))?.as_str()?;
        serde_json::from_str(raw).ok()
    }

    /// Parsed "{name}/.zattrs" entry; None when absent or malformed.
    fn zattrs(&self, name: &str) -> Option<serde_json::Map<String, Value>> {
        let raw = self.refs.get(&format!("{}/.zattrs", name))?.as_str()?;
        serde_json::from_str(raw).ok()
    }
}

/// Scan an item's JSON assets for the first valid kerchunk document.
///
/// Returns the asset href alongside the parsed document. Fetch failures on
/// one asset fall through to the next.
pub fn find_reference(item: &Item) -> Option<(String, KerchunkDocument)> {
    for asset in item.assets.values() {
        if asset.href.is_empty() {
            continue;
        }
        let media_type = asset.media_type.as_deref().unwrap_or("");
        let is_json = asset.href.to_lowercase().ends_with(".json")
            || media_type.to_lowercase().contains("json");
        if !is_json {
            continue;
        }

        match KerchunkDocument::fetch(&asset.href) {
            Ok(Some(document)) => return Some((asset.href.clone(), document)),
            Ok(None) => continue,
            Err(e) => {
                log::warn!("Kerchunk fetch failed for {}: {}", asset.href, e);
                continue;
            }
        }
    }
    None
}

fn string_attr(zattrs: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    zattrs.get(key).and_then(Value::as_str).map(str::to_string)
}

/// EPSG attribute values appear as numbers or strings; both stringify.
fn stringify_epsg(value: &Value) -> String {
    let raw = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    };
    cf::normalize_epsg(&raw)
}

/// Decode an inline chunk payload string to raw bytes.
///
/// Kerchunk stores inline binary as latin-1-mapped text, or base64 behind
/// a "base64:" prefix.
fn decode_inline(inline: &str) -> Vec<u8> {
    if let Some(encoded) = inline.strip_prefix("base64:") {
        BASE64.decode(encoded).unwrap_or_default()
    } else {
        inline.chars().map(|c| c as u32 as u8).collect()
    }
}

/// Decode packed numeric bytes per a zarr dtype string (e.g. "<f8").
fn decode_numeric(bytes: &[u8], dtype: &str) -> Option<Vec<f64>> {
    let (endian, kind, width) = parse_dtype(dtype)?;
    if width == 0 || bytes.len() % width != 0 {
        return None;
    }

    let mut values = Vec::with_capacity(bytes.len() / width);
    for raw in bytes.chunks_exact(width) {
        values.push(decode_one(raw, endian, kind)?);
    }
    Some(values)
}

#[derive(Clone, Copy, PartialEq)]
enum Endian {
    Little,
    Big,
}

#[derive(Clone, Copy, PartialEq)]
enum NumKind {
    Float,
    Int,
    Uint,
}

fn parse_dtype(dtype: &str) -> Option<(Endian, NumKind, usize)> {
    let mut chars = dtype.chars();
    let endian = match chars.next()? {
        '<' | '|' => Endian::Little,
        '>' => Endian::Big,
        _ => return None,
    };
    let kind = match chars.next()? {
        'f' => NumKind::Float,
        'i' => NumKind::Int,
        'u' => NumKind::Uint,
        _ => return None,
    };
    let width: usize = chars.as_str().parse().ok()?;
    Some((endian, kind, width))
}

fn decode_one(raw: &[u8], endian: Endian, kind: NumKind) -> Option<f64> {
    macro_rules! read {
        ($ty:ty) => {{
            let array = raw.try_into().ok()?;
            if endian == Endian::Little {
                <$ty>::from_le_bytes(array) as f64
            } else {
                <$ty>::from_be_bytes(array) as f64
            }
        }};
    }

    Some(match (kind, raw.len()) {
        (NumKind::Float, 4) => read!(f32),
        (NumKind::Float, 8) => read!(f64),
        (NumKind::Int, 1) => read!(i8),
        (NumKind::Int, 2) => read!(i16),
        (NumKind::Int, 4) => read!(i32),
        (NumKind::Int, 8) => read!(i64),
        (NumKind::Uint, 1) => read!(u8),
        (NumKind::Uint, 2) => read!(u16),
        (NumKind::Uint, 4) => read!(u32),
        (NumKind::Uint, 8) => read!(u64),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_kerchunk_json_is_not_a_document() {
        assert!(KerchunkDocument::parse_str(r#"{"version": 1}"#).is_none());
        assert!(KerchunkDocument::parse_str("[1, 2, 3]").is_none());
        assert!(KerchunkDocument::parse_str("not json").is_none());
    }

    #[test]
    fn dtype_parsing_covers_endianness_and_width() {
        assert!(parse_dtype("<f8").is_some());
        assert!(parse_dtype(">f4").is_some());
        assert!(parse_dtype("|u1").is_some());
        assert!(parse_dtype("<M8[ns]").is_none());
        assert!(parse_dtype("").is_none());
    }

    #[test]
    fn inline_base64_payload_decodes() {
        let encoded = format!("base64:{}", BASE64.encode(1.5f64.to_le_bytes()));
        let decoded = decode_inline(&encoded);
        assert_eq!(decode_numeric(&decoded, "<f8"), Some(vec![1.5]));
    }
}
