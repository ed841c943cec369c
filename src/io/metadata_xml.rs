//! EPSG extraction from ISO 19115 metadata XML.
//!
//! Items sometimes ship a "metadata"-keyed XML asset whose
//! referenceSystemInfo block names the CRS. The fetch capability is
//! injected so the resolver's no-unnecessary-network-call invariant stays
//! observable in tests; parsing is namespace-prefix-agnostic because
//! providers disagree on prefixes and root elements.

use crate::io::download::{self, METADATA_FETCH_TIMEOUT};
use crate::types::{Item, RastacResult};
use quick_xml::events::Event;
use quick_xml::Reader;

/// URL -> XML text capability consumed by the CRS resolver.
pub trait MetadataXmlFetcher: Send + Sync {
    fn fetch_xml(&self, url: &str) -> RastacResult<String>;
}

/// Default fetcher: HTTP GET with the bounded metadata timeout.
pub struct HttpMetadataXmlFetcher;

impl MetadataXmlFetcher for HttpMetadataXmlFetcher {
    fn fetch_xml(&self, url: &str) -> RastacResult<String> {
        download::fetch_text(url, METADATA_FETCH_TIMEOUT)
    }
}

/// Fetch and parse an item's metadata XML asset, if it has one.
///
/// The asset must be keyed "metadata" with an ".xml" href; anything else
/// (or any fetch/parse failure) is "no EPSG available", never an error.
pub fn extract_epsg_from_metadata_xml(
    item: &Item,
    fetcher: &dyn MetadataXmlFetcher,
) -> Option<String> {
    let metadata_asset = item.assets.get("metadata")?;
    let href = &metadata_asset.href;
    if href.is_empty() || !href.ends_with(".xml") {
        log::debug!("Metadata asset href not usable for {}: {:?}", item.id, href);
        return None;
    }

    log::info!("Fetching metadata XML: {}", href);
    let xml = match fetcher.fetch_xml(href) {
        Ok(xml) => xml,
        Err(e) => {
            log::warn!("Metadata XML fetch failed for {}: {}", item.id, e);
            return None;
        }
    };

    parse_reference_system_epsg(&xml)
}

/// One RS_Identifier block: code plus optional codeSpace.
#[derive(Debug, Default, Clone)]
struct ReferenceSystemIdentifier {
    code: Option<String>,
    code_space: Option<String>,
}

/// Scan referenceSystemInfo/RS_Identifier blocks for an EPSG code.
///
/// The first identifier tagged codeSpace "EPSG" wins; an untagged but
/// purely numeric code is accepted from the same position in document
/// order. Element names are matched on their local part.
pub fn parse_reference_system_epsg(xml: &str) -> Option<String> {
    let identifiers = collect_identifiers(xml)?;

    for ident in identifiers {
        let code = match ident.code {
            Some(code) => code.trim().to_string(),
            None => continue,
        };
        if code.is_empty() {
            continue;
        }
        log::debug!(
            "Found reference system code {} (codeSpace {:?})",
            code,
            ident.code_space
        );
        if ident.code_space.as_deref() == Some("EPSG") {
            return Some(code);
        }
        if code.chars().all(|c| c.is_ascii_digit()) {
            return Some(code);
        }
    }

    None
}

fn collect_identifiers(xml: &str) -> Option<Vec<ReferenceSystemIdentifier>> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut identifiers: Vec<ReferenceSystemIdentifier> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let local = String::from_utf8_lossy(element.local_name().as_ref()).to_string();
                if local == "RS_Identifier" {
                    identifiers.push(ReferenceSystemIdentifier::default());
                }
                path.push(local);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(text)) => {
                if !path.iter().any(|name| name == "RS_Identifier") {
                    continue;
                }
                if path.last().map(String::as_str) != Some("CharacterString") {
                    continue;
                }
                let value = match text.unescape() {
                    Ok(value) => value.trim().to_string(),
                    Err(_) => continue,
                };
                if value.is_empty() {
                    continue;
                }
                if let Some(current) = identifiers.last_mut() {
                    if path.iter().any(|name| name == "codeSpace") {
                        current.code_space.get_or_insert(value);
                    } else if path.iter().any(|name| name == "code") {
                        current.code.get_or_insert(value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("Metadata XML parse error: {}", e);
                return None;
            }
            _ => {}
        }
    }

    Some(identifiers)
}
