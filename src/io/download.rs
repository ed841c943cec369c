//! HTTP fetch helpers: small metadata fetches with bounded timeouts and
//! full-file downloads with throttled progress reporting.

use crate::types::{CancelToken, RastacError, RastacResult};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Timeout for metadata-sized fetches (kerchunk documents, coordinate
/// payloads, metadata XML). Failure is "source unavailable", never a hang.
pub const METADATA_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for full NetCDF downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

fn client(timeout: Duration) -> RastacResult<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent("rastac/0.2.0 (STAC Raster Loader)")
        .build()
        .map_err(|e| RastacError::SourceUnavailable(format!("Failed to create HTTP client: {}", e)))
}

/// Fetch a URL into memory, optionally restricted to a byte range
/// (offset, length). Used for kerchunk documents and chunk payloads.
pub fn fetch_bytes(
    url: &str,
    range: Option<(u64, u64)>,
    timeout: Duration,
) -> RastacResult<Vec<u8>> {
    let client = client(timeout)?;
    let mut request = client.get(url);

    if let Some((offset, length)) = range {
        request = request.header(
            reqwest::header::RANGE,
            format!("bytes={}-{}", offset, offset + length.saturating_sub(1)),
        );
    }

    let response = request
        .send()
        .map_err(|e| RastacError::SourceUnavailable(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(RastacError::SourceUnavailable(format!(
            "HTTP {} for {}",
            response.status().as_u16(),
            url
        )));
    }

    let body = response
        .bytes()
        .map_err(|e| RastacError::SourceUnavailable(format!("Failed to read response body: {}", e)))?;

    Ok(body.to_vec())
}

/// Fetch a URL as UTF-8 text with the metadata timeout.
pub fn fetch_text(url: &str, timeout: Duration) -> RastacResult<String> {
    let body = fetch_bytes(url, None, timeout)?;
    String::from_utf8(body)
        .map_err(|e| RastacError::MalformedMetadata(format!("Response is not UTF-8: {}", e)))
}

/// Download a file to `dest`, reporting integer percentages through
/// `progress`. Updates are throttled to 2% steps so a chatty server does
/// not flood the progress channel. The cancel token is checked per chunk;
/// cancellation removes nothing here (the caller owns the temp path).
pub fn download_with_progress<P: AsRef<Path>>(
    url: &str,
    dest: P,
    progress: &mut dyn FnMut(u8),
    cancel: &CancelToken,
) -> RastacResult<()> {
    log::info!("Downloading: {}", url);

    let client = client(DOWNLOAD_TIMEOUT)?;
    let mut response = client
        .get(url)
        .send()
        .map_err(|e| RastacError::SourceUnavailable(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(RastacError::SourceUnavailable(format!(
            "HTTP {} for {}",
            response.status().as_u16(),
            url
        )));
    }

    let total = response.content_length().unwrap_or(0);
    let mut file = std::fs::File::create(dest.as_ref())?;
    let mut buffer = [0u8; 64 * 1024];
    let mut written: u64 = 0;
    let mut last_percent: i32 = -1;

    loop {
        cancel.check()?;

        let n = response
            .read(&mut buffer)
            .map_err(|e| RastacError::SourceUnavailable(format!("Download read failed: {}", e)))?;
        if n == 0 {
            break;
        }

        file.write_all(&buffer[..n])?;
        written += n as u64;

        if total > 0 {
            let percent = ((written * 100) / total).min(100) as i32;
            if percent >= last_percent + 2 {
                last_percent = percent;
                progress(percent as u8);
            }
        }
    }

    file.flush()?;
    log::info!("Downloaded {} bytes to {}", written, dest.as_ref().display());
    Ok(())
}
