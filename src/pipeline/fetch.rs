//! Retrieval: download one slot's payload with retries, then hand it to the
//! classifier and converter.
//!
//! ## Attempt loop
//!
//! Each attempt is a full re-fetch. A non-success status or any transport
//! error is recorded as a [`FailureRecord`] tagged with the attempt number,
//! followed by `retry_pause`. The first attempt that writes the body to the
//! staging path ends the loop.
//!
//! Large files are served behind a "can't scan this for viruses" page
//! instead of the bytes. That page carries a `download_warning` marker and a
//! `confirm=<token>` link; the attempt re-requests once with the token.
//! Only HTML answers are read into memory to look for it. Payloads are
//! streamed to the staging file.
//! The HTTP client keeps cookies, since the drive pairs the token with a
//! session cookie.
//!
//! Conversion runs once, after the loop. Decoding the same bytes again would
//! fail the same way, so conversion failures are not retried.

use crate::config::{HarvestConfig, RunMode, UnknownPayloadPolicy, CANONICAL_EXTENSION};
use crate::error::{ConvertError, FetchError, HarvestError};
use crate::output::{FailureRecord, FailureStage, SlotOutcome};
use crate::pipeline::classify::{self, extension_for_content_type};
use crate::pipeline::convert::FormatConverter;
use crate::pipeline::link::ResourceId;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Marker present on the interstitial page.
const WARNING_MARKER: &[u8] = b"download_warning";

static CONFIRM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"confirm=([^&"'\s<>;]+)"#).unwrap());

/// Extract the confirmation token from an interstitial page, if `body` is one.
pub fn extract_confirm_token(body: &[u8]) -> Option<String> {
    if !body
        .windows(WARNING_MARKER.len())
        .any(|w| w == WARNING_MARKER)
    {
        return None;
    }
    CONFIRM_TOKEN
        .captures(body)
        .map(|caps| String::from_utf8_lossy(&caps[1]).into_owned())
}

/// Where the raw payload is written before classification.
///
/// The target's extension is replaced by `ext`. In compressed mode a payload
/// already carrying the canonical extension gets a `.staged` infix, so
/// conversion never writes over its own input.
pub fn staged_path(target: &Path, ext: &str, mode: RunMode) -> PathBuf {
    if mode == RunMode::Compressed && ext.eq_ignore_ascii_case(CANONICAL_EXTENSION) {
        target.with_extension(format!("staged.{ext}"))
    } else {
        target.with_extension(ext)
    }
}

/// Downloads and normalises submission slots.
pub struct Retriever {
    client: reqwest::Client,
    endpoint: String,
    mode: RunMode,
    max_attempts: u32,
    retry_pause: Duration,
    policy: UnknownPayloadPolicy,
    converter: Arc<FormatConverter>,
}

impl Retriever {
    pub fn new(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("submission-harvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarvestError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.download_endpoint.clone(),
            mode: config.mode,
            max_attempts: config.max_attempts,
            retry_pause: config.retry_pause,
            policy: config.unknown_payload_policy,
            converter: Arc::new(FormatConverter::new(config)),
        })
    }

    /// Use a specific converter, e.g. one with a pinned PDF engine.
    pub fn with_converter(mut self, converter: FormatConverter) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    pub fn converter(&self) -> &FormatConverter {
        &self.converter
    }

    /// Download `id` and produce the final asset for `target`.
    ///
    /// `target` names the slot (`<root>/<entrant>/<label>`); its extension,
    /// if any, is ignored. Never fails: every problem ends up in the
    /// returned outcome's `failures`.
    pub async fn retrieve_slot(&self, id: &ResourceId, target: &Path) -> SlotOutcome {
        let mut failures = Vec::new();

        let Some(staged) = self.download(id, target, &mut failures).await else {
            warn!(
                "Giving up on ID {} after {} attempts",
                id, self.max_attempts
            );
            return SlotOutcome::failed(failures);
        };

        if self.mode == RunMode::Uncompressed {
            info!("Kept raw payload {}", staged.display());
            return SlotOutcome {
                asset: Some(staged),
                preserved_payload: None,
                failures,
            };
        }

        let classified = match classify::classify(&staged, self.policy) {
            Ok(c) => c,
            Err(e) => {
                failures.push(FailureRecord::new(
                    FailureStage::Classification,
                    staged.display().to_string(),
                    e.to_string(),
                ));
                return SlotOutcome {
                    asset: None,
                    preserved_payload: Some(staged),
                    failures,
                };
            }
        };

        let source = classified.path.clone();
        match self
            .converter
            .convert_blocking(classified, target.to_path_buf())
            .await
        {
            Ok(asset) => SlotOutcome {
                asset: Some(asset),
                preserved_payload: None,
                failures,
            },
            Err(e) => {
                warn!("Conversion failed for {}: {}", source.display(), e);
                let stage = match e {
                    ConvertError::Unsupported { .. } => FailureStage::Classification,
                    _ => FailureStage::Conversion,
                };
                failures.push(FailureRecord::new(
                    stage,
                    source.display().to_string(),
                    e.to_string(),
                ));
                SlotOutcome {
                    asset: None,
                    preserved_payload: source.exists().then_some(source),
                    failures,
                }
            }
        }
    }

    /// Attempt loop. Returns the staged path, or `None` once attempts run out.
    async fn download(
        &self,
        id: &ResourceId,
        target: &Path,
        failures: &mut Vec<FailureRecord>,
    ) -> Option<PathBuf> {
        for attempt in 1..=self.max_attempts {
            match self.attempt(id, target).await {
                Ok(staged) => return Some(staged),
                Err(e) => {
                    match &e {
                        FetchError::Status { status } => {
                            warn!("Download failed (HTTP {}) for ID {}", status, id)
                        }
                        other => warn!("Attempt {} exception for ID {}: {}", attempt, id, other),
                    }
                    failures.push(
                        FailureRecord::new(FailureStage::Download, format!("ID {id}"), e.to_string())
                            .with_attempt(attempt),
                    );
                    if !self.retry_pause.is_zero() {
                        tokio::time::sleep(self.retry_pause).await;
                    }
                }
            }
        }
        None
    }

    /// One attempt: fetch, confirm if needed, stage.
    async fn attempt(&self, id: &ResourceId, target: &Path) -> Result<PathBuf, FetchError> {
        let mut response = self.fetch(id, None).await?;

        let content_type = declared_type(&response);
        if is_page(content_type.as_deref()) {
            let page = response.bytes().await?;
            match extract_confirm_token(&page) {
                Some(token) => {
                    debug!("ID {}: confirmation page, retrying with token", id);
                    response = self.fetch(id, Some(&token)).await?;
                }
                None => {
                    let staged = self.staging_for(target, content_type.as_deref());
                    tokio::fs::write(&staged, &page)
                        .await
                        .map_err(|source| FetchError::Stage {
                            path: staged.clone(),
                            source,
                        })?;
                    info!(
                        "Downloaded ID {} (page, {} bytes) → {}",
                        id,
                        page.len(),
                        staged.display()
                    );
                    return Ok(staged);
                }
            }
        }

        self.stream_to_stage(id, response, target).await
    }

    fn staging_for(&self, target: &Path, content_type: Option<&str>) -> PathBuf {
        staged_path(target, &extension_for_content_type(content_type), self.mode)
    }

    /// Write the body to the staging path chunk by chunk. A partial file is
    /// removed when the body breaks off.
    async fn stream_to_stage(
        &self,
        id: &ResourceId,
        mut response: reqwest::Response,
        target: &Path,
    ) -> Result<PathBuf, FetchError> {
        let content_type = declared_type(&response);
        let staged = self.staging_for(target, content_type.as_deref());
        let stage_err = |source| FetchError::Stage {
            path: staged.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&staged).await.map_err(stage_err)?;
        let mut written: u64 = 0;
        let copied: Result<(), FetchError> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await.map_err(stage_err)?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(stage_err)
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(&staged).await {
                debug!("Could not remove partial {}: {}", staged.display(), rm);
            }
            return Err(e);
        }

        info!(
            "Downloaded ID {} ({} bytes, {}) → {}",
            id,
            written,
            content_type.as_deref().unwrap_or("no content type"),
            staged.display()
        );
        Ok(staged)
    }

    async fn fetch(
        &self,
        id: &ResourceId,
        confirm: Option<&str>,
    ) -> Result<reqwest::Response, FetchError> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("export", "download"), ("id", id.as_str())]);
        if let Some(token) = confirm {
            request = request.query(&[("confirm", token)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn declared_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Only HTML answers can be the interstitial; anything else streams straight to disk.
fn is_page(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_extracted_from_warning_page() {
        let page = br#"<html><a id="uc-download-link" class="download_warning"
            href="/uc?export=download&amp;confirm=t0K-3n_9&amp;id=ABC">Download anyway</a></html>"#;
        assert_eq!(extract_confirm_token(page).as_deref(), Some("t0K-3n_9"));
    }

    #[test]
    fn token_ends_at_ampersand() {
        let page = b"download_warning ... /uc?confirm=XyZ&id=1";
        assert_eq!(extract_confirm_token(page).as_deref(), Some("XyZ"));
    }

    #[test]
    fn no_marker_no_token() {
        // A confirm= link alone is not an interstitial.
        assert_eq!(extract_confirm_token(b"see /uc?confirm=abc&id=1"), None);
        assert_eq!(extract_confirm_token(b"\xFF\xD8\xFF\xE0binary"), None);
    }

    #[test]
    fn marker_without_token_is_none() {
        assert_eq!(extract_confirm_token(b"download_warning but no link"), None);
    }

    #[test]
    fn only_html_answers_are_inspected() {
        assert!(is_page(Some("text/html")));
        assert!(is_page(Some("TEXT/HTML; charset=utf-8")));
        assert!(!is_page(Some("image/jpeg")));
        assert!(!is_page(Some("application/octet-stream")));
        assert!(!is_page(None));
    }

    #[test]
    fn staged_path_uses_declared_extension() {
        let target = Path::new("out/7/Photo");
        assert_eq!(
            staged_path(target, "jpg", RunMode::Compressed),
            PathBuf::from("out/7/Photo.jpg")
        );
        assert_eq!(
            staged_path(target, "bin", RunMode::Uncompressed),
            PathBuf::from("out/7/Photo.bin")
        );
    }

    #[test]
    fn staged_path_avoids_canonical_collision() {
        let target = Path::new("out/7/Photo2");
        assert_eq!(
            staged_path(target, "avif", RunMode::Compressed),
            PathBuf::from("out/7/Photo2.staged.avif")
        );
        // Raw mode keeps the delivered extension as-is.
        assert_eq!(
            staged_path(target, "avif", RunMode::Uncompressed),
            PathBuf::from("out/7/Photo2.avif")
        );
    }

    #[test]
    fn retriever_builds_from_defaults() {
        let retriever = Retriever::new(&HarvestConfig::default()).unwrap();
        assert_eq!(retriever.max_attempts, 3);
        assert!(!retriever.converter().heif_initialised());
    }
}
