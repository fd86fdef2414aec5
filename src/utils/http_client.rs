//! HTTP retrieval with a streaming byte ceiling and automatic decompression
//!
//! The byte ceiling is enforced chunk by chunk while the body is still being
//! received, so an oversized source aborts the transfer instead of buffering
//! an unbounded payload first.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

use crate::errors::{AppError, AppResult, SourceError};
use crate::utils::url::UrlUtils;
use crate::utils::{CompressionFormat, DecompressionService};

/// HTTP client that returns decoded text from possibly-compressed sources
pub struct StandardHttpClient {
    client: Client,
    max_bytes: u64,
}

impl StandardHttpClient {
    /// Create a new client with the given byte ceiling and a 10s connection
    /// timeout (no total request timeout, large transfers can be slow)
    pub fn new(max_bytes: u64) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(AppError::Http)?;

        Ok(Self { client, max_bytes })
    }

    /// Fetch URL and return decompressed, UTF-8 decoded text content
    pub async fn fetch_text(&self, url: &str) -> AppResult<String> {
        debug!(
            "Fetching text content from: {}",
            UrlUtils::obfuscate_credentials(url)
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            let obfuscated = UrlUtils::obfuscate_credentials(&e.to_string());
            AppError::ExternalService {
                service: "http_client".to_string(),
                message: obfuscated,
            }
        })?;

        if !response.status().is_success() {
            return Err(AppError::Source(SourceError::Http {
                status: response.status().as_u16(),
                message: format!(
                    "{} - URL: {}",
                    response
                        .status()
                        .canonical_reason()
                        .unwrap_or("Unknown"),
                    UrlUtils::obfuscate_credentials(url)
                ),
            }));
        }

        let raw = self.read_capped(response, url).await?;
        debug!("Fetched {} bytes of raw content", raw.len());

        let compression_format = DecompressionService::detect_compression_format(&raw);
        let decompressed = match compression_format {
            CompressionFormat::Uncompressed => raw.to_vec(),
            _ => {
                debug!("Detected {:?} payload, decompressing", compression_format);
                DecompressionService::decompress(raw).map_err(|e| {
                    AppError::Source(SourceError::parse(
                        "http_client",
                        format!("Failed to decompress content: {e}"),
                    ))
                })?
            }
        };

        let content = String::from_utf8(decompressed).map_err(|e| {
            AppError::Source(SourceError::Decode {
                message: format!("Content is not valid UTF-8: {e}"),
            })
        })?;

        debug!(
            "Successfully fetched {} characters of text content",
            content.len()
        );
        Ok(content)
    }

    /// Read the response body in chunks, aborting mid-stream once the byte
    /// ceiling is crossed
    async fn read_capped(&self, response: reqwest::Response, url: &str) -> AppResult<Bytes> {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(AppError::Http)?;
            if (buffer.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(AppError::SizeLimit {
                    url: UrlUtils::obfuscate_credentials(url),
                    limit: self.max_bytes,
                });
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(Bytes::from(buffer))
    }
}
