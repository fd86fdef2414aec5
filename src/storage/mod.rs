//! S3-compatible object storage uploads
//!
//! A minimal storage client: AWS-SigV4-signed `PutObject` over the shared
//! HTTP stack. Credentials come from the conventional `AWS_ACCESS_KEY_ID` /
//! `AWS_SECRET_ACCESS_KEY` environment variables, checked up front together
//! with the HTTPS endpoint requirement and a payload sanity limit. Provider
//! errors are propagated unchanged.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::errors::{AppError, AppResult, StorageError};
use crate::utils::UrlUtils;

type HmacSha256 = Hmac<Sha256>;

/// Uploads larger than this are rejected before any request is made (1 GiB)
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

const SERVICE: &str = "s3";
const SIGNED_HEADERS_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// S3-compatible storage client using path-style object addressing
pub struct S3Client {
    http: Client,
    endpoint: Url,
    host: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
}

impl S3Client {
    /// Build a client for the given endpoint, reading credentials from the
    /// environment. Fails when credentials are missing or the endpoint is
    /// not HTTPS.
    pub fn from_env(endpoint_url: &str, region: &str) -> AppResult<Self> {
        let access_key_id = require_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = require_env("AWS_SECRET_ACCESS_KEY")?;

        let endpoint = Url::parse(endpoint_url)
            .map_err(|e| AppError::configuration(format!("Invalid storage endpoint: {e}")))?;
        if endpoint.scheme() != "https" {
            return Err(StorageError::InsecureEndpoint {
                endpoint: endpoint_url.to_string(),
            }
            .into());
        }
        let host = UrlUtils::authority(endpoint_url).ok_or_else(|| {
            AppError::configuration("Storage endpoint has no host".to_string())
        })?;

        let http = Client::builder()
            .build()
            .map_err(StorageError::Transport)?;

        Ok(Self {
            http,
            endpoint,
            host,
            region: region.to_string(),
            access_key_id,
            secret_access_key,
        })
    }

    /// Upload a payload as `s3://{bucket}/{key}`, tagging it with upload
    /// metadata
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> AppResult<()> {
        if body.len() > MAX_UPLOAD_BYTES {
            return Err(StorageError::PayloadTooLarge {
                size: body.len(),
                max_size: MAX_UPLOAD_BYTES,
            }
            .into());
        }

        info!("Uploading to object storage: s3://{bucket}/{key} ({} bytes)", body.len());

        let now = Utc::now();
        let canonical_uri = format!("/{}/{}", uri_encode_segment(bucket), uri_encode_path(key));
        let payload_hash = hex::encode(Sha256::digest(&body));

        let mut signed_headers = vec![
            ("host".to_string(), self.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            (
                "x-amz-date".to_string(),
                now.format("%Y%m%dT%H%M%SZ").to_string(),
            ),
            (
                "x-amz-meta-uploaded-by".to_string(),
                "m3u-slim".to_string(),
            ),
            (
                "x-amz-meta-upload-timestamp".to_string(),
                now.timestamp().to_string(),
            ),
        ];
        signed_headers.sort_by(|a, b| a.0.cmp(&b.0));

        let authorization = self.sign_request(
            "PUT",
            &canonical_uri,
            &signed_headers,
            &payload_hash,
            now,
        )?;

        let mut request_url = self.endpoint.clone();
        request_url.set_path(&canonical_uri);

        let mut request = self
            .http
            .put(request_url)
            .header("authorization", authorization)
            .header("content-type", content_type)
            .body(body);
        for (name, value) in &signed_headers {
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(StorageError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let message = message.chars().take(512).collect();
            return Err(StorageError::Provider {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        info!("Upload completed: s3://{bucket}/{key}");
        Ok(())
    }

    /// Compute the SigV4 `Authorization` header for a request with the given
    /// canonical components
    fn sign_request(
        &self,
        method: &str,
        canonical_uri: &str,
        signed_headers: &[(String, String)],
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);

        let canonical_header_lines: String = signed_headers
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", value.trim()))
            .collect();
        let signed_header_names: Vec<&str> =
            signed_headers.iter().map(|(name, _)| name.as_str()).collect();
        let signed_header_names = signed_header_names.join(";");

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n\n{canonical_header_lines}\n{signed_header_names}\n{payload_hash}"
        );
        debug!("Canonical request:\n{canonical_request}");

        let string_to_sign = format!(
            "{SIGNED_HEADERS_ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        Ok(format!(
            "{SIGNED_HEADERS_ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_header_names}, Signature={signature}",
            self.access_key_id
        ))
    }
}

fn require_env(variable: &str) -> AppResult<String> {
    match std::env::var(variable) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(StorageError::MissingCredentials {
            variable: variable.to_string(),
        }
        .into()),
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> AppResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| {
        AppError::Storage(StorageError::Signing {
            message: e.to_string(),
        })
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode a path, keeping `/` separators
fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(uri_encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encode one path segment per the SigV4 rules (unreserved
/// characters pass through, everything else becomes uppercase %XX)
fn uri_encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
