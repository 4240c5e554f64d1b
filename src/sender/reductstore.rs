// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// ReductStore sender implementation
//
// Uses the batched write endpoint: every payload travels as one record with
// its own timestamp, and records the server refuses come back as
// `x-reduct-error-<timestamp>` response headers.

use super::backend::{stream_to_entry_name, RecordSender};
use crate::config::ReductStoreConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const ERROR_HEADER_PREFIX: &str = "x-reduct-error-";

/// Non-success HTTP status from ReductStore
#[derive(Debug, thiserror::Error)]
#[error("ReductStore request failed with status {status}: {message}")]
pub struct HttpStatusError {
    pub status: u16,
    pub message: String,
}

impl HttpStatusError {
    /// Timeouts, throttling and server-side errors are worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self.status, 408 | 429) || self.status >= 500
    }
}

/// ReductStore client for delivering record batches
pub struct ReductStoreSender {
    client: Client,
    base_url: String,
    bucket_name: String,
}

impl ReductStoreSender {
    pub fn new(config: ReductStoreConfig) -> Result<Self> {
        let mut client_builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds));

        // Add API token if provided
        if let Some(token) = &config.api_token {
            let mut headers = HeaderMap::new();
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value).context("Invalid API token")?,
            );
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            bucket_name: config.bucket_name,
        })
    }

    /// Create bucket if it doesn't exist
    async fn ensure_bucket(&self) -> Result<()> {
        let url = format!("{}/api/v1/b/{}", self.base_url, self.bucket_name);

        match self.client.head(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Bucket '{}' already exists", self.bucket_name);
                Ok(())
            }
            _ => {
                info!("Creating bucket '{}'", self.bucket_name);
                let response = self
                    .client
                    .post(&url)
                    .send()
                    .await
                    .context("Failed to create bucket")?;

                if response.status().is_success() || response.status().as_u16() == 409 {
                    info!("Bucket '{}' created successfully", self.bucket_name);
                    Ok(())
                } else {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    Err(HttpStatusError { status, message }).context("Failed to create bucket")
                }
            }
        }
    }
}

#[async_trait]
impl RecordSender for ReductStoreSender {
    async fn initialize(&self) -> Result<()> {
        self.ensure_bucket().await
    }

    async fn send_batch(&self, stream_name: &str, payloads: Vec<Bytes>) -> Result<Vec<Bytes>> {
        let entry_name = stream_to_entry_name(stream_name);
        if entry_name.is_empty() {
            bail!(HttpStatusError {
                status: 422,
                message: format!("stream '{}' has no usable entry name", stream_name),
            });
        }

        let url = format!(
            "{}/api/v1/b/{}/{}/batch",
            self.base_url, self.bucket_name, entry_name
        );

        let base_ts = now_micros();
        let total: usize = payloads.iter().map(|p| p.len()).sum();
        let mut body = Vec::with_capacity(total);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream");

        for (i, payload) in payloads.iter().enumerate() {
            request = request.header(
                format!("x-reduct-time-{}", base_ts + i as u64),
                format!("{},application/octet-stream", payload.len()),
            );
            body.extend_from_slice(payload);
        }

        let response = request
            .body(body)
            .send()
            .await
            .context("Failed to send batch")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(HttpStatusError { status, message }.into());
        }

        let failed = failed_indices(response.headers(), base_ts, payloads.len());
        if !failed.is_empty() {
            warn!(
                "ReductStore refused {}/{} records for entry '{}'",
                failed.len(),
                payloads.len(),
                entry_name
            );
        }

        debug!(
            "Sent {} records ({} bytes) to entry '{}'",
            payloads.len(),
            total,
            entry_name
        );

        Ok(failed.into_iter().map(|i| payloads[i].clone()).collect())
    }

    fn is_recoverable(&self, error: &anyhow::Error) -> bool {
        if let Some(status) = error.downcast_ref::<HttpStatusError>() {
            return status.is_recoverable();
        }
        if let Some(e) = error.downcast_ref::<reqwest::Error>() {
            if e.is_builder() {
                return false;
            }
            if let Some(status) = e.status() {
                return HttpStatusError {
                    status: status.as_u16(),
                    message: String::new(),
                }
                .is_recoverable();
            }
        }
        true
    }

    fn sender_type(&self) -> &str {
        "reductstore"
    }
}

/// Batch positions named by `x-reduct-error-<timestamp>` headers, ascending
fn failed_indices(headers: &HeaderMap, base_ts: u64, count: usize) -> Vec<usize> {
    let mut failed: HashSet<usize> = HashSet::new();

    for name in headers.keys() {
        let Some(ts) = name.as_str().strip_prefix(ERROR_HEADER_PREFIX) else {
            continue;
        };
        match ts.parse::<u64>() {
            Ok(ts) if ts >= base_ts && ((ts - base_ts) as usize) < count => {
                failed.insert((ts - base_ts) as usize);
            }
            _ => warn!("Ignoring error header for unknown record '{}'", name),
        }
    }

    let mut failed: Vec<usize> = failed.into_iter().collect();
    failed.sort_unstable();
    failed
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
