//! HTTP client for the Tally document server.
//!
//! Implements [`RemoteStore`] against `tally-server`:
//!
//! - `GET /documents/{collection}/{id}` - fetch (a 404 carrying the server's
//!   `{"error": ...}` body means no document yet; a bare 404 means the base
//!   URL does not point at a document server)
//! - `PUT /documents/{collection}/{id}` - write counters, optionally with the reset marker

use crate::config::ConfigError;
use crate::document::{RemoteDocument, WriteRequest, DEFAULT_COLLECTION, DEFAULT_DOCUMENT_ID};
use crate::error::Result;
use crate::remote::RemoteStore;
use crate::{Counters, Error, Snapshot};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Where the counter document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRemoteConfig {
    /// Server base URL, e.g. `http://localhost:3000`
    pub base_url: String,
    pub collection: String,
    pub document_id: String,
    /// Per-request timeout enforced by the client
    pub timeout: Duration,
}

impl HttpRemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            collection: DEFAULT_COLLECTION.to_string(),
            document_id: DEFAULT_DOCUMENT_ID.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Load from environment variables.
    ///
    /// - `TALLY_REMOTE_URL` - server base URL (required)
    /// - `TALLY_COLLECTION` - collection name (default: `questionCounters`)
    /// - `TALLY_DOCUMENT_ID` - document id (default: `userCounters`)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let base_url =
            env::var("TALLY_REMOTE_URL").map_err(|_| ConfigError::Missing("TALLY_REMOTE_URL"))?;
        Url::parse(&base_url)
            .map_err(|_| ConfigError::InvalidValue("TALLY_REMOTE_URL", base_url.clone()))?;

        let mut config = Self::new(base_url);
        if let Ok(collection) = env::var("TALLY_COLLECTION") {
            config.collection = collection;
        }
        if let Ok(document_id) = env::var("TALLY_DOCUMENT_ID") {
            config.document_id = document_id;
        }
        Ok(config)
    }

    /// Full URL of the counter document.
    pub fn document_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::RemoteUnavailable(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::RemoteUnavailable("base url cannot have a path".into()))?
            .pop_if_empty()
            .extend(["documents", self.collection.as_str(), self.document_id.as_str()]);
        Ok(url)
    }
}

/// Error body the document server sends with every non-2xx answer.
#[derive(Debug, Deserialize)]
struct ServerError {
    error: String,
}

/// Remote store backed by the Tally document server.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    url: Url,
}

impl HttpRemoteStore {
    pub fn new(config: &HttpRemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::RemoteUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            url: config.document_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn put(&self, request: WriteRequest) -> Result<bool> {
        let response = self
            .client
            .put(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "PUT {} returned {status}",
                self.url
            )));
        }

        let stored: RemoteDocument = response
            .json()
            .await
            .map_err(|e| Error::InvalidDocument(e.to_string()))?;

        let acknowledged =
            stored.counters() == request.counters() && stored.is_reset() == request.is_reset();
        if !acknowledged {
            tracing::warn!(url = %self.url, "Server stored a different document than requested");
        }
        Ok(acknowledged)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn load(&self) -> Result<Snapshot> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                let body = response.bytes().await.map_err(unavailable)?;
                match serde_json::from_slice::<ServerError>(&body) {
                    Ok(missing) => {
                        tracing::debug!(url = %self.url, reason = %missing.error, "No remote document yet");
                        Ok(Snapshot::empty())
                    }
                    Err(_) => Err(Error::RemoteUnavailable(format!(
                        "GET {} returned 404 without a document server body, check the base url",
                        self.url
                    ))),
                }
            }
            status if status.is_success() => {
                let document: RemoteDocument = response
                    .json()
                    .await
                    .map_err(|e| Error::InvalidDocument(e.to_string()))?;
                Ok(document.to_snapshot())
            }
            status => Err(Error::RemoteUnavailable(format!(
                "GET {} returned {status}",
                self.url
            ))),
        }
    }

    async fn save(&self, counters: Counters) -> Result<bool> {
        self.put(WriteRequest::update(counters)).await
    }

    async fn reset(&self) -> Result<bool> {
        self.put(WriteRequest::reset()).await
    }
}

fn unavailable(e: reqwest::Error) -> Error {
    Error::RemoteUnavailable(e.to_string())
}
