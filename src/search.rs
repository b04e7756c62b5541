//! Keyword search lookup.
//!
//! The search service is an opaque collaborator: a GET to
//! `<search_url>/<url-encoded term>` answers with a JSON array of posts.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::UpstreamError;

const SERVICE: &str = "search service";

/// One post matching a search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub post_title: String,
    /// Permalink of the post
    pub guid: String,
}

/// Looks up posts matching the user's text.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, terms: &str) -> Result<Vec<SearchHit>, UpstreamError>;
}

/// [`SearchClient`] backed by the HTTP search endpoint.
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: Client,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { client, base_url }
    }

    /// URL for a lookup, with the terms encoded as a single path segment
    pub fn lookup_url(&self, terms: &str) -> String {
        format!("{}{}", self.base_url, urlencoding::encode(terms))
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, terms: &str) -> Result<Vec<SearchHit>, UpstreamError> {
        let url = self.lookup_url(terms);
        tracing::debug!(%url, "Querying search service");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })
    }
}
