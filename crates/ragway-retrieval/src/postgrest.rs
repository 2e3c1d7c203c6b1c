//! PostgREST-backed vector store and document directory.
//!
//! Search goes through an RPC function taking
//! `{query_embedding, match_count, filter_user_id}`. Names come from a
//! `select=id,name&id=in.(..)` query on the documents table.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, RetrievalError};
use crate::store::{DocumentDirectory, VectorStore};
use crate::types::{RetrievedChunk, SearchScope};

/// Default RPC function for vector search.
pub const DEFAULT_SEARCH_FUNCTION: &str = "search_documents_vector";

/// Default documents table.
pub const DEFAULT_DOCUMENTS_TABLE: &str = "documents";

/// Connection settings for a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Service key sent as `apikey` and bearer token.
    pub service_key: String,
    /// RPC function name.
    pub search_function: String,
    /// Documents table name.
    pub documents_table: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl PostgrestConfig {
    /// Settings with default function and table names.
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            search_function: DEFAULT_SEARCH_FUNCTION.to_string(),
            documents_table: DEFAULT_DOCUMENTS_TABLE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the RPC function name.
    pub fn with_search_function(mut self, name: impl Into<String>) -> Self {
        self.search_function = name.into();
        self
    }

    /// Override the documents table name.
    pub fn with_documents_table(mut self, name: impl Into<String>) -> Self {
        self.documents_table = name.into();
        self
    }
}

/// PostgREST client implementing both collaborator traits.
pub struct PostgrestStore {
    client: Client,
    config: PostgrestConfig,
}

impl PostgrestStore {
    /// Build a client with `apikey` and `Authorization` headers preset.
    pub fn new(config: PostgrestConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(RetrievalError::Config("store URL is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_key)
            .map_err(|_| RetrievalError::Config("invalid characters in service key".to_string()))?;
        headers.insert("apikey", key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| RetrievalError::Config("invalid characters in service key".to_string()))?;
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RetrievalError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.config.url, self.config.search_function)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, self.config.documents_table)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RetrievalError::store(status.as_u16(), body.trim()))
    }
}

/// Build a PostgREST `in.(..)` filter with quoted values.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query_embedding: &'a [f32],
    match_count: usize,
    filter_user_id: Option<&'a str>,
}

/// Any column may come back null.
#[derive(Deserialize)]
struct SearchRow {
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct DocumentRow {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl VectorStore for PostgrestStore {
    async fn search(
        &self,
        embedding: &[f32],
        match_count: usize,
        scope: &SearchScope,
    ) -> Result<Vec<RetrievedChunk>> {
        let request = SearchRequest {
            query_embedding: embedding,
            match_count,
            filter_user_id: scope.user_id(),
        };

        tracing::debug!(
            function = %self.config.search_function,
            match_count,
            scope = %scope,
            "Vector search"
        );

        let response = self.client.post(self.rpc_url()).json(&request).send().await?;
        let rows: Vec<SearchRow> = Self::check(response).await?.json().await?;
        let total = rows.len();

        let chunks: Vec<RetrievedChunk> = rows
            .into_iter()
            .filter_map(|row| {
                Some((row.document_id?, row.page_number, row.content.unwrap_or_default()))
            })
            .enumerate()
            .map(|(rank, (document_id, page_number, content))| RetrievedChunk {
                document_id,
                page_number,
                content,
                similarity_rank: rank,
            })
            .collect();

        if chunks.len() < total {
            tracing::warn!(
                dropped = total - chunks.len(),
                "Skipping search rows without a document id"
            );
        }
        Ok(chunks)
    }
}

#[async_trait]
impl DocumentDirectory for PostgrestStore {
    async fn names(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let filter = in_filter(ids);
        let response = self
            .client
            .get(self.table_url())
            .query(&[("select", "id,name"), ("id", filter.as_str())])
            .send()
            .await?;
        let rows: Vec<DocumentRow> = Self::check(response).await?.json().await?;

        // Unnamed documents are left out and fall back per id
        Ok(rows
            .into_iter()
            .filter_map(|row| Some((row.id, row.name?)))
            .collect())
    }
}
