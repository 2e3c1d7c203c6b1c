//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use ragway_llm::{
    CredentialPool, Embedder, GenerationBackend, MockBackend, MockEmbedder, ModelList,
    Orchestrator,
};
use ragway_retrieval::{
    ContextAssembler, DocumentDirectory, MockDocumentDirectory, MockVectorStore, PromptBuilder,
    RetrievalClient, RetrievalOptions, RetrievedChunk, VectorStore,
};
use ragway_server::{AppState, Gateway, Server, ServerConfig, StaticTokenValidator};

/// Models used by the mock gateways.
pub const MODELS: [&str; 2] = ["gemini-2.5-flash-lite", "gemini-2.5-flash"];

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// The auth token for the server.
    pub token: String,
    /// HTTP client configured for this server.
    pub client: Client,
    /// Cancels the server.
    pub shutdown: CancellationToken,
    /// Handle to the server task.
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server over `gateway`.
    pub async fn start(gateway: Gateway) -> Result<Self> {
        let token = "test-token".to_string();

        let config = ServerConfig::new()
            .with_rate_limiting(false)
            .with_request_logging(false);
        let state = AppState::new(
            config,
            gateway,
            Arc::new(StaticTokenValidator::new(token.clone())),
        );
        let shutdown = state.shutdown.clone();

        // Bind first so the port is ours before the server task starts
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server = Server::from_state(state);
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            token,
            client,
            shutdown,
            handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get an authenticated POST request builder.
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .bearer_auth(&self.token)
    }

    /// Send a single user message to the chat endpoint.
    pub async fn ask(&self, question: &str) -> Result<reqwest::Response> {
        Ok(self
            .post("/api/v1/chat/send")
            .json(&serde_json::json!({
                "messages": [{"role": "user", "content": question}]
            }))
            .send()
            .await?)
    }

    /// Stop the server and wait for it to exit.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        timeout(Duration::from_secs(5), self.handle).await??;
        Ok(())
    }
}

/// Gateway over the given collaborators.
pub fn gateway(
    backend: Arc<dyn GenerationBackend>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    directory: Arc<dyn DocumentDirectory>,
    keys: &[&str],
) -> Gateway {
    let retrieval = RetrievalClient::new(embedder, store, RetrievalOptions::default());
    let assembler = ContextAssembler::new(directory, 100);
    let orchestrator = Orchestrator::new(
        backend,
        CredentialPool::new(keys.iter().copied()),
        ModelList::new(MODELS),
    );
    Gateway::new(retrieval, assembler, PromptBuilder::default(), orchestrator)
}

/// Gateway over mocks, with "doc-a" named "Doc A".
pub fn mock_gateway(backend: Arc<MockBackend>, chunks: Vec<RetrievedChunk>, keys: &[&str]) -> Gateway {
    gateway(
        backend,
        Arc::new(MockEmbedder::default()),
        Arc::new(MockVectorStore::new(chunks)),
        Arc::new(MockDocumentDirectory::new([("doc-a", "Doc A")])),
        keys,
    )
}

/// Parse an SSE body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

/// Concatenated `text` event contents.
pub fn answer_text(events: &[(String, Value)]) -> String {
    events
        .iter()
        .filter(|(name, _)| name == "text")
        .filter_map(|(_, data)| data["content"].as_str())
        .collect()
}

/// Event names in order.
pub fn event_names(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
