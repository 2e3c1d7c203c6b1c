//! Builds runtime components from the loaded configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};

use ragway_config::{
    AuthMode, GatewayConfig, ResolvedCredentials, ScopeSetting, resolve_service_key_with,
    resolve_store_url_with,
};
use ragway_llm::{
    CredentialPool, DEFAULT_MODELS, GeminiBackend, GeminiConfig, GeminiEmbedder,
    GeminiEmbedderConfig, GenerationError, MockEmbedder, ModelList, Orchestrator, SharedEmbedder,
};
use ragway_retrieval::{
    ContextAssembler, PostgrestConfig, PostgrestStore, PromptBuilder, RetrievalClient,
    RetrievalOptions, ScopeMode,
};
use ragway_server::{
    DisabledValidator, Gateway, ServerConfig, SharedSessionValidator, StaticTokenValidator,
    SupabaseSessionValidator,
};

/// Store endpoint and key.
#[derive(Debug, Clone)]
pub struct StoreAccess {
    pub url: String,
    pub service_key: String,
}

/// The model preference list from config, or the built-in list.
pub fn model_list(config: &GatewayConfig) -> ModelList {
    match config.generation().models {
        Some(models) => ModelList::new(models),
        None => ModelList::new(DEFAULT_MODELS.iter().copied()),
    }
}

/// Gemini backend + credential pool + models.
pub fn build_orchestrator(
    config: &GatewayConfig,
    credentials: &ResolvedCredentials,
) -> Result<Orchestrator> {
    let generation = config.generation();

    let mut gemini = GeminiConfig::default()
        .with_connect_timeout(Duration::from_secs(generation.connect_timeout_secs));
    if let Some(url) = &generation.base_url {
        gemini = gemini.with_base_url(url.clone());
    }
    if let Some(t) = generation.temperature {
        gemini = gemini.with_temperature(t);
    }
    if let Some(n) = generation.max_output_tokens {
        gemini = gemini.with_max_output_tokens(n);
    }

    let backend = GeminiBackend::new(gemini).context("Failed to create Gemini backend")?;
    Ok(Orchestrator::new(
        Arc::new(backend),
        CredentialPool::new(credentials.keys.iter().cloned()),
        model_list(config),
    ))
}

/// Store URL and service key, from config or the environment.
pub fn store_access<F>(config: &GatewayConfig, lookup: F) -> Result<StoreAccess>
where
    F: Fn(&str) -> Option<String>,
{
    let store = config.store();
    let Some(url) = resolve_store_url_with(&store, &lookup) else {
        bail!(
            "Document store URL not configured. Set [store] url or the {} environment variable.",
            store.url_env
        );
    };
    let Some(key) = resolve_service_key_with(&store, &lookup) else {
        bail!(
            "Document store key not configured. Set the {} environment variable.",
            store.service_key_env
        );
    };
    Ok(StoreAccess {
        url,
        service_key: key.value,
    })
}

/// Embedder bound to the first credential of the pool.
pub fn build_embedder(config: &GatewayConfig, pool: &CredentialPool) -> Result<SharedEmbedder> {
    let embedding = config.embedding();
    let Some(first) = pool.first() else {
        // Requests fail before retrieval when the pool is empty.
        return Ok(Arc::new(MockEmbedder::failing(GenerationError::Config(
            "no API keys configured".to_string(),
        ))));
    };

    let mut embedder_config = GeminiEmbedderConfig::default()
        .with_model(embedding.model)
        .with_dimensions(embedding.dimensions)
        .with_retries(embedding.max_retries, Duration::from_millis(250));
    embedder_config.timeout = Duration::from_secs(embedding.timeout_secs);
    if let Some(url) = &config.generation().base_url {
        embedder_config = embedder_config.with_base_url(url.clone());
    }

    let embedder =
        GeminiEmbedder::new(embedder_config, first.clone()).context("Failed to create embedder")?;
    Ok(Arc::new(embedder))
}

/// The full request pipeline.
pub fn build_gateway(
    config: &GatewayConfig,
    orchestrator: Orchestrator,
    store: &StoreAccess,
) -> Result<Gateway> {
    let retrieval_config = config.retrieval();
    let prompt_config = config.prompt();

    let postgrest = PostgrestConfig::new(&store.url, &store.service_key)
        .with_search_function(&retrieval_config.search_function)
        .with_documents_table(&retrieval_config.documents_table);
    let postgrest = Arc::new(PostgrestStore::new(postgrest).context("Failed to create store client")?);

    let embedder = build_embedder(config, orchestrator.credentials())?;
    let options = RetrievalOptions {
        scope: match retrieval_config.scope {
            ScopeSetting::Global => ScopeMode::Global,
            ScopeSetting::User => ScopeMode::User,
        },
        match_count: retrieval_config.match_count,
        scoped_match_count: retrieval_config.scoped_match_count,
    };
    let retrieval = RetrievalClient::new(embedder, postgrest.clone(), options);

    let assembler = ContextAssembler::new(postgrest, retrieval_config.max_context_chunks)
        .with_fallback_name(retrieval_config.fallback_document_name);

    let mut prompts = PromptBuilder::default()
        .with_assistant_role(prompt_config.assistant_role)
        .with_not_found_sentinel(prompt_config.not_found_sentinel);
    if let Some(lang) = prompt_config.answer_language {
        prompts = prompts.with_answer_language(lang);
    }

    Ok(Gateway::new(retrieval, assembler, prompts, orchestrator))
}

/// Session validator for the configured auth mode.
pub fn build_validator<F>(
    config: &GatewayConfig,
    store: &StoreAccess,
    lookup: F,
) -> Result<SharedSessionValidator>
where
    F: Fn(&str) -> Option<String>,
{
    let auth = config.auth();
    let validator: SharedSessionValidator = match auth.mode {
        AuthMode::Disabled => {
            tracing::warn!("Authentication is disabled");
            Arc::new(DisabledValidator)
        }
        AuthMode::Token => {
            let Some(token) = lookup(&auth.token_env) else {
                bail!(
                    "auth.mode = \"token\" requires the {} environment variable",
                    auth.token_env
                );
            };
            Arc::new(StaticTokenValidator::new(token.trim()))
        }
        AuthMode::Supabase => Arc::new(
            SupabaseSessionValidator::new(&store.url, &store.service_key)
                .map_err(|e| anyhow::anyhow!("Failed to create session validator: {}", e))?,
        ),
    };
    Ok(validator)
}

/// Server settings, with CLI overrides applied.
pub fn server_config(
    config: &GatewayConfig,
    port: Option<u16>,
    bind: Option<&str>,
) -> Result<ServerConfig> {
    let server = config.server();
    let host = bind.unwrap_or(&server.bind);
    let port = port.unwrap_or(server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    Ok(ServerConfig::new()
        .with_bind_address(addr)
        .with_rate_limiting(server.rate_limiting)
        .with_api_rpm(server.api_rpm)
        .with_request_logging(server.request_logging)
        .with_cors_origins(server.cors_origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_model_list_default_and_override() {
        let config = GatewayConfig::new();
        let list = model_list(&config);
        assert_eq!(list.iter().collect::<Vec<_>>(), DEFAULT_MODELS.to_vec());

        let config =
            GatewayConfig::from_toml("[generation]\nmodels = [\"a\", \"b\"]\n").unwrap();
        let list = model_list(&config);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_server_config_overrides() {
        let config = GatewayConfig::from_toml("[server]\nport = 9000\napi_rpm = 30\n").unwrap();

        let server = server_config(&config, None, None).unwrap();
        assert_eq!(server.bind_address.port(), 9000);
        assert_eq!(server.api_rpm, 30);

        let server = server_config(&config, Some(7000), Some("0.0.0.0")).unwrap();
        assert_eq!(server.bind_address.to_string(), "0.0.0.0:7000");

        assert!(server_config(&config, None, Some("not an ip")).is_err());
    }

    #[test]
    fn test_store_access_requires_url_and_key() {
        let config = GatewayConfig::new();
        assert!(store_access(&config, env(&[])).is_err());
        assert!(store_access(&config, env(&[("SUPABASE_URL", "https://x.supabase.co")])).is_err());

        let access = store_access(
            &config,
            env(&[
                ("SUPABASE_URL", "https://x.supabase.co/"),
                ("SUPABASE_SERVICE_ROLE_KEY", "service"),
            ]),
        )
        .unwrap();
        assert_eq!(access.url, "https://x.supabase.co");
        assert_eq!(access.service_key, "service");
    }

    #[test]
    fn test_token_mode_requires_token() {
        let config = GatewayConfig::from_toml("[auth]\nmode = \"token\"\n").unwrap();
        let store = StoreAccess {
            url: "http://localhost".to_string(),
            service_key: "k".to_string(),
        };
        assert!(build_validator(&config, &store, env(&[])).is_err());
        assert!(build_validator(&config, &store, env(&[("RAGWAY_API_TOKEN", "t")])).is_ok());
    }

    #[test]
    fn test_empty_pool_still_builds_gateway() {
        let config = GatewayConfig::new();
        let credentials = ResolvedCredentials {
            keys: Vec::new(),
            source: None,
        };
        let store = StoreAccess {
            url: "http://localhost:54321".to_string(),
            service_key: "k".to_string(),
        };
        let orchestrator = build_orchestrator(&config, &credentials).unwrap();
        let gateway = build_gateway(&config, orchestrator, &store).unwrap();
        assert_eq!(gateway.credential_count(), 0);
        assert_eq!(gateway.model_count(), DEFAULT_MODELS.len());
    }
}
