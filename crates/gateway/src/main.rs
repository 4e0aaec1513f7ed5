use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use ah_domain::config::{Config, ConfigSeverity};
use ah_gateway::api;
use ah_gateway::runtime::activities::{ActivityDependencies, WorkerActivities};
use ah_gateway::runtime::agent::AgentRegistry;
use ah_gateway::runtime::broker::EventBroker;
use ah_gateway::runtime::events::{EventLog, EventPublisher};
use ah_gateway::runtime::signals::SignalHub;
use ah_gateway::runtime::tasks::{TaskService, TaskStore};
use ah_gateway::state::AppState;
use ah_mcp_client::McpManager;
use ah_providers::{EnvSecretStore, ProviderRegistry, SecretStore};

#[derive(Parser)]
#[command(name = "agenthub", about = "Multi-tenant agent orchestration platform")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (the default).
    Serve,
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the configuration and exit non-zero on errors.
    Validate,
    /// Print the effective configuration as TOML.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config { action }) => {
            let config = load_config(&cli.config)?;
            match action {
                ConfigAction::Validate => {
                    let issues = config.validate();
                    for issue in &issues {
                        eprintln!("{issue}");
                    }
                    if issues
                        .iter()
                        .any(|i| i.severity == ConfigSeverity::Error)
                    {
                        std::process::exit(1);
                    }
                    println!("config OK");
                    Ok(())
                }
                ConfigAction::Show => {
                    println!("{}", toml::to_string_pretty(&config)?);
                    Ok(())
                }
            }
        }
        Some(Command::Version) => {
            println!("agenthub {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ah_gateway=debug")),
        )
        .json()
        .init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("AgentHub starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── LLM providers ────────────────────────────────────────────────
    let secrets = EnvSecretStore;
    let llm = Arc::new(
        ProviderRegistry::from_config(&config.llm, &secrets)
            .context("initializing LLM providers")?,
    );
    if llm.is_empty() {
        tracing::warn!(
            "no LLM providers initialized — the gateway will run but task \
             execution will fail until credentials are configured"
        );
    } else {
        tracing::info!(providers = llm.len(), "LLM provider registry ready");
    }

    // ── MCP servers ──────────────────────────────────────────────────
    let mcp = if config.mcp.servers.is_empty() {
        tracing::info!("no MCP servers configured");
        Arc::new(McpManager::empty())
    } else {
        Arc::new(
            McpManager::from_config(&config.mcp, |env| EnvSecretStore.get(env).ok()).await,
        )
    };
    if mcp.tool_count() > 0 {
        tracing::info!(
            servers = mcp.server_count(),
            tools = mcp.tool_count(),
            "MCP tools discovered"
        );
    }

    // ── Agent registry ───────────────────────────────────────────────
    let agents = Arc::new(AgentRegistry::from_config(&config.agents));
    if agents.is_empty() {
        tracing::warn!("no agents configured — all RPC submissions will be rejected");
    } else {
        tracing::info!(agent_count = agents.len(), "agent registry ready");
    }

    // ── Event pipeline ───────────────────────────────────────────────
    let event_log = Arc::new(EventLog::new(&config.server.state_path));
    let broker = Arc::new(EventBroker::new());
    let publisher = Arc::new(EventPublisher::new(event_log.clone(), broker.clone()));
    tracing::info!("event log + broker ready");

    // ── Signals + activities + task service ──────────────────────────
    let signals = Arc::new(SignalHub::new());
    let activities = Arc::new(WorkerActivities::new(ActivityDependencies {
        llm: llm.clone(),
        mcp: mcp.clone(),
        agents: agents.clone(),
        publisher: publisher.clone(),
        pricing: config.llm.pricing.clone(),
        workflow: config.workflow.clone(),
    }));
    let task_store = Arc::new(TaskStore::new(&config.server.state_path));
    let tasks = Arc::new(TaskService::new(
        task_store,
        publisher.clone(),
        signals.clone(),
        activities,
        config.workflow.clone(),
    ));
    tracing::info!("task service ready");

    // ── JWT key (read once at startup) ───────────────────────────────
    let jwt_key = {
        let env_var = &config.auth.jwt_secret_env;
        match std::env::var(env_var) {
            Ok(secret) if !secret.is_empty() => {
                tracing::info!(env_var = %env_var, "JWT bearer auth enabled");
                Some(Arc::new(jsonwebtoken::DecodingKey::from_secret(
                    secret.as_bytes(),
                )))
            }
            _ => {
                tracing::warn!(
                    env_var = %env_var,
                    "JWT auth DISABLED — set {env_var} to enable"
                );
                None
            }
        }
    };

    let state = AppState {
        config: config.clone(),
        llm,
        mcp,
        agents,
        tasks: tasks.clone(),
        event_log,
        broker,
        signals,
        jwt_key,
    };

    // ── Periodic terminal-task eviction ──────────────────────────────
    {
        let tasks = tasks.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                tasks.evict_terminal();
            }
        });
    }

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Concurrency limit (backpressure protection) ──────────────────
    let max_concurrent = std::env::var("AH_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Rate-limit layer (per-IP token bucket via governor) ──────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: Arc::new(gov_config),
        }
    });

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "AgentHub listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may carry a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). A literal `"*"` allows all origins.
fn build_cors_layer(cors: &ah_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            // Wildcard ports must be digits only, so a prefix match cannot
            // be extended into another host.
            let origin_str = origin.to_str().unwrap_or("");
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
