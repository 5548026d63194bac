//! turn-server HTTP Server
//!
//! Axum-based server exposing two tool-calling assistants:
//! a request/response weather assistant over chat completions, and a
//! run-based finance tracker over the assistants API.

mod config;
mod handlers;
mod routes;
mod state;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_tools::{
    ExpenseLedger, FINANCE_PROMPT, MemoryLedger, WEATHER_PROMPT, WeatherClient, WttrClient,
    register_finance_tools, register_weather_tools,
};
use turn_core::tool::DateTimeTool;
use turn_core::{
    CancellationToken, ChatAssistant, CompletionService, ConversationStore, FileSessionStore,
    PollPolicy, RunAssistant, RunService, SessionLocks, ToolRegistry,
};
use turn_runtime::{OpenAiAssistantsClient, OpenAiChatProvider, OpenAiConfig};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    let openai = OpenAiConfig::from_env().context("OpenAI configuration is incomplete")?;

    // Initialize completion provider
    let provider: Arc<dyn CompletionService> = Arc::new(
        OpenAiChatProvider::from_config(openai.clone()).context("Failed to build chat provider")?,
    );

    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to {} ({})", openai.base_url, openai.model),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Completion endpoint not reachable - chat turns will fail");
            tracing::warn!("  Check OPENAI_API_KEY and OPENAI_BASE_URL in .env");
        }
    }

    // Each assistant keeps its own history; locks serialize one user's turns across both
    let chat_store = open_store(&config.session_file)?;
    let locks = SessionLocks::new();

    let ledger: Arc<dyn ExpenseLedger> = Arc::new(MemoryLedger::new());
    let weather: Arc<dyn WeatherClient> =
        Arc::new(WttrClient::new().context("Failed to build weather client")?);

    // Weather assistant
    let mut chat_tools = ToolRegistry::new();
    register_weather_tools(&mut chat_tools, weather);
    chat_tools.register_typed(DateTimeTool);
    log_tools("chat", &chat_tools);

    let chat = ChatAssistant::builder()
        .completions(provider.clone())
        .store(chat_store)
        .locks(locks.clone())
        .tools(chat_tools)
        .system_prompt(WEATHER_PROMPT)
        .model(openai.model.clone())
        .completion_timeout(config.completion_timeout)
        .build_chat()?;

    // Finance assistant, only with a configured assistant id
    let runs = if let Some(assistant_id) = openai.assistant_id.clone() {
        let service: Arc<dyn RunService> = Arc::new(
            OpenAiAssistantsClient::from_config(openai.clone())?.with_instructions(FINANCE_PROMPT),
        );

        let mut finance_tools = ToolRegistry::new();
        register_finance_tools(&mut finance_tools, ledger.clone());
        log_tools("assistant", &finance_tools);

        let assistant = RunAssistant::builder()
            .runs(service)
            .store(open_store(&config.thread_file)?)
            .locks(locks)
            .tools(finance_tools)
            .poll_policy(PollPolicy {
                max_wait: config.poll_max_wait,
                ..PollPolicy::default()
            })
            .build_runs()?;
        tracing::info!("✓ Assistant {} configured", assistant_id);
        Some(Arc::new(assistant))
    } else {
        tracing::warn!("⚠ OPENAI_ASSISTANT_ID not set - /api/assistant disabled");
        None
    };

    let shutdown = CancellationToken::new();

    let state = AppState {
        chat: Arc::new(chat),
        runs,
        provider,
        ledger,
        shutdown: shutdown.clone(),
    };

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 turn-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                       - Health check");
    tracing::info!("  POST /api/chat                     - Weather assistant turn");
    tracing::info!("  POST /api/assistant                - Finance assistant turn");
    tracing::info!("  GET  /api/assistant/sessions/{{key}} - Finance session history");
    tracing::info!("  GET  /api/sessions                 - Recent sessions");
    tracing::info!("  GET  /api/sessions/{{key}}           - Session history");
    tracing::info!("  POST /api/expenses                 - Add an expense");
    tracing::info!("  GET  /api/expenses/{{email}}/weekly  - Weekly totals");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

fn open_store(path: &Path) -> anyhow::Result<Arc<dyn ConversationStore>> {
    let store = FileSessionStore::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    tracing::info!("Sessions stored in {}", path.display());
    Ok(Arc::new(store))
}

fn log_tools(assistant: &str, tools: &ToolRegistry) {
    tracing::info!("Registered {} tools for {}:", tools.len(), assistant);
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }
}

/// Resolves on ctrl-c and cancels in-flight run polling
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
}
