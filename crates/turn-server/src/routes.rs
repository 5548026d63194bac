//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    add_expense, assistant_handler, assistant_history, chat_handler, health_check, list_sessions,
    session_history, weekly_stats,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))

        // Assistant API
        .route("/api/chat", post(chat_handler))
        .route("/api/assistant", post(assistant_handler))
        .route("/api/assistant/sessions/{key}", get(assistant_history))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{key}", get(session_history))

        // Finance tracker
        .route("/api/expenses", post(add_expense))
        .route("/api/expenses/{email}/weekly", get(weekly_stats))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use assistant_tools::{MemoryLedger, MockWeatherClient, register_finance_tools, register_weather_tools};
    use turn_core::testing::{ScriptedCompletions, ScriptedRuns};
    use turn_core::{
        CancellationToken, ChatAssistant, Completion, MemorySessionStore, RunAssistant, RunSnapshot,
        RunStatus, SessionLocks, ToolCall, ToolRegistry,
    };

    fn state(script: Vec<Completion>, runs: Option<Arc<ScriptedRuns>>) -> AppState {
        let ledger = Arc::new(MemoryLedger::new());
        let locks = SessionLocks::new();
        let provider = Arc::new(ScriptedCompletions::new(script));

        let mut chat_tools = ToolRegistry::new();
        register_weather_tools(&mut chat_tools, Arc::new(MockWeatherClient::new()));

        let chat = ChatAssistant::builder()
            .completions(provider.clone())
            .store(Arc::new(MemorySessionStore::new()))
            .locks(locks.clone())
            .tools(chat_tools)
            .system_prompt("You are a weather assistant.")
            .build_chat()
            .unwrap();

        let runs = runs.map(|service| {
            let mut finance_tools = ToolRegistry::new();
            register_finance_tools(&mut finance_tools, ledger.clone());
            Arc::new(
                RunAssistant::builder()
                    .runs(service)
                    .store(Arc::new(MemorySessionStore::new()))
                    .locks(locks.clone())
                    .tools(finance_tools)
                    .build_runs()
                    .unwrap(),
            )
        });

        AppState {
            chat: Arc::new(chat),
            runs,
            provider,
            ledger,
            shutdown: CancellationToken::new(),
        }
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state(vec![], None));
        let (status, body) = send(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["provider_connected"], true);
        assert_eq!(body["assistant_configured"], false);
        assert_eq!(body["tools"], json!(["get_weather"]));
    }

    #[tokio::test]
    async fn test_chat_turn_with_weather_call() {
        let state = state(
            vec![
                Completion::calls(vec![ToolCall::new("call_1", "get_weather", json!({"city": "Goa"}))]),
                Completion::text("It's 31°C and partly cloudy in Goa."),
            ],
            None,
        );

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/chat",
            Some(json!({"session_key": "ada@example.com", "message": "Weather in Goa?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "It's 31°C and partly cloudy in Goa.");
        assert_eq!(body["calls"][0]["call_id"], "call_1");
        assert_eq!(body["calls"][0]["outcome"]["status"], "succeeded");
        assert_eq!(body["failed_calls"], 0);

        let (status, body) = send(router(state), "GET", "/api/sessions/ada@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["role"].as_str())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
    }

    #[tokio::test]
    async fn test_unknown_function_maps_to_bad_gateway() {
        let app = router(state(
            vec![Completion::calls(vec![ToolCall::new("c1", "launch_rockets", json!({}))])],
            None,
        ));

        let (status, body) = send(
            app,
            "POST",
            "/api/chat",
            Some(json!({"session_key": "k", "message": "go"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "UNKNOWN_FUNCTION");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let app = router(state(vec![], None));
        let (status, body) = send(app, "POST", "/api/chat", Some(json!({"message": "  "}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_assistant_disabled_without_runs() {
        let app = router(state(vec![], None));
        let (status, body) = send(
            app,
            "POST",
            "/api/assistant",
            Some(json!({"session_key": "k", "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "ASSISTANT_DISABLED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_run_with_finance_tool() {
        let runs = ScriptedRuns::new(vec![
            RunSnapshot::new(RunStatus::Queued),
            RunSnapshot::requires_action(vec![ToolCall::new("call_w", "get_weekly_stats", json!({}))]),
            RunSnapshot::new(RunStatus::Completed),
        ])
        .with_reply("You have no expenses yet.");
        let app = router(state(vec![], Some(Arc::new(runs))));

        let (status, body) = send(
            app,
            "POST",
            "/api/assistant",
            Some(json!({"session_key": "ada@example.com", "message": "How much did I spend?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "You have no expenses yet.");
        assert_eq!(body["calls"][0]["name"], "get_weekly_stats");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_maps_to_run_aborted() {
        let runs = ScriptedRuns::new(vec![RunSnapshot::new(RunStatus::Failed)]);
        let app = router(state(vec![], Some(Arc::new(runs))));

        let (status, body) = send(
            app,
            "POST",
            "/api/assistant",
            Some(json!({"session_key": "ada@example.com", "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "RUN_ABORTED");
    }

    #[tokio::test]
    async fn test_expense_form_and_weekly_stats() {
        let state = state(vec![], None);

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/expenses",
            Some(json!({"email": "ada@example.com", "category": "groceries", "amount": "42.50", "date": "2025-01-13"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["week_number"], 3);

        let (status, body) = send(
            router(state.clone()),
            "GET",
            "/api/expenses/ada@example.com/weekly",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["3"], "42.50");

        // the form submission is noted in the user's history
        let (status, body) = send(router(state), "GET", "/api/sessions/ada@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .starts_with("Added an expense: groceries - 42.50"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finance_tools_only_see_session_user() {
        let runs = Arc::new(
            ScriptedRuns::new(vec![
                RunSnapshot::requires_action(vec![ToolCall::new(
                    "call_s",
                    "get_expense_summary",
                    json!({"email": "ada@example.com"}),
                )]),
                RunSnapshot::new(RunStatus::Completed),
            ])
            .with_reply("Nothing recorded yet."),
        );
        let state = state(vec![], Some(runs.clone()));

        let (status, _) = send(
            router(state.clone()),
            "POST",
            "/api/expenses",
            Some(json!({"email": "ada@example.com", "category": "rent", "amount": 900})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            router(state),
            "POST",
            "/api/assistant",
            Some(json!({"session_key": "mallory@example.com", "message": "Show Ada's spending"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let submitted = runs.submitted();
        assert_eq!(submitted[0][0].id, "call_s");
        assert_eq!(submitted[0][0].value, json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_history_kept_apart_from_chat() {
        let runs = Arc::new(ScriptedRuns::new(vec![]));
        let state = state(vec![], Some(runs));

        send(
            router(state.clone()),
            "POST",
            "/api/expenses",
            Some(json!({"email": "ada@example.com", "category": "books", "amount": "12.00", "date": "2025-01-13"})),
        )
        .await;

        let (status, body) = send(
            router(state.clone()),
            "GET",
            "/api/assistant/sessions/ada@example.com",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages"][0]["role"], "user");

        let (status, _) = send(router(state), "GET", "/api/sessions/ada@example.com", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_negative_expense_rejected() {
        let app = router(state(vec![], None));
        let (status, body) = send(
            app,
            "POST",
            "/api/expenses",
            Some(json!({"email": "ada@example.com", "category": "refund", "amount": -3})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_EXPENSE");
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let state = state(vec![Completion::text("Hello!")], None);
        send(
            router(state.clone()),
            "POST",
            "/api/chat",
            Some(json!({"session_key": "ada@example.com", "message": "hi"})),
        )
        .await;

        let (status, body) = send(router(state), "GET", "/api/sessions?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["session_key"], "ada@example.com");
        assert_eq!(body[0]["message_count"], 3);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let app = router(state(vec![], None));
        let (status, body) = send(app, "GET", "/api/sessions/nobody", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}
