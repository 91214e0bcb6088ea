mod error;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};

use ledger_core::events::EventFilter;
use ledger_core::{Address, Chain, HistoryEvent, HistoryEventType, IgnoredActionsManager};
use ledger_tasks::{NotificationHub, TaskManager};

use error::{map_task_error, AppError};

// ==============================================================================
// Application State
// ==============================================================================

pub struct AppState {
    pub manager: Arc<TaskManager>,
    pub ignored_actions: Arc<IgnoredActionsManager>,
    pub notify: Arc<NotificationHub>,
}

type SharedState = Arc<AppState>;

// ==============================================================================
// Router
// ==============================================================================

pub fn build_router(state: AppState, origin: &str) -> Router {
    let allowed: axum::http::HeaderValue = origin.parse().expect("valid origin header value");
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate({
            let allowed = allowed.clone();
            move |request_origin: &axum::http::HeaderValue, _| *request_origin == allowed
        }))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let shared = Arc::new(state);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/accounts", post(add_accounts).delete(remove_accounts))
        .route("/api/v1/transactions/query", post(query_transactions))
        .route("/api/v1/events", get(get_events))
        .route(
            "/api/v1/ignored-actions",
            post(ignore_actions).delete(unignore_actions),
        )
        .route("/api/v1/ws", get(ws_upgrade))
        .layer(cors)
        .with_state(shared)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ==============================================================================
// Chain (de)serialization
// ==============================================================================

/// Parses the `btc` / `bch` / `evm:1` strings `Chain`'s `Display` impl
/// produces, the inverse of `types::Chain`'s own formatting.
fn parse_chain(raw: &str) -> Result<Chain, AppError> {
    match raw {
        "btc" => Ok(Chain::Btc),
        "bch" => Ok(Chain::Bch),
        other => other
            .strip_prefix("evm:")
            .and_then(|id| id.parse::<u64>().ok())
            .map(Chain::Evm)
            .ok_or_else(|| AppError::BadRequest(format!("invalid chain: {other}"))),
    }
}

fn parse_event_type(raw: &str) -> Result<HistoryEventType, AppError> {
    match raw {
        "spend" => Ok(HistoryEventType::Spend),
        "receive" => Ok(HistoryEventType::Receive),
        "transfer" => Ok(HistoryEventType::Transfer),
        "deposit" => Ok(HistoryEventType::Deposit),
        "withdrawal" => Ok(HistoryEventType::Withdrawal),
        "trade" => Ok(HistoryEventType::Trade),
        "staking" => Ok(HistoryEventType::Staking),
        "informational" => Ok(HistoryEventType::Informational),
        other => Err(AppError::BadRequest(format!("invalid event_type: {other}"))),
    }
}

// ==============================================================================
// Accounts
// ==============================================================================

#[derive(Deserialize)]
struct AccountsRequest {
    chain: String,
    addresses: Vec<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// `add_accounts(chain, [address], metadata)` (spec.md section 6, Inbound).
async fn add_accounts(
    State(state): State<SharedState>,
    Json(req): Json<AccountsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let chain = parse_chain(&req.chain)?;
    let addresses = req
        .addresses
        .into_iter()
        .map(|addr| Address::new(chain, addr))
        .collect();

    state.manager.add_accounts(chain, addresses, req.metadata).await;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// `remove_accounts(chain, [address])` (spec.md section 6, Inbound).
async fn remove_accounts(
    State(state): State<SharedState>,
    Json(req): Json<AccountsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let chain = parse_chain(&req.chain)?;
    let addresses: Vec<Address> = req
        .addresses
        .into_iter()
        .map(|addr| Address::new(chain, addr))
        .collect();

    state.manager.remove_accounts(chain, &addresses).await;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// ==============================================================================
// Transactions / events
// ==============================================================================

#[derive(Deserialize)]
struct QueryTransactionsRequest {
    chain: String,
    address: Option<String>,
    from_ts: Option<i64>,
    to_ts: Option<i64>,
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<HistoryEvent>,
}

/// `query_transactions({chain?, address?, from_ts?, to_ts?, async})`. This
/// wiring is always synchronous; the `async` flag from spec.md section 6
/// has no counterpart here since there's no separate polling endpoint.
async fn query_transactions(
    State(state): State<SharedState>,
    Json(req): Json<QueryTransactionsRequest>,
) -> Result<Json<EventsResponse>, AppError> {
    let chain = parse_chain(&req.chain)?;
    let address = req.address.map(|addr| Address::new(chain, addr));

    let events = state
        .manager
        .query_transactions(chain, address, req.from_ts, req.to_ts)
        .await
        .map_err(map_task_error)?;

    Ok(Json(EventsResponse { events }))
}

#[derive(Deserialize)]
struct EventsQuery {
    chain: Option<String>,
    address: Option<String>,
    event_type: Option<String>,
    from_ts: Option<i64>,
    to_ts: Option<i64>,
}

/// `get_events(filter)` — read-only against component H.
async fn get_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, AppError> {
    let chain = query.chain.as_deref().map(parse_chain).transpose()?;
    let event_type = query
        .event_type
        .as_deref()
        .map(parse_event_type)
        .transpose()?;

    let filter = EventFilter {
        chain,
        address: query.address,
        event_type,
        from_ts: query.from_ts,
        to_ts: query.to_ts,
    };

    Ok(Json(EventsResponse {
        events: state.manager.get_events(filter).await,
    }))
}

// ==============================================================================
// Ignored actions
// ==============================================================================

#[derive(Deserialize)]
struct IgnoredActionsRequest {
    action_type: String,
    external_ids: Vec<String>,
}

/// `ignore_actions({action_type, ids})` (spec.md section 6, Inbound).
async fn ignore_actions(
    State(state): State<SharedState>,
    Json(req): Json<IgnoredActionsRequest>,
) -> Json<serde_json::Value> {
    state
        .ignored_actions
        .ignore(&req.action_type, &req.external_ids)
        .await;
    Json(serde_json::json!({ "status": "ok" }))
}

/// `unignore_actions(…)` (spec.md section 6, Inbound).
async fn unignore_actions(
    State(state): State<SharedState>,
    Json(req): Json<IgnoredActionsRequest>,
) -> Json<serde_json::Value> {
    state
        .ignored_actions
        .unignore(&req.action_type, &req.external_ids)
        .await;
    Json(serde_json::json!({ "status": "ok" }))
}

// ==============================================================================
// Websocket notification channel
// ==============================================================================

/// `GET /ws` relays whatever the task manager's `NotificationHub`
/// broadcasts (spec.md section 6, Websocket notification channel
/// subsection) to this client as `{type, data}` JSON frames.
async fn ws_upgrade(State(state): State<SharedState>, ws: WebSocketUpgrade) -> Response {
    let notify = state.notify.clone();
    ws.on_upgrade(move |socket| relay_notifications(socket, notify))
}

async fn relay_notifications(mut socket: WebSocket, notify: Arc<NotificationHub>) {
    let mut receiver = notify.subscribe();
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
            notification = receiver.recv() => {
                let notification = match notification {
                    Ok(n) => n,
                    // A slow client missed some messages; keep relaying
                    // rather than dropping the connection.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let payload = match serde_json::to_string(&notification) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize notification");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
