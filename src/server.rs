//! Read-only JSON API.
//!
//! Requests are received on a blocking `tiny_http` server and answered one
//! at a time. Routing is a pure function so it can be tested without a
//! socket.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::analysis::{CoalitionParams, OutlierParams};
use crate::models::Chamber;
use crate::report::{build_snapshot, SnapshotCache};
use crate::store::Store;

/// A parsed API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    Summary,
    Members(Option<Chamber>),
    Bills(Option<Chamber>),
    Rollcalls(Option<Chamber>),
    Votes(String),
    Cosponsors(String),
    Analysis { congress: i64, chamber: Chamber },
    ClearCache,
}

/// A response ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != name {
            return None;
        }
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

fn chamber_param(query: &str) -> Result<Option<Chamber>, ApiResponse> {
    match query_param(query, "chamber").filter(|c| !c.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<Chamber>()
            .map(Some)
            .map_err(|e| ApiResponse::error(400, e)),
    }
}

fn path_segment(raw: &str) -> Result<String, ApiResponse> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| ApiResponse::error(400, format!("Invalid path segment: {}", raw)))
}

/// Map a method and URL to a route, or the error response to send.
pub fn route(method: &str, url: &str) -> Result<Route, ApiResponse> {
    if method != "GET" {
        return Err(ApiResponse::error(405, format!("Method {} not allowed", method)));
    }
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match segments.as_slice() {
        ["api", "health"] => Ok(Route::Health),
        ["api", "summary"] => Ok(Route::Summary),
        ["api", "members"] => Ok(Route::Members(chamber_param(query)?)),
        ["api", "bills"] => Ok(Route::Bills(chamber_param(query)?)),
        ["api", "rollcalls"] => Ok(Route::Rollcalls(chamber_param(query)?)),
        ["api", "votes", id] if !id.is_empty() => Ok(Route::Votes(path_segment(id)?)),
        ["api", "cosponsors", id] if !id.is_empty() => Ok(Route::Cosponsors(path_segment(id)?)),
        ["api", "analysis", congress, chamber] => {
            let congress = congress
                .parse::<i64>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| ApiResponse::error(400, format!("Invalid congress: {}", congress)))?;
            let chamber = chamber
                .parse::<Chamber>()
                .map_err(|e| ApiResponse::error(400, e))?;
            Ok(Route::Analysis { congress, chamber })
        }
        ["api", "cache", "clear"] => Ok(Route::ClearCache),
        _ => Err(ApiResponse::error(404, format!("Not found: {}", path))),
    }
}

/// What the handlers need.
pub struct ApiState {
    pub store: Store,
    pub cache: SnapshotCache,
    pub outlier_params: OutlierParams,
    pub coalition_params: CoalitionParams,
}

async fn dispatch(state: &ApiState, route: Route) -> Result<ApiResponse> {
    let response = match route {
        Route::Health => ApiResponse::ok(json!({ "status": "ok" })),
        Route::Summary => ApiResponse::ok(serde_json::to_value(state.store.table_counts().await?)?),
        Route::Members(chamber) => {
            let members = state.store.member_activity(chamber).await?;
            ApiResponse::ok(json!({ "count": members.len(), "members": members }))
        }
        Route::Bills(chamber) => {
            let bills = state.store.bill_listings(chamber).await?;
            ApiResponse::ok(json!({ "count": bills.len(), "bills": bills }))
        }
        Route::Rollcalls(chamber) => {
            let rollcalls = state.store.rollcall_tallies(chamber).await?;
            ApiResponse::ok(json!({ "count": rollcalls.len(), "rollcalls": rollcalls }))
        }
        Route::Votes(rollcall_id) => match state.store.get_rollcall(&rollcall_id).await? {
            None => ApiResponse::error(404, format!("Roll call not found: {}", rollcall_id)),
            Some(rollcall) => {
                let votes = state.store.rollcall_positions(&rollcall_id).await?;
                ApiResponse::ok(json!({ "rollcall": rollcall, "votes": votes }))
            }
        },
        Route::Cosponsors(bill_id) => match state.store.get_bill(&bill_id).await? {
            None => ApiResponse::error(404, format!("Bill not found: {}", bill_id)),
            Some(bill) => {
                let cosponsors = state.store.cosponsor_positions(&bill_id).await?;
                ApiResponse::ok(json!({ "bill": bill, "cosponsors": cosponsors }))
            }
        },
        Route::Analysis { congress, chamber } => analysis(state, congress, chamber).await?,
        Route::ClearCache => {
            let removed = state.cache.clear()?;
            ApiResponse::ok(json!({ "status": "cleared", "removed": removed }))
        }
    };
    Ok(response)
}

async fn analysis(state: &ApiState, congress: i64, chamber: Chamber) -> Result<ApiResponse> {
    let (snapshot, cached) = match state.cache.load_fresh(congress, chamber) {
        Some(snapshot) => {
            info!("Serving cached analysis for Congress {} {}", congress, chamber);
            (snapshot, true)
        }
        None => {
            info!("Running fresh analysis for Congress {} {}", congress, chamber);
            let snapshot = build_snapshot(
                &state.store,
                congress,
                chamber,
                &state.outlier_params,
                &state.coalition_params,
            )
            .await?;
            if let Err(e) = state.cache.save(&snapshot) {
                warn!("Failed to cache analysis: {:#}", e);
            }
            (snapshot, false)
        }
    };

    let mut body = serde_json::to_value(&snapshot)?;
    if let Value::Object(ref mut map) = body {
        map.insert("cached".to_string(), Value::Bool(cached));
    }
    Ok(ApiResponse::ok(body))
}

/// Answer one request. Failures become 500 responses.
pub async fn handle(state: &ApiState, method: &str, url: &str) -> ApiResponse {
    let route = match route(method, url) {
        Ok(route) => route,
        Err(response) => return response,
    };
    debug!("{} {} -> {:?}", method, url, route);
    match dispatch(state, route).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request {} failed: {:#}", url, e);
            ApiResponse::error(500, format!("{:#}", e))
        }
    }
}

fn respond(request: tiny_http::Request, response: ApiResponse) {
    let body = response.body.to_string();
    let mut http = tiny_http::Response::from_string(body).with_status_code(response.status);
    if let Ok(header) = tiny_http::Header::from_bytes("Content-Type", "application/json") {
        http = http.with_header(header);
    }
    if let Err(e) = request.respond(http) {
        warn!("Failed to send response: {}", e);
    }
}

/// Serve until the listener fails.
pub async fn serve(state: ApiState, addr: &str) -> Result<()> {
    let server = tiny_http::Server::http(addr)
        .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
    let server = Arc::new(server);
    info!("API listening on http://{}", addr);

    loop {
        // recv() blocks, so wait for it off the runtime threads.
        let listener = Arc::clone(&server);
        let request = tokio::task::spawn_blocking(move || listener.recv())
            .await
            .context("Listener task failed")?
            .context("Failed to receive request")?;

        let method = request.method().to_string().to_uppercase();
        let url = request.url().to_string();
        let response = handle(&state, &method, &url).await;
        info!("{} {} {}", method, url, response.status);
        respond(request, response);
    }
}
