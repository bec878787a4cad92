use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ScrapeError;
use crate::scraper::ProxyTarget;

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api", get(api))
        .route("/proxy", get(proxy))
        .route("/healthz", get(health))
}

#[derive(Serialize)]
struct ApiResult<T> {
    code: u16,
    res: T,
}

#[derive(Serialize)]
struct ApiError {
    code: u16,
    error: String,
}

fn res<T: Serialize>(value: T) -> Response {
    Json(ApiResult {
        code: StatusCode::OK.as_u16(),
        res: value,
    })
    .into_response()
}

fn err(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiError {
            code: status.as_u16(),
            error: message.into(),
        }),
    )
        .into_response()
}

fn scrape_error(e: &ScrapeError) -> Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
    } else {
        tracing::warn!(error = %e, "Request rejected");
    }
    err(status, format!("Error: {e}"))
}

fn respond<T: Serialize>(result: crate::Result<T>) -> Response {
    match result {
        Ok(value) => res(value),
        Err(e) => scrape_error(&e),
    }
}

/// No configured key means the endpoint is open.
fn authorized(state: &AppState, key: Option<&str>) -> bool {
    match state.config.api_key.as_deref() {
        Some(expected) => key == Some(expected),
        None => true,
    }
}

// ========== API ==========

#[derive(Debug, Default, Deserialize)]
pub struct ApiParams {
    action: Option<String>,
    key: Option<String>,
    username: Option<String>,
    year: Option<String>,
    limit: Option<String>,
    #[serde(rename = "fetchContent")]
    fetch_content: Option<String>,
    id: Option<String>,
}

async fn api(State(state): State<AppState>, Query(params): Query<ApiParams>) -> Response {
    if !authorized(&state, params.key.as_deref()) {
        return err(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let Some(action) = params.action.as_deref() else {
        return err(StatusCode::BAD_REQUEST, "Bad request: missing \"action\" string parameter");
    };

    match action {
        "getTimelineYears" => {
            let Some(username) = params.username.as_deref() else {
                return missing("username");
            };
            respond(state.scraper.get_timeline_years(username).await)
        }
        "getTimelinePosts" => {
            let Some(username) = params.username.as_deref() else {
                return missing("username");
            };
            let year = match parse_optional::<i32>(params.year.as_deref()) {
                Ok(year) => year,
                Err(()) => return invalid("year"),
            };
            let limit = match parse_optional::<usize>(params.limit.as_deref()) {
                Ok(limit) => limit,
                Err(()) => return invalid("limit"),
            };
            let fetch_content = params.fetch_content.as_deref().is_some_and(is_truthy);
            respond(
                state
                    .scraper
                    .get_timeline_posts(username, year, limit, fetch_content)
                    .await,
            )
        }
        "getPost" => {
            let Some(id) = params.id.as_deref() else {
                return missing("id");
            };
            respond(state.scraper.get_post(id).await)
        }
        _ => err(StatusCode::BAD_REQUEST, "Bad request: unknown action"),
    }
}

fn missing(name: &str) -> Response {
    err(
        StatusCode::BAD_REQUEST,
        format!("Bad request: missing \"{name}\" string parameter"),
    )
}

fn invalid(name: &str) -> Response {
    err(
        StatusCode::BAD_REQUEST,
        format!("Bad request: \"{name}\" must be a number"),
    )
}

/// Empty counts as absent.
fn parse_optional<T: std::str::FromStr>(value: Option<&str>) -> Result<Option<T>, ()> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse().map(Some).map_err(|_| ()),
        None => Ok(None),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ========== Proxy ==========

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    url: Option<String>,
    t: Option<String>,
    key: Option<String>,
}

async fn proxy(State(state): State<AppState>, Query(params): Query<ProxyParams>) -> Response {
    // A signed token is its own authorisation.
    let target = match (params.t, params.url) {
        (Some(token), _) => ProxyTarget::Signed(token),
        (None, Some(url)) => {
            if !authorized(&state, params.key.as_deref()) {
                return err(StatusCode::UNAUTHORIZED, "Unauthorized");
            }
            ProxyTarget::Direct(url)
        }
        (None, None) => {
            return err(
                StatusCode::BAD_REQUEST,
                "Bad request: missing \"url\" or \"t\" parameter",
            );
        }
    };

    match state.scraper.http_get(target).await {
        Ok(upstream) => {
            let mut response = Response::new(Body::from_stream(upstream.body));
            *response.status_mut() = upstream.status;
            *response.headers_mut() = upstream.headers;
            response
        }
        Err(e) => scrape_error(&e),
    }
}

async fn health() -> &'static str {
    "OK"
}
