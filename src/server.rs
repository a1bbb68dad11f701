//! Inbound HTTP surface.
//!
//! Every `GET` is a feed request of the form `/<prefix>/<source>/<target...>`.
//! The first path segment is a mount prefix and is ignored. A successful
//! request answers with the pretty-printed RSS document; a failed one with
//! the error's plain-text message, the usage hint and a matching status.

use std::error::Error;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::FutureExt;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use crate::cli::Settings;
use crate::compose::Composer;
use crate::errors::{APOLOGY, RssGenError, USAGE_HINT};
use crate::fetch::Fetcher;
use crate::outputs;
use crate::scrapers::SourceRegistry;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SourceRegistry>,
    fetcher: Arc<Fetcher>,
    settings: Arc<Settings>,
}

impl AppState {
    pub fn new(registry: SourceRegistry, fetcher: Fetcher, settings: Settings) -> Self {
        Self {
            registry: Arc::new(registry),
            fetcher: Arc::new(fetcher),
            settings: Arc::new(settings),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(feed_handler))
        .route("/{*path}", get(feed_handler))
        .with_state(state)
}

/// Bind `addr` and serve feeds until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, sources = ?state.registry.names(), cache = ?state.settings.cache_mode, "Listening for feed requests");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn feed_handler(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    let self_link = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| format!("http://{host}{path}"));

    match AssertUnwindSafe(handle_request(&state, &path, self_link))
        .catch_unwind()
        .await
    {
        Ok(Ok(xml)) => (StatusCode::OK, [(CONTENT_TYPE, "text/xml")], xml).into_response(),
        Ok(Err(err)) => error_response(&path, &err),
        Err(_) => {
            error!(%path, "Feed request panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                APOLOGY,
            )
                .into_response()
        }
    }
}

fn error_response(path: &str, err: &RssGenError) -> Response {
    if err.is_internal() {
        error!(%path, error = %err, "Feed request failed");
    } else {
        warn!(%path, error = %err, "Feed request rejected");
    }
    let body = format!("{}\n\n{}", err.user_message(), USAGE_HINT);
    (
        err.status(),
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Split a request path into `(source, target)`.
///
/// Empty segments are ignored and each segment is percent-decoded. The target
/// is everything after the source, rejoined with `/`, so adapters see (and
/// reject) identifiers with path separators.
pub fn parse_request_path(path: &str) -> Result<(String, String), RssGenError> {
    let segments = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(1)
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .map_err(|_| RssGenError::MalformedRequest)
        })
        .collect::<Result<Vec<_>, _>>()?;

    match segments.split_first() {
        Some((source, target)) if !target.is_empty() => Ok((source.clone(), target.join("/"))),
        _ => Err(RssGenError::MalformedRequest),
    }
}

#[instrument(level = "info", skip(state, self_link))]
async fn handle_request(
    state: &AppState,
    path: &str,
    self_link: Option<String>,
) -> Result<String, RssGenError> {
    let (source, target) = parse_request_path(path)?;
    let adapter = state
        .registry
        .find(&source)
        .ok_or(RssGenError::UnknownSource(source))?;

    let composer = Composer::new(
        &state.fetcher,
        &state.settings.cache_root,
        state.settings.cache_mode,
    );
    let mut document = composer.compose(adapter, &target).await?;
    document.self_link = self_link;
    outputs::render(&document)
}
