//! JSON HTTP API over the query service.

use crate::error::{Result, WnError};
use crate::models::{AntonymEntry, LemmaEntry, PartOfSpeech, SynonymEntry};
use crate::parse::normalize_lemma;
use crate::query::QueryService;
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// Raw query pairs of a lookup request. A repeated `word` resolves to its
/// first occurrence.
type QueryPairs = std::result::Result<Query<Vec<(String, String)>>, QueryRejection>;

#[derive(Debug)]
pub struct WordParams {
    pub word: Option<String>,
}

impl WordParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        WordParams {
            word: pairs
                .into_iter()
                .find_map(|(key, value)| (key == "word").then_some(value)),
        }
    }

    /// Returns the raw word and its normalized form.
    fn require(self, path: &'static str) -> std::result::Result<(String, String), ApiError> {
        let Some(raw) = self.word else {
            return Err(ApiError::MissingWord { path, received: None });
        };
        match normalize_lemma(&raw) {
            Some(lemma) => Ok((raw, lemma)),
            None => Err(ApiError::MissingWord {
                path,
                received: Some(raw),
            }),
        }
    }
}

fn word_from_query(
    pairs: QueryPairs,
    path: &'static str,
) -> std::result::Result<(String, String), ApiError> {
    match pairs {
        Ok(Query(pairs)) => WordParams::from_pairs(pairs).require(path),
        Err(rejection) => {
            info!("Rejected query string on {}: {}", path, rejection);
            Err(ApiError::MissingWord { path, received: None })
        }
    }
}

// =============================================================================
// RESPONSE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LemmaResponse<T> {
    pub lemma: String,
    pub entries: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct PosResponse {
    pub lemma: String,
    #[serde(rename = "partsOfSpeech")]
    pub parts_of_speech: Vec<PartOfSpeech>,
}

#[derive(Debug)]
pub enum ApiError {
    /// `word` absent or blank on `path`; carries what was received.
    MissingWord {
        path: &'static str,
        received: Option<String>,
    },
    /// Carries the word as the client sent it.
    NotFound(String),
    Internal(WnError),
}

impl ApiError {
    fn from_query(err: WnError, path: &'static str, raw: &str) -> Self {
        match err {
            WnError::LemmaNotFound(_) => ApiError::NotFound(raw.to_string()),
            WnError::InvalidArgument(_) => ApiError::MissingWord {
                path,
                received: Some(raw.to_string()),
            },
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingWord { path, received } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Missing required \"word\" query parameter",
                    "details": format!("Use {}?word=example to fetch data for a specific lemma.", path),
                    "received": received,
                })),
            )
                .into_response(),
            ApiError::NotFound(raw) => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!("Word \"{}\" was not found in the dictionary.", raw),
                })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!("Request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Unexpected server error" })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// =============================================================================
// HANDLERS
// =============================================================================

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/healthz", "/define", "/synonyms", "/antonyms", "/pos"],
    }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn define(
    State(query): State<QueryService>,
    pairs: QueryPairs,
) -> ApiResult<LemmaResponse<LemmaEntry>> {
    let (raw, lemma) = word_from_query(pairs, "/define")?;
    let entries = query
        .definitions_for(&lemma)
        .await
        .map_err(|e| ApiError::from_query(e, "/define", &raw))?;
    Ok(Json(LemmaResponse { lemma, entries }))
}

async fn synonyms(
    State(query): State<QueryService>,
    pairs: QueryPairs,
) -> ApiResult<LemmaResponse<SynonymEntry>> {
    let (raw, lemma) = word_from_query(pairs, "/synonyms")?;
    let entries = query
        .synonyms_for(&lemma)
        .await
        .map_err(|e| ApiError::from_query(e, "/synonyms", &raw))?;
    Ok(Json(LemmaResponse { lemma, entries }))
}

async fn antonyms(
    State(query): State<QueryService>,
    pairs: QueryPairs,
) -> ApiResult<LemmaResponse<AntonymEntry>> {
    let (raw, lemma) = word_from_query(pairs, "/antonyms")?;
    let entries = query
        .antonyms_for(&lemma)
        .await
        .map_err(|e| ApiError::from_query(e, "/antonyms", &raw))?;
    Ok(Json(LemmaResponse { lemma, entries }))
}

async fn parts_of_speech(
    State(query): State<QueryService>,
    pairs: QueryPairs,
) -> ApiResult<PosResponse> {
    let (raw, lemma) = word_from_query(pairs, "/pos")?;
    let parts_of_speech = query
        .parts_of_speech_for(&lemma)
        .await
        .map_err(|e| ApiError::from_query(e, "/pos", &raw))?;
    Ok(Json(PosResponse {
        lemma,
        parts_of_speech,
    }))
}

async fn route_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
        .into_response()
}

// =============================================================================
// ROUTER
// =============================================================================

pub fn build_router(query: QueryService) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/define", get(define))
        .route("/synonyms", get(synonyms))
        .route("/antonyms", get(antonyms))
        .route("/pos", get(parts_of_speech))
        .fallback(route_not_found)
        .with_state(query)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

/// Serves the API on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, query: QueryService) -> Result<()> {
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(query))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
