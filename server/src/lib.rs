use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;
use wikiqa_core::config::EngineConfig;
use wikiqa_core::engine::QueryEngine;
use wikiqa_core::persist::{load_index, IndexPaths};
use wikiqa_core::ScoredResult;

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_LEN: usize = 300;

#[derive(Deserialize)]
pub struct AnswerParams {
    #[serde(default)]
    pub category: String,
    pub question: String,
}

#[derive(Serialize)]
pub struct AnswerResponse {
    pub category: String,
    pub question: String,
    /// Predicted doc id, empty when nothing matched.
    pub answer: String,
    pub found: bool,
    pub took_s: f64,
    pub snippet: Option<String>,
    pub candidates: Vec<ScoredResult>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
}

/// Loads the index at `index_dir` once; every request then reads it concurrently.
pub fn build_app(index_dir: &FsPath, config: EngineConfig) -> Result<Router> {
    let index = load_index(&IndexPaths::new(index_dir))?;
    Ok(router(Arc::new(QueryEngine::new(Arc::new(index), config))))
}

pub fn router(engine: Arc<QueryEngine>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/answer", get(answer_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(AppState { engine })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn answer_handler(State(state): State<AppState>, Query(params): Query<AnswerParams>) -> Result<Json<AnswerResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let engine = state.engine.clone();
    let (category, question) = (params.category.clone(), params.question.clone());
    // Scoring is CPU-bound; keep it off the async workers.
    let prediction = tokio::task::spawn_blocking(move || engine.answer(&category, &question))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("answer task failed: {e}")))?;

    let snippet = state
        .engine
        .index()
        .lookup(prediction.answer.doc_id())
        .and_then(|doc| snippet_from_text(&doc.field_text(wikiqa_core::Field::Text), &raw_terms(&params.question)));
    let elapsed = start.elapsed();
    Ok(Json(AnswerResponse {
        answer: prediction.answer.doc_id().to_string(),
        found: prediction.answer.is_found(),
        category: params.category,
        question: params.question,
        took_s: elapsed.as_secs_f64(),
        snippet,
        candidates: prediction.rescored,
    }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> (StatusCode, Json<serde_json::Value>) {
    match state.engine.index().lookup(&doc_id) {
        Some(doc) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "doc_id": doc.doc_id,
                "summary": doc.summary,
                "body": doc.body,
                "categories": doc.categories,
            })),
        ),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" }))),
    }
}

fn raw_terms(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() > 3)
        .map(|s| s.to_string())
        .collect()
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) { idx -= 1; }
    idx
}

/// Window of `text` around the first question word it contains, with every such word wrapped in `<em>`.
fn snippet_from_text(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let first_idx = raw_terms.iter().filter_map(|t| find_case_insensitive(text, t)).min();
    let snippet = match first_idx {
        Some(idx) => {
            let start = floor_boundary(text, idx.saturating_sub(SNIPPET_BEFORE));
            let end = floor_boundary(text, (start + SNIPPET_LEN).min(text.len()));
            &text[start..end]
        }
        None => &text[..floor_boundary(text, SNIPPET_LEN.min(text.len()))],
    };
    Some(highlight_terms(snippet, raw_terms))
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    regex::RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?
        .find(haystack)
        .map(|m| m.start())
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
