// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Interactive trigger: an HTTP endpoint editors call to sync a record
//! they just saved, without waiting for the next scheduled run.
//!
//! `POST /api/sync` accepts a JSON body; the response is either a JSON
//! report or, when the caller sends `Accept: text/event-stream`, a
//! server-sent event stream of progress events terminated by a `complete`
//! or `error` event. Any other method on the route gets the router's
//! automatic 405.
//!
//! Request body (field names match the source store's webhook payloads):
//!
//! ```json
//! {
//!   "documentId": "aw-17",
//!   "documentType": "artwork",
//!   "syncType": "single",
//!   "autoPublish": true,
//!   "bulk": false
//! }
//! ```

use crate::client::TargetApi;
use crate::coordinator::{ProgressEvent, SyncEngine, SyncReport};
use crate::error::{Result, SyncError};
use crate::record::RecordType;
use crate::source::SourceStore;
use crate::store::MappingStore;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Trigger request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    /// "single" (default) or "full".
    #[serde(default = "default_sync_type")]
    pub sync_type: String,
    #[serde(default)]
    pub auto_publish: bool,
    /// Legacy alias for a full run.
    #[serde(default)]
    pub bulk: bool,
}

fn default_sync_type() -> String {
    "single".to_string()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    timestamp: i64,
}

fn error_response(status: StatusCode, message: String) -> Response {
    let body = ErrorBody {
        error: status.canonical_reason().unwrap_or("error"),
        message,
        timestamp: unix_now(),
    };
    (status, Json(body)).into_response()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Build the trigger router around a shared engine.
pub fn router<A, S, M>(engine: Arc<SyncEngine<A, S, M>>) -> Router
where
    A: TargetApi,
    S: SourceStore,
    M: MappingStore,
{
    Router::new()
        .route("/api/sync", post(trigger_sync::<A, S, M>))
        .with_state(engine)
}

/// Bind and serve the trigger until the process is stopped.
pub async fn serve<A, S, M>(engine: Arc<SyncEngine<A, S, M>>, port: u16) -> Result<()>
where
    A: TargetApi,
    S: SourceStore,
    M: MappingStore,
{
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| SyncError::Internal(format!("bind port {port}: {e}")))?;
    info!(port, "trigger listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| SyncError::Internal(format!("server error: {e}")))
}

async fn trigger_sync<A, S, M>(
    State(engine): State<Arc<SyncEngine<A, S, M>>>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Response
where
    A: TargetApi,
    S: SourceStore,
    M: MappingStore,
{
    let run = match plan(&request) {
        Ok(run) => run,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let wants_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    if wants_stream {
        stream_run(engine, run).into_response()
    } else {
        match execute(engine.as_ref().clone(), run).await {
            Ok(report) => Json(report).into_response(),
            Err(e) => {
                error!(error = %e, "triggered run failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

/// What a request asks the engine to do.
#[derive(Debug)]
enum PlannedRun {
    Full,
    Single {
        document_id: String,
        record_type: RecordType,
        auto_publish: bool,
    },
}

fn plan(request: &SyncRequest) -> std::result::Result<PlannedRun, String> {
    if request.bulk || request.sync_type == "full" {
        return Ok(PlannedRun::Full);
    }
    if request.sync_type != "single" {
        return Err(format!("unknown syncType {:?}", request.sync_type));
    }
    let document_id = request
        .document_id
        .clone()
        .ok_or_else(|| "documentId is required for a single sync".to_string())?;
    let type_name = request
        .document_type
        .as_deref()
        .ok_or_else(|| "documentType is required for a single sync".to_string())?;
    let record_type = RecordType::parse(type_name)
        .ok_or_else(|| format!("unknown documentType {type_name:?}"))?;
    Ok(PlannedRun::Single {
        document_id,
        record_type,
        auto_publish: request.auto_publish,
    })
}

async fn execute<A, S, M>(engine: SyncEngine<A, S, M>, run: PlannedRun) -> Result<SyncReport>
where
    A: TargetApi,
    S: SourceStore,
    M: MappingStore,
{
    match run {
        PlannedRun::Full => engine.run_full().await,
        PlannedRun::Single {
            document_id,
            record_type,
            auto_publish,
        } => {
            engine
                .run_single(&document_id, record_type, auto_publish)
                .await
        }
    }
}

/// Items flowing to the SSE encoder. Terminal variants close the stream.
enum StreamItem {
    Progress(ProgressEvent),
    Complete(SyncReport),
    Failed(String),
}

fn stream_run<A, S, M>(
    engine: Arc<SyncEngine<A, S, M>>,
    run: PlannedRun,
) -> Sse<impl futures::Stream<Item = std::result::Result<Event, std::convert::Infallible>>>
where
    A: TargetApi,
    S: SourceStore,
    M: MappingStore,
{
    let (item_tx, item_rx) = mpsc::unbounded_channel::<StreamItem>();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<StreamItem>();

    // Run the sync. The engine clone owns the progress sender, so the
    // progress channel closes the moment the run finishes.
    tokio::spawn(async move {
        let engine = engine.as_ref().clone().with_progress(progress_tx);
        let item = match execute(engine, run).await {
            Ok(report) => StreamItem::Complete(report),
            Err(e) => {
                error!(error = %e, "triggered run failed");
                StreamItem::Failed(e.to_string())
            }
        };
        let _ = done_tx.send(item);
    });

    // Single forwarding path: drain every progress event, then the
    // terminal item, so `complete`/`error` is always the last event.
    // Dropping the sender ends the stream.
    tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            if item_tx.send(StreamItem::Progress(event)).is_err() {
                return;
            }
        }
        if let Ok(item) = done_rx.await {
            let _ = item_tx.send(item);
        }
    });

    let stream = futures::stream::unfold(item_rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((Ok(encode(item)), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn encode(item: StreamItem) -> Event {
    match item {
        StreamItem::Progress(event) => json_event("progress", &event),
        StreamItem::Complete(report) => json_event("complete", &report),
        StreamItem::Failed(message) => {
            let body = ErrorBody {
                error: "sync failed",
                message,
                timestamp: unix_now(),
            };
            json_event("error", &body)
        }
    }
}

fn json_event<T: Serialize>(name: &str, data: &T) -> Event {
    match serde_json::to_string(data) {
        Ok(json) => Event::default().event(name).data(json),
        Err(e) => Event::default().event("error").data(format!("encode: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_defaults_to_single() {
        let request: SyncRequest = serde_json::from_str(
            r#"{"documentId": "aw-1", "documentType": "artwork"}"#,
        )
        .unwrap();
        match plan(&request).unwrap() {
            PlannedRun::Single {
                document_id,
                record_type,
                auto_publish,
            } => {
                assert_eq!(document_id, "aw-1");
                assert_eq!(record_type, RecordType::Artwork);
                assert!(!auto_publish);
            }
            PlannedRun::Full => panic!("expected single run"),
        }
    }

    #[test]
    fn test_plan_bulk_is_full_run() {
        let request: SyncRequest = serde_json::from_str(r#"{"bulk": true}"#).unwrap();
        assert!(matches!(plan(&request).unwrap(), PlannedRun::Full));

        let request: SyncRequest = serde_json::from_str(r#"{"syncType": "full"}"#).unwrap();
        assert!(matches!(plan(&request).unwrap(), PlannedRun::Full));
    }

    #[test]
    fn test_plan_rejects_missing_document_fields() {
        let request: SyncRequest = serde_json::from_str(r#"{"syncType": "single"}"#).unwrap();
        assert!(plan(&request).unwrap_err().contains("documentId"));

        let request: SyncRequest =
            serde_json::from_str(r#"{"documentId": "x"}"#).unwrap();
        assert!(plan(&request).unwrap_err().contains("documentType"));
    }

    #[test]
    fn test_plan_rejects_unknown_type() {
        let request: SyncRequest = serde_json::from_str(
            r#"{"documentId": "x", "documentType": "widget"}"#,
        )
        .unwrap();
        assert!(plan(&request).unwrap_err().contains("widget"));

        let request: SyncRequest =
            serde_json::from_str(r#"{"syncType": "sideways"}"#).unwrap();
        assert!(plan(&request).unwrap_err().contains("sideways"));
    }

    #[test]
    fn test_request_auto_publish_flag() {
        let request: SyncRequest = serde_json::from_str(
            r#"{"documentId": "ex-1", "documentType": "exhibition", "autoPublish": true}"#,
        )
        .unwrap();
        match plan(&request).unwrap() {
            PlannedRun::Single { auto_publish, .. } => assert!(auto_publish),
            PlannedRun::Full => panic!("expected single run"),
        }
    }
}
