use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::config::DashboardConfig;
use crate::error::Result;
use crate::session::{lock_session, Frame, RunState, SharedSession, ToggleOutcome};

#[derive(Clone)]
pub struct AppState {
    session: SharedSession,
    frames: Arc<watch::Sender<Frame>>,
    config: Arc<DashboardConfig>,
}

impl AppState {
    pub fn new(session: SharedSession, frames: Arc<watch::Sender<Frame>>, config: DashboardConfig) -> Self {
        Self {
            session,
            frames,
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
struct StatusReport {
    state: RunState,
    samples: usize,
    capacity: usize,
    source: &'static str,
    source_healthy: bool,
    refresh_interval_ms: u64,
    export_path: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/toggle", post(toggle_handler))
        .route("/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("[DASHBOARD] Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("dashboard_static.html"))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let frames = state.frames.subscribe();
    ws.on_upgrade(|socket| handle_socket(socket, frames))
}

/// Push the current frame, then every newer one, until the client goes away.
/// A slow client only ever sees the latest frame.
async fn handle_socket(socket: WebSocket, mut frames: watch::Receiver<Frame>) {
    let (mut sink, mut stream) = socket.split();

    let mut push = tokio::spawn(async move {
        loop {
            let json = serde_json::to_string(&*frames.borrow_and_update());
            match json {
                Ok(json) => {
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("[DASHBOARD] Failed to encode frame: {}", e);
                    break;
                }
            }
            if frames.changed().await.is_err() {
                break;
            }
        }
    });

    // Client messages are ignored; reading them surfaces the close
    let mut drain = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut push => drain.abort(),
        _ = &mut drain => push.abort(),
    }
}

async fn toggle_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<ToggleOutcome>, (StatusCode, String)> {
    // Stopping writes the CSV; keep that file I/O off the async workers
    let session = state.session.clone();
    let (outcome, frame) = tokio::task::spawn_blocking(move || {
        let mut session = lock_session(&session);
        let outcome = session.toggle();
        (outcome, session.frame())
    })
    .await
    .map_err(|e| {
        log::error!("[DASHBOARD] Toggle task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    state.frames.send_replace(frame);

    match outcome {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            log::error!("[DASHBOARD] Export failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusReport> {
    let session = lock_session(&state.session);
    Json(StatusReport {
        state: session.state(),
        samples: session.history().len(),
        capacity: session.history().capacity(),
        source: session.source_name(),
        source_healthy: session.source_healthy(),
        refresh_interval_ms: state.config.refresh_interval_ms,
        export_path: session.export_path().to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Simulator;
    use crate::session::Session;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use futures::Stream;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
    use tower::ServiceExt;

    fn test_state(export_path: PathBuf) -> (AppState, watch::Receiver<Frame>) {
        let config = DashboardConfig {
            export_path: export_path.clone(),
            capacity: 8,
            ..Default::default()
        };
        let session = Session::from_config(&config, Box::new(Simulator::seeded(11)));
        let (tx, rx) = watch::channel(session.frame());
        let state = AppState::new(Arc::new(Mutex::new(session)), Arc::new(tx), config);
        (state, rx)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("no frame within 5s")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_ws_pushes_current_then_changed_frames() {
        let (state, _rx) = test_state(PathBuf::from("unused.csv"));
        let session = state.session.clone();
        let frames = state.frames.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        let first = next_json(&mut ws).await;
        assert_eq!(first["state"], "stopped");
        assert_eq!(first["labels"]["toggle"], "▶ Start");
        assert!(first["sample"].is_null());

        let frame = {
            let mut session = lock_session(&session);
            session.start();
            session.tick().unwrap()
        };
        let sent_x = frame.sample.unwrap().x;
        frames.send_replace(frame);

        let second = next_json(&mut ws).await;
        assert_eq!(second["state"], "running");
        assert_eq!(second["labels"]["toggle"], "⏸ Stop");
        assert_eq!(second["sample"]["x"].as_f64(), Some(sent_x));
        assert_eq!(second["series"]["x"].as_array().map(|a| a.len()), Some(1));

        ws.close(None).await.unwrap();
        server.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_toggle_exports_large_history() {
        let path = std::env::temp_dir().join(format!(
            "compass_tester_dashboard_large_{}.csv",
            std::process::id()
        ));
        let config = DashboardConfig {
            export_path: path.clone(),
            capacity: 20_000,
            ..Default::default()
        };
        let mut session = Session::from_config(&config, Box::new(Simulator::seeded(2)));
        session.start();
        for _ in 0..20_000 {
            session.tick();
        }
        let (tx, _rx) = watch::channel(session.frame());
        let state = AppState::new(Arc::new(Mutex::new(session)), Arc::new(tx), config);

        let response = router(state)
            .oneshot(Request::builder().method("POST").uri("/toggle").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["export"]["rows"], 20_000);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 20_001);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_status_reports_session() {
        let (state, _rx) = test_state(PathBuf::from("unused.csv"));
        let response = router(state)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["samples"], 0);
        assert_eq!(body["capacity"], 8);
        assert_eq!(body["source"], "simulator");
        assert_eq!(body["source_healthy"], true);
        assert_eq!(body["refresh_interval_ms"], 500);
    }

    #[tokio::test]
    async fn test_toggle_starts_then_exports() {
        let path = std::env::temp_dir().join(format!(
            "compass_tester_dashboard_toggle_{}.csv",
            std::process::id()
        ));
        let (state, mut rx) = test_state(path.clone());
        let session = state.session.clone();

        let toggle = || Request::builder().method("POST").uri("/toggle").body(Body::empty()).unwrap();

        let response = router(state.clone()).oneshot(toggle()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["state"], "running");
        assert!(body["export"].is_null());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().labels.toggle, "⏸ Stop");

        for _ in 0..3 {
            lock_session(&session).tick();
        }

        let response = router(state).oneshot(toggle()).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["export"]["rows"], 3);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("X,Y,Z,Heading"));
        assert_eq!(text.lines().count(), 4);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_toggle_export_failure_is_500() {
        let path = std::env::temp_dir()
            .join("compass_tester_dashboard_missing")
            .join("out.csv");
        let (state, _rx) = test_state(path);
        lock_session(&state.session).start();

        let response = router(state)
            .oneshot(Request::builder().method("POST").uri("/toggle").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_index_serves_page() {
        let (state, _rx) = test_state(PathBuf::from("unused.csv"));
        let response = router(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("/toggle"));
        assert!(page.contains("/ws"));
    }
}
