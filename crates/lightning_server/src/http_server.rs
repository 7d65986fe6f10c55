use std::path::PathBuf;
use std::sync::{Arc, Weak};

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use lightning_core::{
    Engine, Note, Pattern, PlaybackError, Pos, Sequencer, crossbeam_channel::Receiver,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::protocol::{InputMessage, OutputMessage, deserialize_message, serialize_message};
use crate::samples::SamplePool;

const REPLY_QUEUE_CAPACITY: usize = 32;
const FLUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub sequencer: Arc<Sequencer>,
    pub samples: Arc<SamplePool>,
    pub engine: Arc<dyn Engine>,
    pub broadcast_tx: broadcast::Sender<OutputMessage>,
    pub web_root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    error: String,
}

// Build the Axum router
pub fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.web_root);
    Router::new()
        .route("/samples", get(list_samples))
        .route("/pattern", get(get_pattern))
        // WebSocket endpoint
        .route("/ws", get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        .fallback_service(static_files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// GET /samples - names of every loaded sample, sorted
async fn list_samples(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.samples.names())
}

// GET /pattern - copy of the current pattern
async fn get_pattern(State(state): State<AppState>) -> Result<Json<Pattern>, AppError> {
    let pattern = snapshot_pattern(&state)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read pattern: {}", e)))?;
    Ok(Json(pattern))
}

/// Copy of the pattern, taken on a blocking thread.
async fn snapshot_pattern(state: &AppState) -> Result<Pattern, tokio::task::JoinError> {
    let sequencer = state.sequencer.clone();
    tokio::task::spawn_blocking(move || sequencer.pattern()).await
}

// WebSocket handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(%conn_id, "controller connected");

    // Subscribe before splitting so no push is missed
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<OutputMessage>(REPLY_QUEUE_CAPACITY);
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        'conn: loop {
            // A reply goes out after every push queued before it, so a
            // position never trails the reply to the stop that ended it.
            let batch = tokio::select! {
                biased;
                reply = reply_rx.recv() => match reply {
                    Some(msg) => {
                        let mut batch = queued_pushes(&mut broadcast_rx, conn_id);
                        batch.push(msg);
                        batch
                    }
                    None => break,
                },
                pushed = broadcast_rx.recv() => match pushed {
                    Ok(msg) => vec![msg],
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%conn_id, skipped, "controller lagging, dropped pushes");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            for msg in batch {
                let json = match serialize_message(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    break 'conn;
                }
            }
        }
        let _ = sender.close().await;
    });

    // Handle incoming messages from the controller
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match deserialize_message::<InputMessage>(&text) {
                Ok(message) => {
                    let reply = handle_message(&state, message).await;
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%conn_id, "Failed to parse message: {}", e);
                    let reply = OutputMessage::error(format!("malformed message: {}", e));
                    let _ = reply_tx.send(reply).await;
                    break;
                }
            }
        }
    });

    // Wait for either task to complete (disconnect)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => {
            // reply_tx is gone, so the send task exits after flushing
            if tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    info!(%conn_id, "controller disconnected");
}

/// Run one controller command and build its reply.
pub async fn handle_message(state: &AppState, message: InputMessage) -> OutputMessage {
    match message {
        InputMessage::Start => match state.sequencer.start() {
            Ok(()) => OutputMessage::ok("pattern playing"),
            Err(e) => OutputMessage::error(e.to_string()),
        },
        InputMessage::Stop => {
            let sequencer = state.sequencer.clone();
            match tokio::task::spawn_blocking(move || sequencer.stop()).await {
                Ok(()) => OutputMessage::ok("pattern stopped"),
                Err(e) => OutputMessage::error(format!("stop failed: {}", e)),
            }
        }
        InputMessage::SetTempo { tempo, div } => {
            let div = div.unwrap_or_else(|| state.sequencer.bardiv());
            match state.sequencer.set_tempo(tempo, &div) {
                Ok(()) if state.sequencer.is_playing() => OutputMessage::ok(format!(
                    "tempo set to {} bpm in {}, restart to apply",
                    tempo, div
                )),
                Ok(()) => OutputMessage::ok(format!("tempo set to {} bpm in {}", tempo, div)),
                Err(e) => OutputMessage::error(e.to_string()),
            }
        }
        InputMessage::Edit { edits } => match state.sequencer.apply(&edits) {
            Ok(()) => OutputMessage::ok(format!("applied {} edits", edits.len())),
            Err(e) => OutputMessage::error(e.to_string()),
        },
        InputMessage::Clear { pos } => match state.sequencer.clear(pos) {
            Ok(()) => OutputMessage::ok(format!("cleared position {}", pos)),
            Err(e) => OutputMessage::error(e.to_string()),
        },
        InputMessage::GetPattern => match snapshot_pattern(state).await {
            Ok(pattern) => OutputMessage::Pattern { pattern },
            Err(e) => OutputMessage::error(format!("Failed to read pattern: {}", e)),
        },
        InputMessage::PlaySample {
            sample,
            number,
            velocity,
        } => play_sample(state, Note::new(sample, number, velocity)),
    }
}

fn play_sample(state: &AppState, note: Note) -> OutputMessage {
    let path = match state.samples.resolve(&note.sample) {
        Ok(path) => path,
        Err(e) => return OutputMessage::error(e.to_string()),
    };
    let resolved = note.with_sample(path.to_string_lossy());
    match state.engine.play_note(&resolved) {
        Ok(()) => OutputMessage::ok(format!("played {}", note.sample)),
        Err(e) => OutputMessage::error(e.to_string()),
    }
}

/// Pushes already waiting for this connection, oldest first.
fn queued_pushes(
    broadcast_rx: &mut broadcast::Receiver<OutputMessage>,
    conn_id: Uuid,
) -> Vec<OutputMessage> {
    let mut pushes = Vec::new();
    loop {
        match broadcast_rx.try_recv() {
            Ok(msg) => pushes.push(msg),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(%conn_id, skipped, "controller lagging, dropped pushes");
            }
            Err(_) => break,
        }
    }
    pushes
}

/// Fan tick positions out to every connected controller.
pub fn forward_positions(
    positions: Receiver<Pos>,
    broadcast_tx: broadcast::Sender<OutputMessage>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        for position in positions.iter() {
            // Ignore send errors (no subscribers is fine)
            let _ = broadcast_tx.send(OutputMessage::Position { position });
        }
    })
}

/// Stop the transport on a delivered playback error and tell every
/// controller about it.
pub fn forward_playback_errors(
    errors: Receiver<PlaybackError>,
    sequencer: Weak<Sequencer>,
    broadcast_tx: broadcast::Sender<OutputMessage>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        for err in errors.iter() {
            error!(error = %err, "playback failed, stopping sequencer");
            if let Some(sequencer) = sequencer.upgrade() {
                sequencer.stop();
            }
            let _ = broadcast_tx.send(OutputMessage::PlaybackError {
                message: err.to_string(),
            });
        }
    })
}

// Error handling
pub enum AppError {
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightning_core::{PatternEdit, SequencerConfig};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn test_state() -> (AppState, TempDir) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("kick.wav"), b"").unwrap();
        let samples = Arc::new(SamplePool::scan(dir.path()).unwrap());
        let engine: Arc<dyn Engine> = Arc::new(crate::engine::TraceEngine::new(
            dir.path(),
            samples.clone(),
        ));
        let config = SequencerConfig {
            length: 8,
            tempo: 600.0,
            bardiv: "1/32".to_string(),
            ..SequencerConfig::default()
        };
        let sequencer = Arc::new(Sequencer::new(engine.clone(), config).unwrap());
        let (broadcast_tx, _) = broadcast::channel(16);
        let state = AppState {
            sequencer,
            samples,
            engine,
            broadcast_tx,
            web_root: dir.path().to_path_buf(),
        };
        (state, dir)
    }

    fn message_of(reply: OutputMessage) -> String {
        match reply {
            OutputMessage::Ok { message } | OutputMessage::Error { message } => message,
            other => panic!("Expected status reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_tempo_keeps_divisor() {
        let (state, _dir) = test_state();
        let reply = handle_message(
            &state,
            InputMessage::SetTempo {
                tempo: 90.0,
                div: None,
            },
        )
        .await;
        assert!(matches!(reply, OutputMessage::Ok { .. }));
        assert_eq!(state.sequencer.tempo(), 90.0);
        assert_eq!(state.sequencer.bardiv(), "1/32");
    }

    #[tokio::test]
    async fn test_set_tempo_while_playing_asks_for_restart() {
        let (state, _dir) = test_state();
        handle_message(&state, InputMessage::Start).await;
        let reply = handle_message(
            &state,
            InputMessage::SetTempo {
                tempo: 300.0,
                div: Some("1/16".to_string()),
            },
        )
        .await;
        assert!(message_of(reply).ends_with("restart to apply"));
        handle_message(&state, InputMessage::Stop).await;
    }

    #[tokio::test]
    async fn test_set_tempo_rejects_bad_divisor() {
        let (state, _dir) = test_state();
        let reply = handle_message(
            &state,
            InputMessage::SetTempo {
                tempo: 120.0,
                div: Some("1/5".to_string()),
            },
        )
        .await;
        assert!(matches!(reply, OutputMessage::Error { .. }));
        assert_eq!(state.sequencer.bardiv(), "1/32");
    }

    #[tokio::test]
    async fn test_edit_then_clear() {
        let (state, _dir) = test_state();
        let edits = vec![PatternEdit::add(3, Note::new("kick", 1, 100))];
        let reply = handle_message(&state, InputMessage::Edit { edits }).await;
        assert_eq!(message_of(reply), "applied 1 edits");
        assert_eq!(state.sequencer.notes_at(3).len(), 1);

        let reply = handle_message(&state, InputMessage::Clear { pos: 3 }).await;
        assert!(matches!(reply, OutputMessage::Ok { .. }));
        assert!(state.sequencer.notes_at(3).is_empty());

        let reply = handle_message(&state, InputMessage::Clear { pos: 8 }).await;
        assert!(matches!(reply, OutputMessage::Error { .. }));
    }

    #[tokio::test]
    async fn test_play_sample_resolves_pool_name() {
        let (state, _dir) = test_state();
        let reply = handle_message(
            &state,
            InputMessage::PlaySample {
                sample: "kick".to_string(),
                number: 1,
                velocity: 100,
            },
        )
        .await;
        assert_eq!(message_of(reply), "played kick");

        let reply = handle_message(
            &state,
            InputMessage::PlaySample {
                sample: "kick.wav".to_string(),
                number: 1,
                velocity: 100,
            },
        )
        .await;
        assert_eq!(message_of(reply), "sample kick.wav does not exist");
    }

    #[tokio::test]
    async fn test_get_pattern_reply_reflects_edits() {
        let (state, _dir) = test_state();
        state.sequencer.add_to(5, Note::new("kick", 1, 100)).unwrap();
        match handle_message(&state, InputMessage::GetPattern).await {
            OutputMessage::Pattern { pattern } => {
                assert_eq!(pattern, state.sequencer.pattern());
                assert_eq!(pattern.notes_at(5), &[Some(Note::new("kick", 1, 100))]);
            }
            other => panic!("Expected Pattern reply, got {:?}", other),
        }
    }

    #[test]
    fn test_queued_pushes_come_out_in_order() {
        let (tx, mut rx) = broadcast::channel(8);
        for position in 0..3 {
            tx.send(OutputMessage::Position { position }).unwrap();
        }
        let pushes = queued_pushes(&mut rx, Uuid::new_v4());
        let positions: Vec<Pos> = pushes
            .into_iter()
            .map(|msg| match msg {
                OutputMessage::Position { position } => position,
                other => panic!("Expected Position, got {:?}", other),
            })
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert!(queued_pushes(&mut rx, Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_queued_pushes_skip_lagged_messages() {
        let (tx, mut rx) = broadcast::channel(2);
        for position in 0..5 {
            tx.send(OutputMessage::Position { position }).unwrap();
        }
        let pushes = queued_pushes(&mut rx, Uuid::new_v4());
        assert_eq!(pushes.len(), 2);
        assert!(matches!(pushes[1], OutputMessage::Position { position: 4 }));
    }

    #[tokio::test]
    async fn test_forward_positions_reaches_subscribers() {
        let (state, _dir) = test_state();
        let mut rx = state.broadcast_tx.subscribe();
        forward_positions(state.sequencer.positions(), state.broadcast_tx.clone());

        state.sequencer.start().unwrap();
        let pushed = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(pushed, OutputMessage::Position { .. }));

        let sequencer = state.sequencer.clone();
        tokio::task::spawn_blocking(move || sequencer.stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_playback_error_stops_transport() {
        let (state, _dir) = test_state();
        let mut rx = state.broadcast_tx.subscribe();
        forward_playback_errors(
            state.sequencer.errors(),
            Arc::downgrade(&state.sequencer),
            state.broadcast_tx.clone(),
        );

        state
            .sequencer
            .add_to(0, Note::new("missing", 1, 100))
            .unwrap();
        state.sequencer.start().unwrap();

        loop {
            let pushed = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if let OutputMessage::PlaybackError { message } = pushed {
                assert!(message.starts_with("could not play missing (1)"));
                break;
            }
        }
        assert!(!state.sequencer.is_playing());
    }
}
