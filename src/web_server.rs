use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::MultipartError,
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router, // Use axum::serve instead of axum::Server
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::constants::MAX_UPLOAD_BYTES;
use crate::controller::TurnOutcome;
use crate::error::SessionError;
use crate::schema::Category;
use crate::session::{run_idle_sweeper, SessionManager};

// Messages sent to WebSocket clients
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerMessage {
    pub message_type: String, // Info, Reply, State or Error
    pub payload: serde_json::Value,
}

impl ServerMessage {
    fn new(message_type: &str, payload: serde_json::Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            payload,
        }
    }
}

// Messages received from WebSocket clients. Images arrive through the upload
// endpoint; a chat frame naming a server path is refused.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Chat {
        content: String,
        #[serde(default)]
        image_path: Option<String>,
    },
    Reset,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(default)]
    pub image_path: Option<String>,
}

const IMAGE_FIELD: &str = "image";

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env()),
            sessions,
        }
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::ClientImagePath
            | SessionError::UnsupportedImage(_)
            | SessionError::EmptyImage => StatusCode::BAD_REQUEST,
            SessionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.message);
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// Minijinja Environment setup
fn create_minijinja_env() -> AutoReloader {
    // Use AutoReloader for development convenience
    AutoReloader::new(|notifier| {
        // Create the loader *inside* the closure
        let loader = path_loader("templates");
        let mut env = Environment::new();
        env.set_loader(loader);
        // Watch the templates directory for changes
        notifier.watch_path("templates", true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    let categories: Vec<serde_json::Value> = Category::ALL
        .iter()
        .map(|c| serde_json::json!({ "id": c.as_str(), "title": c.title() }))
        .collect();

    // Acquire env, get template, and render within the same block
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    title => "JHONNY Director's Studio",
                    categories => categories,
                })
            })
        })
        .map(Html) // Wrap successful render in Html()
        .map_err(|e| {
            // Handle errors from acquire_env, get_template, or render
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

async fn schema_handler() -> Json<serde_json::Value> {
    let categories: Vec<serde_json::Value> = Category::ALL
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.as_str(),
                "title": c.title(),
                "fields": c.fields().iter().map(|f| serde_json::json!({
                    "name": f.name,
                    "question": f.question,
                    "options": f.options,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    Json(serde_json::json!({ "categories": categories }))
}

async fn create_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.sessions.create().await;
    (StatusCode::CREATED, Json(snapshot))
}

async fn session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sessions.snapshot(id).await?))
}

async fn turn_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.image_path.is_some() {
        warn!("Rejected client-supplied image path for session {}", id);
        return Err(SessionError::ClientImagePath.into());
    }
    let outcome = state.sessions.submit(id, &request.message).await?;
    Ok(Json(outcome))
}

// Multipart upload of the reference image; the file lands in the upload directory.
async fn upload_image_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        let snapshot = state.sessions.store_image(id, &file_name, &bytes).await?;
        return Ok(Json(snapshot));
    }
    Err(ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("Missing multipart field '{}'", IMAGE_FIELD),
    })
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SessionError::NotFound(id).into())
    }
}

async fn reset_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sessions.reset(id).await?))
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Text frames that are not a valid [`ClientMessage`] are treated as chat input.
pub fn parse_client_message(text: &str) -> ClientMessage {
    serde_json::from_str(text).unwrap_or_else(|_| ClientMessage::Chat {
        content: text.to_string(),
        image_path: None,
    })
}

fn reply_payload(outcome: &TurnOutcome) -> serde_json::Value {
    serde_json::to_value(outcome).unwrap_or_else(|_| serde_json::json!({ "reply": outcome.reply }))
}

// Each WebSocket connection is one interview session.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = state.sessions.create().await;
    let session_id = session.id;
    info!("New WebSocket connection established for session {}", session_id);

    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerMessage::new(
        "Info",
        serde_json::json!({ "message": "Connected to JHONNY", "session": session }),
    );
    if send_json(&mut sender, &welcome).await.is_err() {
        warn!("Failed to send welcome message to new WebSocket client");
        state.sessions.remove(session_id).await;
        return; // Close connection if send fails
    }

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        let reply = match msg {
            Message::Text(text) => match parse_client_message(&text) {
                ClientMessage::Chat {
                    image_path: Some(_),
                    ..
                } => {
                    warn!("Rejected client-supplied image path for session {}", session_id);
                    ServerMessage::new(
                        "Error",
                        serde_json::json!({ "error": SessionError::ClientImagePath.to_string() }),
                    )
                }
                ClientMessage::Chat { content, .. } => {
                    info!("Received chat message for session {}", session_id);
                    match state.sessions.submit(session_id, &content).await {
                        Ok(outcome) => ServerMessage::new("Reply", reply_payload(&outcome)),
                        Err(e) => ServerMessage::new("Error", serde_json::json!({ "error": e.to_string() })),
                    }
                }
                ClientMessage::Reset => match state.sessions.reset(session_id).await {
                    Ok(snapshot) => ServerMessage::new(
                        "State",
                        serde_json::to_value(snapshot).unwrap_or_default(),
                    ),
                    Err(e) => ServerMessage::new("Error", serde_json::json!({ "error": e.to_string() })),
                },
            },
            Message::Binary(_) => {
                warn!("Received unexpected binary message from client");
                continue;
            }
            // Axum answers pings automatically
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break; // Exit loop to close connection
            }
        };

        if send_json(&mut sender, &reply).await.is_err() {
            // Client disconnected or error sending
            warn!("WebSocket client disconnected or send error. Closing connection.");
            break;
        }
    }

    state.sessions.remove(session_id).await;
    info!("WebSocket connection closed");
}

async fn send_json<S>(sender: &mut S, msg: &ServerMessage) -> Result<()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let json_msg = serde_json::to_string(msg).context("Failed to serialize server message")?;
    sender
        .send(Message::Text(json_msg))
        .await
        .context("Failed to send WebSocket message")?;
    Ok(())
}

/// The full application router, without binding a socket.
pub fn build_router(state: AppState) -> Router {
    // Serve static files from the `static` directory
    let static_files_service = ServeDir::new("static").not_found_service(tower::service_fn(
        |_req: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        },
    ));

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/schema", get(schema_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", get(session_handler).delete(delete_session_handler))
        .route("/api/sessions/:id/turn", post(turn_handler))
        .route("/api/sessions/:id/reset", post(reset_handler))
        .route(
            "/api/sessions/:id/image",
            post(upload_image_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Route for static files must be nested under a path like /static
        // or it will conflict with other routes.
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(port: u16, sessions: Arc<SessionManager>) -> Result<()> {
    let app = build_router(AppState::new(sessions.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    let sweeper = tokio::spawn(run_idle_sweeper(sessions, Duration::from_secs(60)));

    // Use axum::serve to run the application
    let served = serve(listener, app.into_make_service())
        .await
        .context("Web server failed");
    sweeper.abort();
    served
}
