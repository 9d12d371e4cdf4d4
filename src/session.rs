//! Conversation sessions: the state that survives between turns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DirectorConfig;
use crate::constants::IMAGE_EXTENSIONS;
use crate::controller::{InterviewController, TurnInput, TurnOutcome};
use crate::error::SessionError;
use crate::evaluator::{evaluate, InterviewStatus, Step};
use crate::schema::Category;
use crate::selections::SelectionSet;
use crate::ChatMessage;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub history: Vec<ChatMessage>,
    pub image_path: Option<PathBuf>,
    pub selections: SelectionSet,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Read-only view of a session, as shown by the status command and the web debug panel.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: InterviewStatus,
    pub current: Step,
    pub missing: Vec<Category>,
    pub selections: SelectionSet,
    pub image_path: Option<PathBuf>,
    pub history: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
            image_path: None,
            selections: SelectionSet::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Runs one interview turn for `text` and records both sides of the exchange.
    pub async fn submit(&mut self, controller: &InterviewController, text: &str) -> TurnOutcome {
        self.touch();
        self.history.push(ChatMessage::user(text));
        let outcome = controller
            .run_turn(TurnInput {
                history: self.history.clone(),
                image_path: self.image_path.clone(),
                selections: self.selections.clone(),
            })
            .await;
        self.selections = outcome.selections.clone();
        self.history.push(ChatMessage::assistant(outcome.reply.clone()));
        self.touch();
        outcome
    }

    pub fn set_image(&mut self, path: Option<PathBuf>) {
        self.touch();
        self.image_path = path;
    }

    /// Starts the interview over. The only operation that removes selections.
    pub fn reset(&mut self) {
        info!("Resetting session {}", self.id);
        self.touch();
        self.history.clear();
        self.image_path = None;
        self.selections = SelectionSet::new();
    }

    fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Time since the last turn, reset or image change.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_active).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let evaluation = evaluate(&self.selections);
        SessionSnapshot {
            id: self.id,
            status: evaluation.status,
            current: evaluation.current,
            missing: evaluation.missing,
            selections: self.selections.clone(),
            image_path: self.image_path.clone(),
            history: self.history.clone(),
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifetime and storage limits for sessions held by a [`SessionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub idle_ttl: Duration,
    pub upload_dir: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(3600),
            upload_dir: std::env::temp_dir().join("director-uploads"),
        }
    }
}

impl From<&DirectorConfig> for SessionSettings {
    fn from(config: &DirectorConfig) -> Self {
        Self {
            idle_ttl: config.session_ttl,
            upload_dir: config.upload_dir.clone(),
        }
    }
}

/// Lowercased extension of an uploaded file name, if it is an accepted image type.
pub fn image_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Owns every live session and the controller that drives them.
///
/// Each session sits behind its own lock, so a slow turn only blocks later
/// turns of the same conversation. Sessions idle past the TTL are dropped the
/// next time a session is created or the sweeper runs.
pub struct SessionManager {
    controller: Arc<InterviewController>,
    settings: SessionSettings,
    sessions: Mutex<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(controller: Arc<InterviewController>, settings: SessionSettings) -> Self {
        info!(
            "Initializing Session Manager (idle TTL {:?}, uploads in {})",
            settings.idle_ttl,
            settings.upload_dir.display()
        );
        Self {
            controller,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn create(&self) -> SessionSnapshot {
        self.expire_idle().await;
        let session = Session::new();
        let snapshot = session.snapshot();
        self.sessions
            .lock()
            .await
            .insert(session.id, Arc::new(Mutex::new(session)));
        info!("Created session {}", snapshot.id);
        snapshot
    }

    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, SessionError> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let session = self.session(id).await?;
        let snapshot = session.lock().await.snapshot();
        Ok(snapshot)
    }

    /// Runs one turn against the session's current image.
    pub async fn submit(&self, id: Uuid, text: &str) -> Result<TurnOutcome, SessionError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        Ok(session.submit(&self.controller, text).await)
    }

    /// Replaces the session's image with `path`, discarding a previous upload.
    pub async fn set_image(&self, id: Uuid, path: Option<PathBuf>) -> Result<(), SessionError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        if let Some(previous) = session.image_path.take() {
            if Some(&previous) != path.as_ref() {
                self.discard_upload(&previous).await;
            }
        }
        session.set_image(path);
        Ok(())
    }

    /// Stores uploaded image bytes under the upload directory and makes the
    /// file the session's reference image. Only paths created here ever reach
    /// the captioners from the web surface.
    pub async fn store_image(
        &self,
        id: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<SessionSnapshot, SessionError> {
        let ext = image_extension(file_name)
            .ok_or_else(|| SessionError::UnsupportedImage(file_name.to_string()))?;
        if bytes.is_empty() {
            return Err(SessionError::EmptyImage);
        }
        // Fail before writing anything for an unknown session.
        let session = self.session(id).await?;

        tokio::fs::create_dir_all(&self.settings.upload_dir)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let path = self
            .settings
            .upload_dir
            .join(format!("{}-{}.{}", id, Uuid::new_v4(), ext));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        info!("Stored {} byte reference image for session {}", bytes.len(), id);

        let mut session = session.lock().await;
        if let Some(previous) = session.image_path.take() {
            self.discard_upload(&previous).await;
        }
        session.set_image(Some(path));
        Ok(session.snapshot())
    }

    pub async fn reset(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        if let Some(previous) = session.image_path.clone() {
            self.discard_upload(&previous).await;
        }
        session.reset();
        Ok(session.snapshot())
    }

    /// Drops a session and its uploaded image. `false` if it did not exist.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.lock().await.remove(&id);
        let Some(session) = removed else {
            return false;
        };
        let image = session.lock().await.image_path.clone();
        if let Some(path) = image {
            self.discard_upload(&path).await;
        }
        info!("Removed session {}", id);
        true
    }

    /// Removes every session idle for at least the TTL. Sessions in the
    /// middle of a turn are locked and therefore skipped.
    pub async fn expire_idle(&self) -> usize {
        let now = Utc::now();
        let mut expired = Vec::new();
        {
            let mut sessions = self.sessions.lock().await;
            sessions.retain(|id, session| match session.try_lock() {
                Ok(session) if session.idle_for(now) >= self.settings.idle_ttl => {
                    expired.push((*id, session.image_path.clone()));
                    false
                }
                _ => true,
            });
        }
        for (id, image) in &expired {
            if let Some(path) = image {
                self.discard_upload(path).await;
            }
            info!("Expired idle session {}", id);
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn discard_upload(&self, path: &Path) {
        if !path.starts_with(&self.settings.upload_dir) {
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Deleted upload {}", path.display()),
            Err(e) => warn!("Failed to delete upload {}: {}", path.display(), e),
        }
    }
}

/// Periodically drops idle sessions until the task is aborted.
pub async fn run_idle_sweeper(sessions: Arc<SessionManager>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let expired = sessions.expire_idle().await;
        if expired > 0 {
            info!("Idle sweep removed {} sessions", expired);
        }
    }
}
