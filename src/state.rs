use crate::api::BackendApi;
use crate::chat::ChatController;
use crate::files::FilePanelController;
use crate::prompt::Prompter;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle of the conversation on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Client-generated id, nothing sent yet, unknown to the backend.
    New,
    /// The chat exists in the backend history.
    Active,
}

/// Snapshot of the session taken before an async operation. Comparing it
/// with the live state tells whether the session changed underneath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTicket {
    epoch: u64,
    pub chat_id: String,
}

#[derive(Debug)]
struct SessionInner {
    chat_id: String,
    phase: SessionPhase,
    // Bumped on every switch of the current chat
    epoch: u64,
    last_generated_id: i64,
    use_context: bool,
    use_web: bool,
}

/// The one place that owns the current chat id and the request switches.
#[derive(Debug)]
pub struct SessionState {
    inner: Mutex<SessionInner>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let id = Utc::now().timestamp_millis();
        Self {
            inner: Mutex::new(SessionInner {
                chat_id: id.to_string(),
                phase: SessionPhase::New,
                epoch: 0,
                last_generated_id: id,
                use_context: false,
                use_web: false,
            }),
        }
    }

    pub async fn current_chat_id(&self) -> String {
        self.inner.lock().await.chat_id.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }

    pub async fn ticket(&self) -> SessionTicket {
        let inner = self.inner.lock().await;
        SessionTicket {
            epoch: inner.epoch,
            chat_id: inner.chat_id.clone(),
        }
    }

    /// Switches to a fresh client-generated chat id (millisecond timestamp,
    /// bumped if the clock has not moved since the previous one).
    pub async fn start_new(&self) -> SessionTicket {
        let mut inner = self.inner.lock().await;
        let now = Utc::now().timestamp_millis();
        let id = now.max(inner.last_generated_id + 1);
        inner.last_generated_id = id;
        inner.chat_id = id.to_string();
        inner.phase = SessionPhase::New;
        inner.epoch += 1;
        log::debug!("Session epoch {} started new chat {}", inner.epoch, inner.chat_id);
        SessionTicket {
            epoch: inner.epoch,
            chat_id: inner.chat_id.clone(),
        }
    }

    /// Switches to a chat from the history.
    pub async fn switch_to(&self, chat_id: &str) -> SessionTicket {
        let mut inner = self.inner.lock().await;
        inner.chat_id = chat_id.to_string();
        inner.phase = SessionPhase::Active;
        inner.epoch += 1;
        log::debug!("Session epoch {} switched to chat {}", inner.epoch, chat_id);
        SessionTicket {
            epoch: inner.epoch,
            chat_id: inner.chat_id.clone(),
        }
    }

    pub async fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.inner.lock().await.epoch == ticket.epoch
    }

    /// Records the first successful exchange. No-op for stale tickets.
    pub async fn mark_active(&self, ticket: &SessionTicket) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.epoch != ticket.epoch {
            return false;
        }
        inner.phase = SessionPhase::Active;
        true
    }

    pub async fn flags(&self) -> (bool, bool) {
        let inner = self.inner.lock().await;
        (inner.use_context, inner.use_web)
    }

    pub async fn set_use_context(&self, on: bool) {
        self.inner.lock().await.use_context = on;
    }

    pub async fn set_use_web(&self, on: bool) {
        self.inner.lock().await.use_web = on;
    }
}

// Everything the console front end needs, cheap to clone into tasks
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionState>,
    pub chat: Arc<ChatController>,
    pub files: Arc<FilePanelController>,
}

impl AppState {
    pub fn new(backend: Arc<dyn BackendApi>, prompter: Arc<dyn Prompter>) -> Self {
        let session = Arc::new(SessionState::new());
        let chat = Arc::new(ChatController::new(
            backend.clone(),
            prompter.clone(),
            session.clone(),
        ));
        let files = Arc::new(FilePanelController::new(backend, prompter));
        Self {
            session,
            chat,
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_ids_are_unique_even_within_one_millisecond() {
        let session = SessionState::new();
        let first = session.start_new().await;
        let second = session.start_new().await;
        assert_ne!(first.chat_id, second.chat_id);
        assert!(second.chat_id.parse::<i64>().unwrap() > first.chat_id.parse::<i64>().unwrap());
        assert_eq!(session.phase().await, SessionPhase::New);
    }

    #[tokio::test]
    async fn tickets_go_stale_after_a_switch() {
        let session = SessionState::new();
        let loading = session.switch_to("old-chat").await;
        assert!(session.is_current(&loading).await);
        assert_eq!(session.phase().await, SessionPhase::Active);

        let fresh = session.start_new().await;
        assert!(!session.is_current(&loading).await);
        assert!(!session.mark_active(&loading).await);
        assert_eq!(session.phase().await, SessionPhase::New);
        assert_eq!(session.current_chat_id().await, fresh.chat_id);

        assert!(session.mark_active(&fresh).await);
        assert_eq!(session.phase().await, SessionPhase::Active);
    }

    #[tokio::test]
    async fn switches_default_off() {
        let session = SessionState::new();
        assert_eq!(session.flags().await, (false, false));
        session.set_use_context(true).await;
        session.set_use_web(true).await;
        assert_eq!(session.flags().await, (true, true));
    }
}
