//! Chat window and history sidebar.

use crate::api::BackendApi;
use crate::models::{AskRequest, Role};
use crate::prompt::Prompter;
use crate::state::{SessionState, SessionTicket};
use crate::view::{Bubble, ChatView, Sidebar, GREETING, SEND_FAILED, THINKING_GRAPH, THINKING_WEB};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

const CONFIRM_DELETE_CHAT: &str = "确定删除此对话吗？";

/// A click that may bubble up to a parent handler.
#[derive(Debug, Default)]
pub struct ClickEvent {
    propagation_stopped: bool,
}

impl ClickEvent {
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

#[derive(Debug, Default)]
struct ChatUi {
    view: ChatView,
    sidebar: Sidebar,
    input: String,
}

pub struct ChatController {
    backend: Arc<dyn BackendApi>,
    prompter: Arc<dyn Prompter>,
    session: Arc<SessionState>,
    ui: Mutex<ChatUi>,
    placeholder_seq: AtomicU64,
}

impl ChatController {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        prompter: Arc<dyn Prompter>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            backend,
            prompter,
            session,
            ui: Mutex::new(ChatUi::default()),
            placeholder_seq: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub async fn view(&self) -> ChatView {
        self.ui.lock().await.view.clone()
    }

    pub async fn sidebar(&self) -> Sidebar {
        self.ui.lock().await.sidebar.clone()
    }

    pub async fn input(&self) -> String {
        self.ui.lock().await.input.clone()
    }

    pub async fn set_input(&self, text: impl Into<String>) {
        self.ui.lock().await.input = text.into();
    }

    pub async fn set_use_context(&self, on: bool) {
        self.session.set_use_context(on).await;
    }

    pub async fn set_use_web(&self, on: bool) {
        self.session.set_use_web(on).await;
    }

    /// Puts a fresh, unsent session on screen. Nothing reaches the backend
    /// until the first message is sent.
    pub async fn start_new_chat(&self) {
        let ticket = self.session.start_new().await;
        log::info!("Starting new chat {}", ticket.chat_id);
        {
            let mut ui = self.ui.lock().await;
            ui.view.clear();
            ui.view.append(Bubble::new(Role::Bot, GREETING));
        }
        self.refresh_sidebar().await;
    }

    /// Rebuilds the sidebar from the backend history.
    pub async fn load_history(&self) -> Result<()> {
        let chats = self.backend.history().await?;
        let current = self.session.current_chat_id().await;
        let mut ui = self.ui.lock().await;
        ui.sidebar.rebuild(&chats, &current);
        log::debug!("Sidebar rebuilt with {} chats", chats.len());
        Ok(())
    }

    async fn refresh_sidebar(&self) {
        if let Err(e) = self.load_history().await {
            log::error!("Failed to refresh chat history: {:?}", e);
        }
    }

    /// Opens a chat from the history. Unknown ids are ignored.
    pub async fn load_chat(&self, chat_id: &str) {
        log::info!("Opening chat {}", chat_id);
        let ticket = self.session.switch_to(chat_id).await;
        let chats = match self.backend.history().await {
            Ok(chats) => chats,
            Err(e) => {
                log::error!("Failed to load chat {}: {:?}", chat_id, e);
                return;
            }
        };
        if !self.session.is_current(&ticket).await {
            log::warn!("Discarding stale load of chat {}", chat_id);
            return;
        }
        let Some(chat) = chats.iter().find(|c| c.id == chat_id) else {
            log::debug!("Chat {} not in history", chat_id);
            return;
        };
        let mut ui = self.ui.lock().await;
        ui.view.clear();
        for msg in &chat.msgs {
            ui.view.append(Bubble::new(msg.role, msg.content.clone()));
        }
        // Same list, so the highlight needs no second fetch
        ui.sidebar.rebuild(&chats, &ticket.chat_id);
    }

    /// Sends the input box contents. Whitespace-only input does nothing.
    pub async fn send_message(&self) {
        let (use_context, use_web) = self.session.flags().await;
        let ticket = self.session.ticket().await;
        let placeholder_id = format!(
            "loading-{}",
            self.placeholder_seq.fetch_add(1, Ordering::SeqCst) + 1
        );

        let message = {
            let mut ui = self.ui.lock().await;
            let message = ui.input.trim().to_string();
            if message.is_empty() {
                return;
            }
            ui.input.clear();
            ui.view.append(Bubble::new(Role::User, message.clone()));
            ui.view.append(Bubble {
                id: Some(placeholder_id.clone()),
                role: Role::Bot,
                text: if use_web { THINKING_WEB } else { THINKING_GRAPH }.to_string(),
                pending: true,
            });
            message
        };

        let request = AskRequest {
            message,
            chat_id: ticket.chat_id.clone(),
            use_context,
            use_web,
        };
        match self.backend.ask(&request).await {
            Ok(response) => {
                self.show_answer(&ticket, &placeholder_id, response.answer).await;
                self.session.mark_active(&ticket).await;
                self.refresh_sidebar().await;
            }
            Err(e) => {
                log::error!("Failed to ask in chat {}: {:?}", ticket.chat_id, e);
                self.ui.lock().await.view.set_text(&placeholder_id, SEND_FAILED);
            }
        }
    }

    async fn show_answer(&self, ticket: &SessionTicket, placeholder_id: &str, answer: String) {
        if !self.session.is_current(ticket).await {
            // The view now shows another chat; the answer is in its history
            log::info!("Answer for chat {} arrived after switching away", ticket.chat_id);
            return;
        }
        let mut ui = self.ui.lock().await;
        ui.view.remove(placeholder_id);
        ui.view.append(Bubble::new(Role::Bot, answer));
    }

    /// Appends one bubble and scrolls to it.
    pub async fn append_message(&self, role: Role, text: impl Into<String>, id: Option<String>) {
        let mut bubble = Bubble::new(role, text);
        bubble.id = id;
        self.ui.lock().await.view.append(bubble);
    }

    /// Deletes a chat after confirmation. Deleting the open chat starts a new one.
    pub async fn delete_chat(&self, chat_id: &str, event: &mut ClickEvent) {
        // The trash icon sits inside the clickable history row
        event.stop_propagation();
        if !self.prompter.confirm(CONFIRM_DELETE_CHAT).await {
            return;
        }
        log::warn!("Deleting chat {}", chat_id);
        if let Err(e) = self.backend.delete_chat(chat_id).await {
            log::error!("Failed to delete chat {}: {:?}", chat_id, e);
            return;
        }
        if chat_id == self.session.current_chat_id().await {
            self.start_new_chat().await;
        } else {
            self.refresh_sidebar().await;
        }
    }
}
