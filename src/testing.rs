// In-memory doubles for controller tests

use crate::api::BackendApi;
use crate::models::{
    AskRequest, AskResponse, Chat, FileEntry, FileStatus, Message, Role, SelectedFile,
    UploadResponse,
};
use crate::prompt::Prompter;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Behaves like the Flask backend: asking saves the exchange (creating the
/// chat on first send, newest first) and uploads add a `processing` record.
#[derive(Default)]
pub struct FakeBackend {
    pub chats: Mutex<Vec<Chat>>,
    pub files: Mutex<Vec<FileEntry>>,
    pub asks: Mutex<Vec<AskRequest>>,
    pub uploads: Mutex<Vec<String>>,
    pub deleted_chats: Mutex<Vec<String>>,
    pub deleted_files: Mutex<Vec<String>>,
    pub history_calls: AtomicUsize,
    pub files_calls: AtomicUsize,
    pub fail_ask: AtomicBool,
    pub fail_history: AtomicBool,
    pub fail_files: AtomicBool,
    pub fail_upload: AtomicBool,
    pub reject_upload: Mutex<Option<String>>,
    history_gate: Mutex<Option<Arc<Notify>>>,
    ask_gate: Mutex<Option<Arc<Notify>>>,
    files_gate: Mutex<Option<Arc<Notify>>>,
    upload_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_chats(chats: Vec<Chat>) -> Arc<Self> {
        let backend = Self::default();
        *backend.chats.lock().unwrap() = chats;
        Arc::new(backend)
    }

    /// Makes the next history call wait until the returned handle is notified.
    pub fn hold_next_history(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.history_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn hold_next_ask(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.ask_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Holds the next file list call; the list is read once it is released.
    pub fn hold_next_files(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.files_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn hold_next_upload(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.upload_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_file_status(&self, id: &str, status: FileStatus) {
        for file in self.files.lock().unwrap().iter_mut() {
            if file.id == id {
                file.status = status;
            }
        }
    }
}

pub fn chat(id: &str, title: &str, exchanges: &[(&str, &str)]) -> Chat {
    Chat {
        id: id.to_string(),
        title: title.to_string(),
        msgs: exchanges
            .iter()
            .flat_map(|(q, a)| {
                [
                    Message {
                        role: Role::User,
                        content: q.to_string(),
                    },
                    Message {
                        role: Role::Bot,
                        content: a.to_string(),
                    },
                ]
            })
            .collect(),
    }
}

async fn pass(gate: &Mutex<Option<Arc<Notify>>>) {
    let gate = gate.lock().unwrap().take();
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn history(&self) -> Result<Vec<Chat>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.chats.lock().unwrap().clone();
        pass(&self.history_gate).await;
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("history unavailable"));
        }
        Ok(snapshot)
    }

    async fn ask(&self, request: &AskRequest) -> Result<AskResponse> {
        self.asks.lock().unwrap().push(request.clone());
        pass(&self.ask_gate).await;
        if self.fail_ask.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connection refused"));
        }
        let answer = format!("answer to {}", request.message);
        let mut chats = self.chats.lock().unwrap();
        if !chats.iter().any(|c| c.id == request.chat_id) {
            let title: String = request.message.chars().take(10).collect();
            chats.insert(0, chat(&request.chat_id, &format!("{}...", title), &[]));
        }
        if let Some(existing) = chats.iter_mut().find(|c| c.id == request.chat_id) {
            existing.msgs.push(Message {
                role: Role::User,
                content: request.message.clone(),
            });
            existing.msgs.push(Message {
                role: Role::Bot,
                content: answer.clone(),
            });
        }
        Ok(AskResponse { answer })
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.deleted_chats.lock().unwrap().push(chat_id.to_string());
        self.chats.lock().unwrap().retain(|c| c.id != chat_id);
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        self.files_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.files_gate).await;
        if self.fail_files.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("files unavailable"));
        }
        Ok(self.files.lock().unwrap().clone())
    }

    async fn upload(&self, file: &SelectedFile) -> Result<UploadResponse> {
        self.uploads.lock().unwrap().push(file.name.clone());
        pass(&self.upload_gate).await;
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connection reset"));
        }
        if let Some(error) = self.reject_upload.lock().unwrap().clone() {
            return Ok(UploadResponse {
                error: Some(error),
                ..UploadResponse::default()
            });
        }
        let mut files = self.files.lock().unwrap();
        let id = format!("f{}", files.len() + 1);
        files.insert(
            0,
            FileEntry {
                id,
                name: file.name.clone(),
                status: FileStatus::Processing,
            },
        );
        Ok(UploadResponse {
            status: Some("success".into()),
            msg: Some("上传成功，正在后台处理...".into()),
            error: None,
        })
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.deleted_files.lock().unwrap().push(file_id.to_string());
        self.files.lock().unwrap().retain(|f| f.id != file_id);
        Ok(())
    }
}

pub struct ScriptedPrompter {
    pub answer: AtomicBool,
    pub confirmations: Mutex<Vec<String>>,
    pub alerts: Mutex<Vec<String>>,
    pub picks: Mutex<Vec<PathBuf>>,
}

impl ScriptedPrompter {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            answer: AtomicBool::new(true),
            confirmations: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
            picks: Mutex::new(Vec::new()),
        })
    }

    pub fn declining() -> Arc<Self> {
        let prompter = Self::accepting();
        prompter.answer.store(false, Ordering::SeqCst);
        prompter
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, message: &str) -> bool {
        self.confirmations.lock().unwrap().push(message.to_string());
        self.answer.load(Ordering::SeqCst)
    }

    async fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }

    async fn pick_files(&self) -> Vec<PathBuf> {
        self.picks.lock().unwrap().clone()
    }
}
