use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

// Who authored a message bubble
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Role::User => "fa-user",
            Role::Bot => "fa-robot",
        }
    }
}

// A single message inside a persisted chat
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

// A conversation as returned by /api/history.
// The backend also stores summary bookkeeping on each chat; those fields are ignored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Chat {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub msgs: Vec<Message>,
}

/// Processing state of an uploaded knowledge file.
///
/// The backend only ever writes `processing`, `done` and `error`; anything
/// else is rendered as a failure.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum FileStatus {
    Processing,
    Done,
    Error,
}

impl From<String> for FileStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "processing" => FileStatus::Processing,
            "done" => FileStatus::Done,
            _ => FileStatus::Error,
        }
    }
}

// A row of /api/files
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub status: FileStatus,
}

// Body of POST /api/ask
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AskRequest {
    pub message: String,
    pub chat_id: String,
    pub use_context: bool,
    pub use_web: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Serialize, Debug)]
pub struct DeleteChatRequest<'a> {
    pub chat_id: &'a str,
}

#[derive(Serialize, Debug)]
pub struct DeleteFileRequest<'a> {
    pub file_id: &'a str,
}

/// Reply of POST /api/upload.
///
/// Successful uploads carry `status: "success"`; rejected ones usually only
/// carry `error` (sent with a 4xx/5xx status code).
#[derive(Deserialize, Clone, Debug, Default)]
pub struct UploadResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl UploadResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    pub fn error_message(&self) -> &str {
        self.error
            .as_deref()
            .or(self.msg.as_deref())
            .unwrap_or("未知错误")
    }
}

#[derive(Serialize, Debug)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

// Reply of /login and /register
#[derive(Deserialize, Clone, Debug)]
pub struct AuthResponse {
    pub status: String,
    #[serde(default)]
    pub msg: Option<String>,
}

/// A file picked by the user, loaded into memory for the multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub async fn read(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .with_context(|| format!("Path has no file name: {}", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file {}", path.display()))?;
        Ok(Self { name, bytes })
    }
}

// Chat ids created by the browser were timestamps; older records may hold them as numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
