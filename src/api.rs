use crate::config::ClientConfig;
use crate::models::{
    AskRequest, AskResponse, AuthResponse, Chat, Credentials, DeleteChatRequest, DeleteFileRequest,
    FileEntry, SelectedFile, UploadResponse,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;

// Trait defining the backend endpoints the controllers talk to
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn history(&self) -> Result<Vec<Chat>>;

    async fn ask(&self, request: &AskRequest) -> Result<AskResponse>;

    async fn delete_chat(&self, chat_id: &str) -> Result<()>;

    async fn list_files(&self) -> Result<Vec<FileEntry>>;

    // Application-level rejections come back as Ok with a non-success status
    async fn upload(&self, file: &SelectedFile) -> Result<UploadResponse>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

// --- HTTP implementation ---

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // The backend keeps the login in a session cookie
        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        log::info!("Logging in to {} as {}", self.base_url, username);
        let reply: AuthResponse = self
            .post_json("/login", &Credentials { username, password })
            .await?;
        if reply.status != "success" {
            return Err(anyhow::anyhow!(
                "Login failed: {}",
                reply.msg.unwrap_or_else(|| reply.status.clone())
            ));
        }
        Ok(())
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<String> {
        log::info!("Registering {} at {}", username, self.base_url);
        let reply: AuthResponse = self
            .post_json("/register", &Credentials { username, password })
            .await?;
        let msg = reply.msg.unwrap_or_default();
        if reply.status != "success" {
            return Err(anyhow::anyhow!("Registration failed: {}", msg));
        }
        Ok(msg)
    }

    pub async fn logout(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/logout"))
            .send()
            .await
            .context("Failed to send logout request")?;
        check_status(response).await.map(|_| ())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to send GET {}", path))?;
        check_status(response)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response of GET {}", path))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send POST {}", path))?;
        check_status(response)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response of POST {}", path))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let url = response.url().path().to_string();
    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "<Failed to read error body>".to_string());
    log::error!("Request to {} failed with status {}: {}", url, status, error_body);
    Err(anyhow::anyhow!(
        "Request to {} failed with status {}: {}",
        url,
        status,
        error_body
    ))
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn history(&self) -> Result<Vec<Chat>> {
        self.get_json("/api/history").await
    }

    async fn ask(&self, request: &AskRequest) -> Result<AskResponse> {
        log::info!(
            "Asking in chat {} (context: {}, web: {})",
            request.chat_id,
            request.use_context,
            request.use_web
        );
        self.post_json("/api/ask", request).await
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json("/api/delete_chat", &DeleteChatRequest { chat_id })
            .await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        self.get_json("/api/files").await
    }

    async fn upload(&self, file: &SelectedFile) -> Result<UploadResponse> {
        log::info!("Uploading {} ({} bytes)", file.name, file.bytes.len());
        let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let form = multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .context("Failed to send upload request")?;

        // Rejections arrive as 4xx/5xx with a JSON {error} body
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read upload response")?;
        serde_json::from_str::<UploadResponse>(&body).with_context(|| {
            format!("Upload response ({}) is not valid JSON: {}", status, body)
        })
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json("/api/files/delete", &DeleteFileRequest { file_id })
            .await?;
        Ok(())
    }
}
