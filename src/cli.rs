use crate::config::ClientConfig;
use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Password;

#[derive(Parser, Debug)]
#[command(
    name = "kgchat",
    version,
    about = "Chat with the knowledge-graph assistant and manage its knowledge files"
)]
pub struct Cli {
    /// Backend address
    #[arg(long, env = "KGCHAT_BASE_URL")]
    pub base_url: Option<String>,
    /// Account to log in with
    #[arg(long, env = "KGCHAT_USERNAME")]
    pub username: Option<String>,
    /// Create the account on the backend, then exit
    #[arg(long)]
    pub register: bool,
    /// Save the password in the OS keyring, then exit
    #[arg(long, conflicts_with = "register")]
    pub store_password: bool,
}

impl Cli {
    /// Lets flags win over what `ClientConfig::from_env` found.
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = self.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(username) = self.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            config.username = Some(username.to_string());
        }
    }
}

/// Asks for a password without echoing it.
pub async fn prompt_password(confirm: bool) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let mut prompt = Password::new().with_prompt("Password");
        if confirm {
            prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
        }
        prompt.interact()
    })
    .await
    .context("Password prompt task failed")?
    .context("Failed to read password")
}
