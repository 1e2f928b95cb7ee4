use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Blocking user interactions: confirmation dialogs, alerts and the file
/// picker.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;

    async fn alert(&self, message: &str);

    /// Lets the user pick files to upload; empty when cancelled.
    async fn pick_files(&self) -> Vec<PathBuf>;
}

pub type SharedLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_lines() -> SharedLines {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

// Terminal prompts sharing the command loop's stdin reader
pub struct ConsolePrompter {
    lines: SharedLines,
}

impl ConsolePrompter {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }

    async fn ask_line(&self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
        match self.lines.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to read from stdin: {:?}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Prompter for ConsolePrompter {
    async fn confirm(&self, message: &str) -> bool {
        let answer = self.ask_line(&format!("{} [y/N] ", message)).await;
        matches!(
            answer.as_deref().map(|a| a.trim().to_lowercase()).as_deref(),
            Some("y") | Some("yes")
        )
    }

    async fn alert(&self, message: &str) {
        println!("[!] {}", message);
    }

    async fn pick_files(&self) -> Vec<PathBuf> {
        self.ask_line("file path: ")
            .await
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .map(|line| vec![PathBuf::from(line)])
            .unwrap_or_default()
    }
}
