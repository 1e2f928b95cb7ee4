// Console commands, the terminal counterpart of the page's buttons and inputs

use crate::chat::ClickEvent;
use crate::files::FileInput;
use crate::state::AppState;
use anyhow::{Context, Result};
use std::path::PathBuf;

pub const HELP: &str = "\
/new                start a new chat
/history            show saved chats
/open <id>          open a saved chat
/delete <id>        delete a saved chat
/files              show knowledge files
/upload [path]      upload a knowledge file (asks for a path when omitted)
/rmfile <id>        delete a knowledge file
/context on|off     use conversation memory when answering
/web on|off         search the web when answering
/help               show this help
/quit               exit
anything else is sent as a message";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    NewChat,
    History,
    Open(String),
    Delete(String),
    Files,
    Upload(Option<PathBuf>),
    DeleteFile(String),
    Context(bool),
    Web(bool),
    Help,
    Quit,
    Send(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

fn required_arg(name: &str, arg: Option<&str>) -> Result<String> {
    arg.map(|a| a.to_string())
        .with_context(|| format!("/{} needs an id", name))
}

fn switch(name: &str, arg: Option<&str>) -> Result<bool> {
    match arg {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(anyhow::anyhow!("usage: /{} on|off", name)),
    }
}

impl Command {
    /// Parses one input line. Lines not starting with '/' are messages.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        match name {
            "new" => Ok(Command::NewChat),
            "history" => Ok(Command::History),
            "open" => Ok(Command::Open(required_arg(name, arg)?)),
            "delete" => Ok(Command::Delete(required_arg(name, arg)?)),
            "files" => Ok(Command::Files),
            "upload" => Ok(Command::Upload(arg.map(PathBuf::from))),
            "rmfile" => Ok(Command::DeleteFile(required_arg(name, arg)?)),
            "context" => Ok(Command::Context(switch(name, arg)?)),
            "web" => Ok(Command::Web(switch(name, arg)?)),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(anyhow::anyhow!("Unknown command /{} (try /help)", other)),
        }
    }
}

/// Runs a command against the controllers and prints the affected view.
pub async fn dispatch(state: &AppState, command: Command) -> Result<Flow> {
    log::debug!("Dispatching {:?}", command);
    match command {
        Command::NewChat => {
            state.chat.start_new_chat().await;
            print!("{}", state.chat.view().await);
        }
        Command::History => {
            state
                .chat
                .load_history()
                .await
                .context("Failed to load chat history")?;
            print!("{}", state.chat.sidebar().await);
        }
        Command::Open(chat_id) => {
            state.chat.load_chat(&chat_id).await;
            print!("{}", state.chat.view().await);
        }
        Command::Delete(chat_id) => {
            state.chat.delete_chat(&chat_id, &mut ClickEvent::default()).await;
            print!("{}", state.chat.sidebar().await);
        }
        Command::Files => {
            state
                .files
                .load_files()
                .await
                .context("Failed to load file list")?;
            print!("{}", state.files.view().await);
        }
        Command::Upload(Some(path)) => {
            let mut input = FileInput::new(vec![path]);
            state.files.handle_file_upload(&mut input).await;
            print!("{}", state.files.view().await);
        }
        Command::Upload(None) => {
            state.files.trigger_upload().await;
            print!("{}", state.files.view().await);
        }
        Command::DeleteFile(file_id) => {
            state.files.delete_file(&file_id).await;
            print!("{}", state.files.view().await);
        }
        Command::Context(on) => {
            state.chat.set_use_context(on).await;
            println!("context {}", if on { "on" } else { "off" });
        }
        Command::Web(on) => {
            state.chat.set_use_web(on).await;
            println!("web {}", if on { "on" } else { "off" });
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(Flow::Exit),
        Command::Send(text) => {
            let before = state.chat.view().await.bubbles().len();
            state.chat.set_input(text).await;
            state.chat.send_message().await;
            // Print only what this exchange added
            let view = state.chat.view().await;
            for bubble in view.bubbles().iter().skip(before) {
                if bubble.role == crate::models::Role::Bot {
                    println!("[bot] {}", bubble.text);
                }
            }
        }
    }
    Ok(Flow::Continue)
}
