// Declare the modules
pub mod api;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod files;
pub mod models;
pub mod poll;
pub mod prompt;
pub mod state;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

use crate::api::HttpBackend;
use crate::cli::Cli;
use crate::commands::{Command, Flow};
use crate::config::ClientConfig;
use crate::prompt::ConsolePrompter;
use crate::state::AppState;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;

pub async fn run() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    cli.apply(&mut config);
    let backend = Arc::new(HttpBackend::new(&config)?);

    if cli.store_password {
        let password = cli::prompt_password(false).await?;
        return config.set_password_in_keyring(&password);
    }
    if cli.register {
        let username = config
            .username
            .as_deref()
            .context("KGCHAT_USERNAME or --username must be set to register")?;
        let password = cli::prompt_password(true).await?;
        let msg = backend.register(username, &password).await?;
        println!("{}", msg);
        return Ok(());
    }

    let logged_in = match (config.username.as_deref(), config.get_password()?) {
        (Some(username), Some(password)) => {
            backend.login(username, &password).await?;
            log::info!("Logged in as {}", username);
            true
        }
        _ => {
            log::warn!("No credentials configured; the backend will reject /api calls without a session");
            false
        }
    };

    let lines = prompt::stdin_lines();
    let prompter = Arc::new(ConsolePrompter::new(lines.clone()));
    let state = AppState::new(backend.clone(), prompter);

    // Page load: fresh session, sidebar, file panel, then background refresh
    let ((), files_loaded) = futures::join!(state.chat.start_new_chat(), state.files.load_files());
    if let Err(e) = files_loaded {
        log::error!("Failed to load file list: {:?}", e);
    }
    let polling = state.files.start_polling(config.poll_policy(), |view| {
        println!("\n-- files --");
        print!("{}", view);
    });

    print!("{}", state.chat.view().await);
    println!("(type /help for commands)");

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines
            .lock()
            .await
            .next_line()
            .await
            .context("Failed to read from stdin")?
        else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match commands::dispatch(&state, command).await {
            Ok(Flow::Exit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => {
                log::error!("Command failed: {:?}", e);
                println!("{:#}", e);
            }
        }
    }

    polling.cancel().await;
    if logged_in {
        if let Err(e) = backend.logout().await {
            log::warn!("Logout failed: {:?}", e);
        }
    }
    Ok(())
}
