// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! ChoreQuest command-line client
//!
//! Drives the client core from a terminal: log a device in, inspect
//! tokens, pull changes and keep a sync loop running.

use anyhow::Context;
use chorequest_client::{
    config::{ClientConfig, LogFormat},
    ChoreQuest,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chorequest", about = "ChoreQuest device client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with a scanned QR login code (`chorequest://...` or bare payload)
    LoginQr { code: String },
    /// Log in the primary parent with a Google ID token
    LoginGoogle { id_token: String },
    /// Log out and forget all local data
    Logout,
    /// Print a valid Drive access token
    Token {
        /// Discard the stored token and refresh
        #[arg(long)]
        force: bool,
    },
    /// Pull changes from the backend once
    Sync,
    /// List cached chores
    Chores,
    /// Keep syncing in the foreground until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    init_logging(config.log_format);

    let client = ChoreQuest::open(config)
        .await
        .context("Failed to open client state")?;

    match cli.command {
        Command::LoginQr { code } => {
            let session = client.login_with_qr(&code).await?;
            println!("Logged in as {} ({:?})", session.user_name, session.role);
        }
        Command::LoginGoogle { id_token } => {
            let session = client.login_with_google(&id_token).await?;
            println!("Logged in as {} <{}>", session.user_name, session.owner_email);
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Token { force } => {
            let token = if force {
                client.tokens.force_refresh_token().await
            } else {
                client.get_valid_access_token().await
            };
            match token {
                Some(token) => println!("{token}"),
                None => anyhow::bail!("No access token available"),
            }
        }
        Command::Sync => {
            let outcome = client.sync.sync_now().await?;
            println!(
                "Synced: {} updated, {} deleted (as of {})",
                outcome.upserted, outcome.deleted, outcome.synced_at
            );
        }
        Command::Chores => {
            for chore in client.chores.list().await? {
                let status = format!("{:?}", chore.status);
                println!("{:<24} {:<10} {:>4}  {}", chore.id, status, chore.point_value, chore.title);
            }
        }
        Command::Watch => {
            client.sync.start();
            tracing::info!("Watching for changes, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            client.sync.shutdown().await;
        }
    }

    Ok(())
}

/// Initialize logging: JSON lines or human-readable output.
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chorequest_client=debug,info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .flatten_event(true),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
