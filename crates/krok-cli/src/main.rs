//! krok - command-line front end for the mock auth store.
//!
//! Drives the same user collection and session keys a browser front end
//! keeps in local storage, persisted to a JSON file instead.

mod app;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

#[derive(Parser, Debug)]
#[command(name = "krok", about = "Mock authentication store", version)]
pub struct Args {
    #[arg(long, env = "KROK_STORAGE", help = "Storage file path (overrides config)")]
    pub storage: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the default accounts if no users are stored
    Seed,
    /// Log in with an email and password
    Login {
        /// Defaults to the last email used
        email: Option<String>,
        #[arg(long, env = "KROK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Clear the current session
    Logout,
    /// Show the current session
    Whoami,
    /// Create an account and sign it in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "KROK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Change fields of the signed-in account
    UpdateProfile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// List stored accounts
    Users,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing();
    info!("krok starting");

    let mut app = App::open(args.storage)?;
    app.run(args.command)
}
