#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line client for Cora.
//!
//! Browse and submit community crime reports, review them as an
//! administrator, or start the API server. Sign-in state is kept in
//! `data/session.json` (or `CORA_SESSION_FILE`) between invocations.
//! Running without a subcommand opens an interactive menu.

mod commands;
mod context;
mod dashboard;
mod interactive;

use clap::{Parser, Subcommand};
use cora_report_models::{ReportId, ReportStatus, StatusFilter};
use cora_server::ServerConfig;

use crate::commands::SubmitArgs;
use crate::context::Context;

/// Result type for commands.
pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "cora", about = "Community crime reporting")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Prompt for backend and listen address
        #[arg(long)]
        interactive: bool,
        /// Interface to bind (overrides `BIND_ADDR`)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides `PORT`)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Sign in with email and password
    SignIn {
        /// Account email
        email: String,
        /// Password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account
    SignUp {
        /// Account email
        email: String,
        /// Password (at least 6 characters); prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the stored session
    SignOut,
    /// Show the signed-in user
    Whoami,
    /// Submit a report (requires sign-in)
    Submit(SubmitArgs),
    /// List reports, newest first
    List {
        /// `all` or a status (`unverified`, `verified`, `resolved`, `archived`)
        #[arg(long, default_value = "all")]
        status: StatusFilter,
    },
    /// Show one report
    Show {
        /// Report ID
        id: ReportId,
    },
    /// Change a report's status (administrators only)
    SetStatus {
        /// Report ID
        id: ReportId,
        /// Target status
        status: ReportStatus,
    },
    /// Review reports interactively (administrators only)
    Dashboard,
    /// Check backend connectivity and the stored session
    Check,
}

/// Runs the API server on a dedicated actix system.
///
/// The server uses actix-web's runtime, so it runs in a blocking task to
/// avoid nesting runtimes.
async fn serve(interactive: bool, bind: Option<String>, port: Option<u16>) -> CliResult {
    if interactive {
        tokio::task::spawn_blocking(|| {
            actix_web::rt::System::new().block_on(cora_server::interactive::run())
        })
        .await??;
        return Ok(());
    }

    let services = cora_backend::create_services_from_env()?;
    let defaults = ServerConfig::from_env();
    let config = ServerConfig {
        bind_addr: bind.unwrap_or(defaults.bind_addr),
        port: port.unwrap_or(defaults.port),
    };
    tokio::task::spawn_blocking(move || {
        actix_web::rt::System::new().block_on(cora_server::run_server(services, &config))
    })
    .await??;
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run().await;
    };

    run(command).await
}

async fn run(command: Commands) -> CliResult {
    if let Commands::Serve {
        interactive,
        bind,
        port,
    } = &command
    {
        return serve(*interactive, bind.clone(), *port).await;
    }

    let ctx = Context::init().await?;
    match command {
        Commands::Serve { .. } => {}
        Commands::SignIn { email, password } => commands::sign_in(&ctx, &email, password).await?,
        Commands::SignUp { email, password } => commands::sign_up(&ctx, &email, password).await?,
        Commands::SignOut => commands::sign_out(&ctx).await,
        Commands::Whoami => commands::whoami(&ctx),
        Commands::Submit(args) => commands::submit(&ctx, args).await?,
        Commands::List { status } => commands::list(&ctx, status).await?,
        Commands::Show { id } => commands::show(&ctx, id).await?,
        Commands::SetStatus { id, status } => commands::set_status(&ctx, id, status).await?,
        Commands::Dashboard => dashboard::run(&ctx).await?,
        Commands::Check => commands::check(&ctx).await?,
    }

    Ok(())
}
