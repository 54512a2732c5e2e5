//! Interactive mode for the server.
//!
//! Prompts for the backend and listen address before starting the server.

use cora_backend::config::{BackendConfig, BackendKind};
use dialoguer::{Confirm, Input, Select};

use crate::ServerConfig;

/// Runs the server in interactive mode, prompting for configuration.
///
/// Offers the in-memory backend as an alternative to the configured REST
/// backend, asks for a bind address and port, and delegates to
/// [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration is invalid or
/// the underlying server fails to start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Cora Server");
    println!();

    let current = std::env::var("CORA_BACKEND")
        .ok()
        .and_then(|v| v.trim().parse::<BackendKind>().ok())
        .unwrap_or_default();
    let kinds = [BackendKind::Rest, BackendKind::Memory];
    let labels = ["REST (Supabase)", "In-memory (data is lost on exit)"];
    let default = kinds.iter().position(|k| *k == current).unwrap_or(0);
    let idx = Select::new()
        .with_prompt("Backend")
        .items(&labels)
        .default(default)
        .interact()
        .unwrap_or(default);
    let kind = kinds[idx];

    let backend = BackendConfig::from_lookup(|name| {
        if name == "CORA_BACKEND" {
            Some(kind.to_string())
        } else {
            std::env::var(name).ok()
        }
    })
    .map_err(std::io::Error::other)?;

    let defaults = ServerConfig::from_env();
    let bind_addr: String = Input::new()
        .with_prompt("Bind address")
        .default(defaults.bind_addr.clone())
        .interact_text()
        .unwrap_or(defaults.bind_addr);

    let port: u16 = Input::new()
        .with_prompt("Port")
        .default(defaults.port)
        .interact_text()
        .unwrap_or(defaults.port);

    if !Confirm::new()
        .with_prompt(format!("Start server on {bind_addr}:{port}?"))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    let services = cora_backend::create_services(&backend).map_err(std::io::Error::other)?;
    super::run_server(services, &ServerConfig { bind_addr, port }).await
}
