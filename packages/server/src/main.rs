#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cora API server binary.
//!
//! Reads the backend settings plus `BIND_ADDR`/`PORT` from the environment
//! and serves the API until interrupted.

use cora_server::{ServerConfig, run_server};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let services = cora_backend::create_services_from_env().map_err(std::io::Error::other)?;
    run_server(services, &ServerConfig::from_env()).await
}
