#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Binary entry point for the routing API server.

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    saferoute_server::run_server().await
}
