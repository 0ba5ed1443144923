//! The Parlor server binary.
//!
//! Configuration comes from the environment, since real deployments own
//! their configuration source:
//!
//! - `PARLOR_ADDR` — bind address (default `0.0.0.0:8080`)
//! - `PARLOR_ADMIN_TOKEN` — bearer token accepted on the admin API
//! - `RUST_LOG` — tracing filter (default `info`)

use parlor::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ParlorError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr =
        std::env::var("PARLOR_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let mut auth = StaticTokenAuthenticator::new();
    match std::env::var("PARLOR_ADMIN_TOKEN") {
        Ok(token) if !token.is_empty() => {
            auth = auth.with_token(token, "admin", AccountRole::Admin);
        }
        _ => {
            tracing::warn!("PARLOR_ADMIN_TOKEN is not set; the admin API will reject every request");
        }
    }

    let server = ParlorServerBuilder::new().bind(&addr).build(auth).await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
}
