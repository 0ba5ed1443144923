//! `ParlorServer` builder and serve loop.

use std::future::Future;
use std::sync::Arc;

use http::HeaderMap;
use parlor_room::Hub;
use parlor_ws::handshake::OriginCheck;
use tokio::net::TcpListener;

use crate::api::{router, AppState};
use crate::auth::Authenticator;
use crate::ParlorError;

/// Builder for configuring and starting a Parlor server.
///
/// # Example
///
/// ```rust,no_run
/// use parlor::prelude::*;
///
/// # async fn run() -> Result<(), ParlorError> {
/// let auth = StaticTokenAuthenticator::new()
///     .with_token("secret", "admin", AccountRole::Admin);
/// let server = ParlorServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(auth)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ParlorServerBuilder {
    bind_addr: String,
    check_origin: Option<Arc<OriginCheck>>,
}

impl ParlorServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            check_origin: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Installs an origin check applied to every upgrade request. Without
    /// one, all origins are accepted.
    pub fn check_origin(
        mut self,
        check: impl Fn(&HeaderMap) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.check_origin = Some(Arc::new(check));
        self
    }

    /// Binds the listener and builds the server with the given
    /// authenticator guarding the admin API.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<ParlorServer<A>, ParlorError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;

        Ok(ParlorServer {
            listener,
            state: AppState {
                hub: Arc::new(Hub::new()),
                auth: Arc::new(auth),
                check_origin: self.check_origin,
            },
        })
    }
}

impl Default for ParlorServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound, ready-to-run Parlor server.
pub struct ParlorServer<A> {
    listener: TcpListener,
    state: AppState<A>,
}

impl<A: Authenticator> ParlorServer<A> {
    /// The hub backing this server. Useful for embedding and tests.
    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.state.hub)
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the process is terminated.
    pub async fn run(self) -> Result<(), ParlorError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then stops accepting and drains
    /// in-flight HTTP exchanges. Upgraded WebSocket tasks end with the
    /// process.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ParlorError> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "parlor server listening");

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("parlor server stopped");
        Ok(())
    }
}
