use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use charter_chat::ChatService;

use crate::error::ServerError;
use crate::router::build_router;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    pub chat: Arc<ChatService>,
    pub started_at: Instant,
}

pub struct ChatServer {
    addr: SocketAddr,
    max_body_size: usize,
    chat: Arc<ChatService>,
}

impl ChatServer {
    #[must_use]
    pub fn new(bind: &str, port: u16, chat: Arc<ChatService>) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to {DEFAULT_BIND}:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        Self {
            addr,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            chat,
        }
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let state = AppState {
            chat: self.chat,
            started_at: Instant::now(),
        };
        let router = build_router(state, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::Bind(self.addr.to_string(), e))?;
        tracing::info!("chat server listening on http://{}", self.addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
                tracing::info!("chat server shutting down");
            })
            .await
            .map_err(|e| ServerError::Server(format!("{e}")))
    }
}
