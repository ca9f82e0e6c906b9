//! HTTP surface for the charter chat service: `POST /api/chat`,
//! `POST /api/chat/reset` and `GET /health`.

mod error;
mod handlers;
mod router;
mod server;


pub use error::ServerError;
pub use server::{ChatServer, DEFAULT_BIND, DEFAULT_MAX_BODY_SIZE, DEFAULT_PORT};
