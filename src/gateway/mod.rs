//! Gateway server implementation

pub mod chat;
mod router;
mod server;
pub mod streaming;

pub use router::{AppState, SseParams, create_router};
pub use server::Gateway;
