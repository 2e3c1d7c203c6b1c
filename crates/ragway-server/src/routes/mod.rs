//! API routes.

pub mod chat;
pub mod health;

pub use chat::{ChatMessage, ChatRequest, chat_send_handler};
pub use health::{HealthResponse, health_routes};
