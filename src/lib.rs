//! 多供应商流式对话网关
//!
//! Fronts Gemini, OpenAI, Anthropic, Fireworks and Groq behind one SSE/JSON contract with
//! in-memory sessions and request cancellation.

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod provider;
pub mod session;
pub mod stream;
pub mod types;

pub use adapter::{ProviderAdapter, SessionScope};
pub use client::LLMClient;
pub use config::{GatewayConfig, build_client_from_config};
pub use error::LLMError;
pub use gateway::{AppState, GatewayError, build_router};
pub use provider::{ChatStream, LLMProvider, ProviderKind};
pub use session::SessionStore;
pub use types::*;
