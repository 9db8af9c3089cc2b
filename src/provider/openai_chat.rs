//! OpenAI Chat Completions 兼容协议
//!
//! Fireworks 与 Groq 暴露同一套 `chat/completions` 接口，因此共用此实现，
//! 仅 base_url 与 provider 名称不同。

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::OpenAiChatProvider;
