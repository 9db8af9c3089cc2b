//! Anthropic Messages API（Claude 3.x）

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::AnthropicMessagesProvider;
