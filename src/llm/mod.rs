//! Reasoning-service integration.
//!
//! The pipeline treats the model as an opaque text generator: given a system
//! instruction and a prompt, return text. [`generate_text`] is that capability;
//! [`ChatClient`] is the production provider.
//!
//! ```ignore
//! use sonar_gatekeeper::llm::{generate_text, ChatClient};
//!
//! let client = ChatClient::ollama("http://localhost:11434", "qwen2.5-coder:1.5b");
//! let text = generate_text(&client, "You are terse.", "Say hi.", 64).await?;
//! ```

pub mod client;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};

use crate::error::LlmError;

/// Generate text for `prompt` under `system` instruction.
///
/// # Errors
///
/// Propagates provider errors; an empty or missing first choice is
/// [`LlmError::EmptyResponse`].
pub async fn generate_text(
    provider: &dyn LlmProvider,
    system: &str,
    prompt: &str,
    max_tokens: u32,
) -> Result<String, LlmError> {
    let request = GenerationRequest::new("", vec![Message::system(system), Message::user(prompt)])
        .with_max_tokens(max_tokens);

    let response = provider.generate(request).await?;
    match response.first_content() {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(LlmError::EmptyResponse),
    }
}
