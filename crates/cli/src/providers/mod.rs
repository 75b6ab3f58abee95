use anyhow::Result;
use async_trait::async_trait;

mod anthropic;

pub use anthropic::AnthropicProvider;

/// `generate(prompt) -> text`
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: &ProviderRequest<'_>) -> Result<String>;
}

pub struct ProviderRequest<'a> {
    pub prompt: &'a str,
    pub max_tokens: usize,
}
