//! Vision-model calls: one page image in, one page of Markdown out.
//!
//! Each page gets exactly one attempt. A rate limit or any other provider
//! failure is classified into a [`ConvertError`] and returned; whether to try
//! again is the caller's decision, since every call is billed.

use crate::config::AiSettings;
use crate::error::ConvertError;
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::{maintain_format_context, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Markdown and token counts for one page.
#[derive(Debug, Clone, Default)]
pub struct PageMarkdown {
    /// 1-indexed.
    pub page_num: usize,
    pub markdown: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Convert one rasterised page into Markdown.
///
/// Message layout:
/// 1. system prompt (built-in or configured override)
/// 2. prior-page context, only when `prior_page` is given
/// 3. user turn carrying the page image and no text
pub async fn process_page(
    provider: &Arc<dyn LLMProvider>,
    provider_name: &str,
    page_num: usize,
    image: ImageData,
    prior_page: Option<&str>,
    settings: &AiSettings,
) -> Result<PageMarkdown, ConvertError> {
    let start = Instant::now();
    let system_prompt = settings
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let mut messages = vec![ChatMessage::system(system_prompt)];
    if let Some(prior) = prior_page.filter(|p| !p.trim().is_empty()) {
        messages.push(ChatMessage::system(maintain_format_context(prior)));
    }
    messages.push(ChatMessage::user_with_images("", vec![image]));

    let options = build_options(settings);
    let response = provider
        .chat(&messages, Some(&options))
        .await
        .map_err(|e| {
            let err = classify_provider_error(provider_name, e);
            warn!("Page {}: model call failed: {}", page_num, err);
            err
        })?;

    debug!(
        "Page {}: {} input tokens, {} output tokens, {:?}",
        page_num,
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );

    Ok(PageMarkdown {
        page_num,
        markdown: clean_markdown(&response.content),
        input_tokens: response.prompt_tokens,
        output_tokens: response.completion_tokens,
    })
}

fn build_options(settings: &AiSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

/// Map a provider error onto the service's error vocabulary.
///
/// Credential and configuration faults keep no upstream text, since it may
/// echo part of the key.
pub fn classify_provider_error(provider: &str, err: LlmError) -> ConvertError {
    match err {
        LlmError::RateLimited(_) => ConvertError::RateLimited {
            provider: provider.to_string(),
        },
        LlmError::AuthError(_) => ConvertError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: "credential rejected by the provider".into(),
        },
        LlmError::ConfigError(_) => ConvertError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: "provider rejected its configuration".into(),
        },
        other => ConvertError::LlmApiError {
            provider: provider.to_string(),
            message: other.to_string(),
        },
    }
}
