//! PDF → Markdown through a vision model.
//!
//! ## Flow
//!
//! ```text
//! credential check ──▶ provider ──▶ rasterise ──▶ encode ──▶ model calls ──▶ join
//! ```
//!
//! Pages are sent concurrently (bounded by `AiSettings::concurrency`) unless
//! the caller asked to maintain formatting, in which case they go one at a
//! time with the previous page's Markdown as context. The first page failure
//! fails the request: no partial document is ever returned. The whole flow
//! runs under the AI timeout.

use crate::adapters::pdf::PdfiumEngine;
use crate::adapters::{MarkdownOutput, MarkdownPipeline};
use crate::config::AiSettings;
use crate::error::ConvertError;
use crate::pipeline::encode::encode_page;
use crate::pipeline::llm::{self, PageMarkdown};
use crate::pipeline::postprocess::join_pages;
use crate::pipeline::pricing;
use crate::request::{MarkdownOptions, TokenUsage};
use crate::scratch::ScratchFile;
use async_trait::async_trait;
use edgequake_llm::{
    AnthropicProvider, GeminiProvider, ImageData, LLMProvider, LMStudioProvider, OllamaProvider,
    OpenAIProvider,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// [`MarkdownPipeline`] backed by pdfium and an `edgequake_llm` provider.
#[derive(Clone)]
pub struct LlmMarkdownPipeline {
    settings: AiSettings,
    pdf: PdfiumEngine,
    provider: Option<Arc<dyn LLMProvider>>,
}

impl fmt::Debug for LlmMarkdownPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmMarkdownPipeline")
            .field("settings", &self.settings)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .finish()
    }
}

impl LlmMarkdownPipeline {
    pub fn new(settings: AiSettings, pdf: PdfiumEngine) -> Self {
        Self {
            settings,
            pdf,
            provider: None,
        }
    }

    /// Use a pre-built provider instead of one built from the settings. The
    /// credential check is skipped since the provider carries its own.
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the configured provider for `model` from the settings alone.
    fn resolve_provider(&self, model: &str) -> Result<Arc<dyn LLMProvider>, ConvertError> {
        if let Some(provider) = &self.provider {
            return Ok(Arc::clone(provider));
        }
        let s = &self.settings;
        let not_configured = |hint: String| ConvertError::ProviderNotConfigured {
            provider: s.provider.clone(),
            hint,
        };
        let key = match (&s.api_key, s.requires_api_key()) {
            (Some(key), _) => key.clone(),
            (None, true) => {
                return Err(not_configured(
                    "no API key configured (set --api-key or the provider's key variable)".into(),
                ))
            }
            (None, false) => String::new(),
        };
        let base_url = s.base_url.as_deref();

        let provider: Arc<dyn LLMProvider> = match s.provider.as_str() {
            "openai" => {
                let provider = match base_url {
                    Some(url) => OpenAIProvider::compatible(key, url),
                    None => OpenAIProvider::new(key),
                };
                Arc::new(provider.with_model(model))
            }
            "anthropic" => {
                let mut provider = AnthropicProvider::new(key).with_model(model);
                if let Some(url) = base_url {
                    provider = provider.with_base_url(url);
                }
                Arc::new(provider)
            }
            "gemini" => Arc::new(GeminiProvider::new(key).with_model(model)),
            "ollama" => {
                let mut builder = OllamaProvider::builder().model(model);
                if let Some(url) = base_url {
                    builder = builder.host(url);
                }
                Arc::new(builder.build().map_err(|e| not_configured(e.to_string()))?)
            }
            "lmstudio" => {
                let mut builder = LMStudioProvider::builder().model(model);
                if let Some(url) = base_url {
                    builder = builder.host(url);
                }
                Arc::new(builder.build().map_err(|e| not_configured(e.to_string()))?)
            }
            other => return Err(not_configured(format!("unsupported provider '{other}'"))),
        };
        debug!("Using {} provider with model {}", s.provider, model);
        Ok(provider)
    }

    async fn run(
        &self,
        pdf: Arc<ScratchFile>,
        options: &MarkdownOptions,
    ) -> Result<MarkdownOutput, ConvertError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.settings.model.clone());
        let provider = self.resolve_provider(&model)?;

        let rendered = self
            .pdf
            .rasterise_all(pdf, self.settings.dpi, self.settings.max_rendered_pixels)
            .await?;
        let encoded = rendered
            .iter()
            .map(|(idx, img)| {
                encode_page(idx + 1, img)
                    .map(|data| (idx + 1, data))
                    .map_err(|e| ConvertError::RasterisationFailed {
                        page: idx + 1,
                        detail: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        drop(rendered);

        info!(
            "Converting {} page(s) with {} (maintain_format={})",
            encoded.len(),
            model,
            options.maintain_format
        );

        let pages = if options.maintain_format {
            self.process_sequential(&provider, encoded).await?
        } else {
            self.process_concurrent(&provider, encoded).await?
        };

        let usage = summarise_usage(&model, &pages);
        let markdown = join_pages(&pages.iter().map(|p| p.markdown.as_str()).collect::<Vec<_>>());
        debug!("Assembled {} chars of markdown", markdown.len());
        Ok(MarkdownOutput { markdown, usage })
    }

    /// Pages in flight at once; results are put back in page order.
    async fn process_concurrent(
        &self,
        provider: &Arc<dyn LLMProvider>,
        pages: Vec<(usize, ImageData)>,
    ) -> Result<Vec<PageMarkdown>, ConvertError> {
        let name = self.settings.provider.as_str();
        let mut results: Vec<PageMarkdown> = stream::iter(pages.into_iter().map(|(page_num, img)| {
            let provider = Arc::clone(provider);
            async move { llm::process_page(&provider, name, page_num, img, None, &self.settings).await }
        }))
        .buffer_unordered(self.settings.concurrency)
        .try_collect()
        .await?;
        results.sort_by_key(|p| p.page_num);
        Ok(results)
    }

    /// One page at a time, each seeing the previous page's output.
    async fn process_sequential(
        &self,
        provider: &Arc<dyn LLMProvider>,
        pages: Vec<(usize, ImageData)>,
    ) -> Result<Vec<PageMarkdown>, ConvertError> {
        let mut results: Vec<PageMarkdown> = Vec::with_capacity(pages.len());
        for (page_num, img) in pages {
            let prior = results.last().map(|p| p.markdown.as_str());
            let page = llm::process_page(
                provider,
                &self.settings.provider,
                page_num,
                img,
                prior,
                &self.settings,
            )
            .await?;
            results.push(page);
        }
        Ok(results)
    }
}

#[async_trait]
impl MarkdownPipeline for LlmMarkdownPipeline {
    async fn convert(
        &self,
        pdf: Arc<ScratchFile>,
        options: &MarkdownOptions,
    ) -> Result<MarkdownOutput, ConvertError> {
        let secs = self.settings.timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), self.run(pdf, options))
            .await
            .map_err(|_| ConvertError::Timeout {
                stage: "markdown conversion",
                secs,
            })?
    }
}

fn summarise_usage(model: &str, pages: &[PageMarkdown]) -> TokenUsage {
    let input_tokens: usize = pages.iter().map(|p| p.input_tokens).sum();
    let output_tokens: usize = pages.iter().map(|p| p.output_tokens).sum();
    TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens: input_tokens + output_tokens,
        cached_tokens: 0,
        model: model.to_string(),
        estimated_cost_usd: pricing::estimate_cost(model, input_tokens, output_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PdfSettings, ServiceConfig, ServiceConfigBuilder};
    use crate::scratch::ScratchSpace;

    #[tokio::test]
    async fn missing_key_fails_before_any_pdf_work() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path());
        // Not a real PDF: reaching pdfium would produce a different error.
        let pdf = Arc::new(scratch.adopt("upload", "pdf", b"%PDF-garbage").await.unwrap());

        let pipeline = LlmMarkdownPipeline::new(AiSettings::default(), PdfiumEngine::new(PdfSettings::default()));
        let err = pipeline
            .convert(pdf, &MarkdownOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::ProviderNotConfigured { .. }));
        assert_eq!(err.public_message(), "internal error");
    }

    fn pipeline(
        configure: impl FnOnce(ServiceConfigBuilder) -> ServiceConfigBuilder,
    ) -> LlmMarkdownPipeline {
        let config = configure(ServiceConfig::builder()).build().unwrap();
        LlmMarkdownPipeline::new(config.ai, PdfiumEngine::new(config.pdf))
    }

    #[test]
    fn key_from_settings_builds_the_openai_provider() {
        let p = pipeline(|b| b.api_key("sk-from-builder"));
        let provider = p.resolve_provider("gpt-4.1-mini").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4.1-mini");

        let p = pipeline(|b| b.api_key("sk-from-builder").base_url("http://gateway.local/v1"));
        assert_eq!(p.resolve_provider("gpt-4o").unwrap().model(), "gpt-4o");
    }

    #[test]
    fn each_hosted_provider_takes_the_configured_key() {
        let p = pipeline(|b| b.provider("anthropic").api_key("sk-ant-test").model("claude-sonnet-4"));
        let provider = p.resolve_provider("claude-sonnet-4").unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), "claude-sonnet-4");

        let p = pipeline(|b| b.provider("gemini").api_key("gm-test").model("gemini-2.5-flash"));
        assert_eq!(p.resolve_provider("gemini-2.5-flash").unwrap().name(), "gemini");
    }

    #[test]
    fn hosted_provider_without_key_is_not_configured() {
        for name in ["openai", "anthropic", "gemini"] {
            let Err(err) = pipeline(|b| b.provider(name)).resolve_provider("m") else {
                panic!("{name} should need a key");
            };
            match err {
                ConvertError::ProviderNotConfigured { provider, .. } => assert_eq!(provider, name),
                other => panic!("unexpected error for {name}: {other:?}"),
            }
        }
    }

    #[test]
    fn local_servers_need_no_key() {
        let p = pipeline(|b| b.provider("ollama").model("llava"));
        let provider = p.resolve_provider("llava").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llava");

        let p = pipeline(|b| b.provider("lmstudio").base_url("http://127.0.0.1:1234"));
        assert_eq!(p.resolve_provider("qwen2-vl").unwrap().name(), "lmstudio");
    }

    #[test]
    fn usage_sums_pages_and_prices_known_models() {
        let pages = vec![
            PageMarkdown { page_num: 1, markdown: "a".into(), input_tokens: 1000, output_tokens: 200 },
            PageMarkdown { page_num: 2, markdown: "b".into(), input_tokens: 1500, output_tokens: 300 },
        ];
        let usage = summarise_usage("gpt-4o-mini", &pages);
        assert_eq!(usage.input_tokens, 2500);
        assert_eq!(usage.output_tokens, 500);
        assert_eq!(usage.total_tokens, 3000);
        assert!(usage.estimated_cost_usd.unwrap() > 0.0);

        assert_eq!(summarise_usage("my-local-llava", &pages).estimated_cost_usd, None);
    }
}
