//! Prompts for the PDF → Markdown vision calls.
//!
//! [`crate::config::AiSettings::system_prompt`] replaces
//! [`DEFAULT_SYSTEM_PROMPT`] when set; the prior-page context is added either way.

/// Transcription prompt sent as the first system message for every page.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"Convert the following PDF page to markdown.

Return only the markdown with no explanation text.
Do not exclude any content from the page.
Do not wrap the output in ```markdown fences.

Structure:
- Use # for the page title, ## and ### for sections and subsections.
- Use - for bullet lists and 1. for numbered lists, keeping nesting.
- Render tables as GFM pipe tables; fall back to HTML only when cells span rows or columns.
- Put code in fenced blocks with a language tag.
- Write formulas as LaTeX: $inline$ and $$display$$.

Ignore page numbers, running headers and footers, and purely decorative lines."#;

/// Second system message used when formatting continuity is requested.
pub fn maintain_format_context(prior_page: &str) -> String {
    format!(
        "Markdown must maintain consistent formatting with the following page:\n\n\"\"\"{prior_page}\"\"\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_embeds_prior_page() {
        let ctx = maintain_format_context("## 2. Methods");
        assert!(ctx.contains("\"\"\"## 2. Methods\"\"\""));
    }

    #[test]
    fn default_prompt_forbids_fences() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Do not wrap"));
    }
}
