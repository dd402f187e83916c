//! Deterministic cleanup of model-generated Markdown.
//!
//! Even with the "no fences, no commentary" prompt, vision models sometimes
//! wrap a page in a fenced block, emit CRLF line endings, or invent image
//! links to files that do not exist. These rules undo that without touching
//! the transcribed text. Output is trimmed on both ends so pages can be joined
//! with a fixed separator.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator placed between pages in the assembled document.
pub const PAGE_SEPARATOR: &str = "\n\n\n";

/// Apply every rule in order.
///
/// Fences are stripped first so the remaining rules see the real content;
/// blank-line collapsing runs after invisible characters are removed because
/// a line holding only a zero-width space is blank once cleaned.
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = replace_placeholder_images(&s);
    s.trim().to_string()
}

/// Join cleaned pages in page order, skipping pages that came back empty.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

// ── Fences ───────────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'], "")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// At most one blank line inside a page; the page separator is the only
/// place two blank lines appear.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

// ── Images ───────────────────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "placehold.it",
    "dummyimage.com",
    "picsum.photos",
];

fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    let absolute = u.starts_with("http://") || u.starts_with("https://");
    !absolute || PLACEHOLDER_HOSTS.iter().any(|h| u.contains(h))
}

/// A page image has no addressable figures, so relative or placeholder
/// image links become an italic caption and empty ones disappear.
fn replace_placeholder_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if !is_placeholder_url(&caps[2]) {
                caps[0].to_string()
            } else if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        assert_eq!(clean_markdown("```markdown\n# Hello\nWorld\n```"), "# Hello\nWorld");
        assert_eq!(clean_markdown("```\n# Hello\n```\n"), "# Hello");
    }

    #[test]
    fn inner_code_block_untouched() {
        let input = "Intro\n\n```rust\nfn main() {}\n```";
        assert_eq!(clean_markdown(input), input);
    }

    #[test]
    fn normalises_crlf_and_trailing_space() {
        assert_eq!(clean_markdown("a  \r\nb\rc\t"), "a\nb\nc");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_markdown("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_markdown("a\n\u{200B}\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn placeholder_images_become_captions() {
        assert_eq!(clean_markdown("![Revenue chart](chart.png)"), "*Revenue chart*");
        assert_eq!(clean_markdown("x ![](https://example.com/a.png) y"), "x  y");
        let real = "![Fig 1](https://arxiv.org/fig1.png)";
        assert_eq!(clean_markdown(real), real);
    }

    #[test]
    fn join_uses_page_separator_in_order() {
        let pages = ["# One\n", "", "  Two  "];
        assert_eq!(join_pages(&pages), "# One\n\n\nTwo");
    }

    #[test]
    fn join_of_nothing_is_empty() {
        let pages: [&str; 0] = [];
        assert_eq!(join_pages(&pages), "");
    }
}
