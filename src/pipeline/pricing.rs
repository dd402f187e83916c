//! Static price table for cost estimates in token-usage reports.
//!
//! Prices are USD per million tokens (input, output). Model ids are matched
//! exactly first, then by longest known prefix so dated snapshots such as
//! `gpt-4o-mini-2024-07-18` resolve to their family.

const PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4.1-nano", 0.10, 0.40),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("claude-sonnet-4", 3.00, 15.00),
    ("claude-3-5-haiku", 0.80, 4.00),
    ("gemini-2.0-flash", 0.10, 0.40),
    ("pixtral-12b", 0.15, 0.15),
];

/// Per-million-token prices for `model`, if known.
pub fn lookup(model: &str) -> Option<(f64, f64)> {
    let model = model.trim().to_ascii_lowercase();
    PRICES
        .iter()
        .filter(|(id, _, _)| model == *id || model.starts_with(&format!("{id}-")))
        .max_by_key(|(id, _, _)| id.len())
        .map(|&(_, input, output)| (input, output))
}

/// Estimated USD cost of a call, or `None` for models not in the table.
pub fn estimate_cost(model: &str, input_tokens: usize, output_tokens: usize) -> Option<f64> {
    lookup(model).map(|(input, output)| {
        (input_tokens as f64 * input + output_tokens as f64 * output) / 1_000_000.0
    })
}
