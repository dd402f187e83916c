//! Stages of the PDF → Markdown pipeline.
//!
//! ```text
//! rasterise ──▶ encode ──▶ llm ──▶ postprocess ──▶ join
//!  (pdfium)    (base64)   (VLM)    (cleanup)
//! ```
//!
//! Rasterisation lives with the other pdfium code in
//! [`crate::adapters::pdf`]; the stages here are pure or network-bound.
//! [`pricing`] turns the summed token counts into a cost estimate.

pub mod encode;
pub mod llm;
pub mod postprocess;
pub mod pricing;
