//! Versioned review prompts.
//!
//! A [`PromptSpec`] pairs a system and user template with the ordered list of
//! dimensions the reviewer must score. Templates use `{{ name }}`
//! placeholders, filled from the artifact payload by [`render`].

mod render;
mod spec;

pub use render::{render, render_template, template_variables, RenderedPrompt};
pub use spec::{PromptRef, PromptSource, PromptSpec, TemplateError};
