//! `{{ name }}` placeholder substitution.

use std::collections::BTreeMap;

use super::spec::{PromptSpec, TemplateError};
use crate::types::ArtifactPayload;

/// A rendered system/user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Build the variable map a payload exposes to templates.
///
/// Metadata keys are available by name; the built-in variables (`artifact`,
/// `model_type`, `methodology`, `sample_size`, `initiative_id`,
/// `knowledge_context`) shadow metadata keys of the same name.
pub fn template_variables(
    payload: &ArtifactPayload,
    knowledge_context: &str,
) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = payload
        .metadata
        .iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect();

    vars.insert("artifact".into(), payload.artifact_text.clone());
    vars.insert("model_type".into(), payload.model_type.clone());
    vars.insert("methodology".into(), payload.model_type.clone());
    vars.insert("sample_size".into(), payload.sample_size.to_string());
    vars.insert("initiative_id".into(), payload.initiative_id.clone());
    vars.insert("knowledge_context".into(), knowledge_context.to_string());
    vars
}

/// Render a prompt's system and user templates against a payload.
pub fn render(
    spec: &PromptSpec,
    payload: &ArtifactPayload,
    knowledge_context: &str,
) -> Result<RenderedPrompt, TemplateError> {
    let vars = template_variables(payload, knowledge_context);
    Ok(RenderedPrompt {
        system: render_template(&spec.system_template, &vars)?,
        user: render_template(&spec.user_template, &vars)?,
    })
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitute `{{ name }}` placeholders in `template`.
///
/// Unknown placeholders and malformed syntax are errors. Variables the
/// template never mentions are ignored.
pub fn render_template(
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    if let Some(offset) = template.find("{%") {
        return Err(TemplateError::Malformed {
            offset,
            reason: "block tags ({% %}) are not supported".to_string(),
        });
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);

        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| TemplateError::Malformed {
            offset: consumed + start,
            reason: "unclosed '{{'".to_string(),
        })?;

        let name = after_open[..end].trim();
        if !is_valid_name(name) {
            return Err(TemplateError::Malformed {
                offset: consumed + start,
                reason: format!("invalid variable name {:?}", name),
            });
        }

        let value = vars
            .get(name)
            .ok_or_else(|| TemplateError::UnresolvedVariable {
                name: name.to_string(),
            })?;
        out.push_str(value);

        let advance = start + 2 + end + 2;
        consumed += advance;
        rest = &rest[advance..];
    }

    out.push_str(rest);
    Ok(out)
}
