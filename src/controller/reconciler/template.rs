//! # Template Overlay
//!
//! `spec.template` is a partial Secret laid over the generated one. Template
//! values win: labels and annotations are merged key by key, `data` and
//! `stringData` entries replace synced keys, and a non-empty `type` replaces
//! `Opaque`. The target name and namespace are fixed and never taken from the
//! template.

use super::secret::DesiredSecret;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use serde_json::Value;

/// Template parse or overlay failure
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template must be an object, got {0}")]
    NotAnObject(&'static str),
    #[error("template is not a valid Secret: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Overlay `template` onto `secret`
///
/// # Errors
///
/// Returns [`TemplateError`] when the template is not an object or does not
/// deserialize as a Secret.
pub fn apply_template(secret: &mut DesiredSecret, template: &Value) -> Result<(), TemplateError> {
    let Value::Object(fields) = template else {
        return Err(TemplateError::NotAnObject(json_type(template)));
    };

    let mut fields = fields.clone();
    fields
        .entry("apiVersion")
        .or_insert_with(|| Value::String("v1".to_string()));
    fields
        .entry("kind")
        .or_insert_with(|| Value::String("Secret".to_string()));
    let overlay: Secret = serde_json::from_value(Value::Object(fields))?;

    if let Some(labels) = overlay.metadata.labels {
        secret.labels.extend(labels);
    }
    if let Some(annotations) = overlay.metadata.annotations {
        secret.annotations.extend(annotations);
    }
    if let Some(data) = overlay.data {
        secret.data.extend(
            data.into_iter()
                .map(|(key, value)| (key, BASE64_STANDARD.encode(value.0))),
        );
    }
    // stringData wins over data, as on the API server
    if let Some(string_data) = overlay.string_data {
        secret.data.extend(
            string_data
                .into_iter()
                .map(|(key, value)| (key, BASE64_STANDARD.encode(value.as_bytes()))),
        );
    }
    if let Some(type_) = overlay.type_.filter(|t| !t.is_empty()) {
        secret.type_ = type_;
    }

    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
