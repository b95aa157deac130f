//! Prompt templates for structuring page text.

use serde_json::Value;

/// System prompt: the client's instructions plus the output contract.
pub fn system_prompt(client_prompt: &str, schema: &Value) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        r#"You convert web page text into structured JSON.

## Instructions

{client_prompt}

## Output

Respond with a single JSON value that validates against this JSON Schema:

{schema}

Use only information present in the page text. Omit optional fields you
cannot fill; never invent values. Do not wrap the JSON in markdown."#,
        client_prompt = client_prompt.trim(),
        schema = schema,
    )
}

/// User message carrying the page text.
pub fn user_prompt(content: &str) -> String {
    format!("## Page Text\n\n{}", content)
}

/// Follow-up asking the model to fix a response that failed validation.
pub fn correction_prompt(errors: &[String]) -> String {
    let listed = errors
        .iter()
        .map(|e| format!("- {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Your previous response did not validate against the schema:\n\n{}\n\n\
         Respond again with corrected JSON only.",
        listed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_prompt_embeds_instructions_and_schema() {
        let prompt = system_prompt("  Extract the event.  ", &json!({"type": "object"}));
        assert!(prompt.contains("Extract the event."));
        assert!(prompt.contains("\"type\": \"object\""));
    }

    #[test]
    fn test_correction_lists_every_error() {
        let prompt = correction_prompt(&["a is required".into(), "b must be integer".into()]);
        assert!(prompt.contains("- a is required\n- b must be integer"));
    }
}
