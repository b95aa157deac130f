//! JSON-Schema checks for model output.

use jsonschema::Validator;
use openai_client::strip_code_blocks;
use serde_json::Value;

/// Compile a client-supplied schema.
pub fn compile(schema: &Value) -> Result<Validator, String> {
    jsonschema::validator_for(schema).map_err(|e| format!("invalid JSON Schema: {}", e))
}

/// Every violation of `validator` by `instance`, as readable messages.
pub fn violations(validator: &Validator, instance: &Value) -> Vec<String> {
    validator.iter_errors(instance).map(|e| e.to_string()).collect()
}

/// Parse a raw completion as JSON, tolerating markdown code fences.
pub fn parse_output(raw: &str) -> Result<Value, String> {
    serde_json::from_str(strip_code_blocks(raw))
        .map_err(|e| format!("output is not valid JSON: {}", e))
}

/// Parse and validate in one step; `Err` lists everything wrong.
pub fn check_output(validator: &Validator, raw: &str) -> Result<Value, Vec<String>> {
    let value = parse_output(raw).map_err(|e| vec![e])?;
    let errors = violations(validator, &value);
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "attendees": {"type": "integer"}
            },
            "required": ["title"]
        })
    }

    #[test]
    fn test_accepts_conforming_output() {
        let validator = compile(&event_schema()).unwrap();
        let value = check_output(&validator, r#"{"title": "Cleanup", "attendees": 12}"#).unwrap();
        assert_eq!(value["attendees"], 12);
    }

    #[test]
    fn test_strips_code_fences() {
        let validator = compile(&event_schema()).unwrap();
        assert!(check_output(&validator, "```json\n{\"title\": \"x\"}\n```").is_ok());
    }

    #[test]
    fn test_reports_missing_required_field() {
        let validator = compile(&event_schema()).unwrap();
        let errors = check_output(&validator, r#"{"attendees": 3}"#).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("title"));
    }

    #[test]
    fn test_reports_type_mismatch() {
        let validator = compile(&event_schema()).unwrap();
        let errors =
            check_output(&validator, r#"{"title": "x", "attendees": "many"}"#).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let validator = compile(&event_schema()).unwrap();
        let errors = check_output(&validator, "{\"title\": ").unwrap_err();
        assert!(errors[0].starts_with("output is not valid JSON"));
    }

    #[test]
    fn test_rejects_uncompilable_schema() {
        assert!(compile(&json!({"type": "not-a-type"})).is_err());
    }
}
