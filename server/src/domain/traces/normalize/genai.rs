//! GenAI field extraction
//!
//! Each field is read from a list of keys in priority order: the current
//! semantic convention key first, then known legacy aliases. Garbled or
//! missing values leave the field empty; nothing here fails.
//!
//! Only the key that supplied a column value leaves the attribute map.
//! Values that fail to convert stay in the overflow JSON untouched.

use serde_json::{Map, Value as JsonValue};

pub(super) mod keys {
    pub const PROVIDER_NAME: &str = "gen_ai.provider.name";
    pub const SYSTEM: &str = "gen_ai.system";
    pub const REQUEST_MODEL: &str = "gen_ai.request.model";
    pub const RESPONSE_MODEL: &str = "gen_ai.response.model";
    pub const INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
    pub const PROMPT_TOKENS: &str = "gen_ai.usage.prompt_tokens";
    pub const OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
    pub const COMPLETION_TOKENS: &str = "gen_ai.usage.completion_tokens";
    pub const COST: &str = "gen_ai.usage.cost";
    pub const TOOL_NAME: &str = "gen_ai.tool.name";
}

/// Field extraction configuration with fallback keys
struct FieldKeys {
    primary: &'static str,
    fallbacks: &'static [&'static str],
}

impl FieldKeys {
    const fn new(primary: &'static str, fallbacks: &'static [&'static str]) -> Self {
        Self { primary, fallbacks }
    }

    fn all(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.primary).chain(self.fallbacks.iter().copied())
    }

    /// Value of the first key that converts; that key is removed
    fn take<T>(
        &self,
        attrs: &mut Map<String, JsonValue>,
        convert: fn(&JsonValue) -> Option<T>,
    ) -> Option<T> {
        let (key, value) = self
            .all()
            .find_map(|k| attrs.get(k).and_then(convert).map(|v| (k, v)))?;
        attrs.remove(key);
        Some(value)
    }
}

const PROVIDER: FieldKeys = FieldKeys::new(keys::PROVIDER_NAME, &[keys::SYSTEM]);
const REQUEST_MODEL: FieldKeys = FieldKeys::new(keys::REQUEST_MODEL, &[]);
const RESPONSE_MODEL: FieldKeys = FieldKeys::new(keys::RESPONSE_MODEL, &[]);
const INPUT_TOKENS: FieldKeys = FieldKeys::new(keys::INPUT_TOKENS, &[keys::PROMPT_TOKENS]);
const OUTPUT_TOKENS: FieldKeys = FieldKeys::new(keys::OUTPUT_TOKENS, &[keys::COMPLETION_TOKENS]);
const COST: FieldKeys = FieldKeys::new(keys::COST, &[]);
const TOOL_NAME: FieldKeys = FieldKeys::new(keys::TOOL_NAME, &[]);

/// GenAI columns of a span; all independent, all optional
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GenAiFields {
    pub system: Option<String>,
    pub request_model: Option<String>,
    pub response_model: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cost_usd: Option<f64>,
    pub tool_name: Option<String>,
}

impl GenAiFields {
    /// A span is GenAI when it names a provider or a model
    pub fn is_genai(&self) -> bool {
        self.system.is_some() || self.request_model.is_some() || self.response_model.is_some()
    }
}

/// Move GenAI values out of `attrs` into typed columns
pub fn take_genai(attrs: &mut Map<String, JsonValue>) -> GenAiFields {
    GenAiFields {
        system: PROVIDER.take(attrs, coerce_string),
        request_model: REQUEST_MODEL.take(attrs, coerce_string),
        response_model: RESPONSE_MODEL.take(attrs, coerce_string),
        input_tokens: INPUT_TOKENS.take(attrs, coerce_i64),
        output_tokens: OUTPUT_TOKENS.take(attrs, coerce_i64),
        cost_usd: COST.take(attrs, coerce_f64),
        tool_name: TOOL_NAME.take(attrs, coerce_string),
    }
}

fn coerce_string(value: &JsonValue) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer from a JSON integer, an integral float, or a numeric string
fn coerce_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Finite float from a JSON number or a numeric string
fn coerce_f64(value: &JsonValue) -> Option<f64> {
    let f = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    f.is_finite().then_some(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_extract_full_genai_span() {
        let fields = take_genai(&mut attrs(json!({
            "gen_ai.provider.name": "openai",
            "gen_ai.request.model": "gpt-4o",
            "gen_ai.response.model": "gpt-4o-2024-08-06",
            "gen_ai.usage.input_tokens": 100,
            "gen_ai.usage.output_tokens": 50,
            "gen_ai.usage.cost": 0.05,
            "gen_ai.tool.name": "search",
        })));
        assert_eq!(fields.system.as_deref(), Some("openai"));
        assert_eq!(fields.request_model.as_deref(), Some("gpt-4o"));
        assert_eq!(fields.response_model.as_deref(), Some("gpt-4o-2024-08-06"));
        assert_eq!(fields.input_tokens, Some(100));
        assert_eq!(fields.output_tokens, Some(50));
        assert_eq!(fields.cost_usd, Some(0.05));
        assert_eq!(fields.tool_name.as_deref(), Some("search"));
        assert!(fields.is_genai());
    }

    #[test]
    fn test_canonical_key_wins_over_legacy() {
        let fields = take_genai(&mut attrs(json!({
            "gen_ai.system": "legacy",
            "gen_ai.provider.name": "anthropic",
            "gen_ai.usage.prompt_tokens": 1,
            "gen_ai.usage.input_tokens": 2,
        })));
        assert_eq!(fields.system.as_deref(), Some("anthropic"));
        assert_eq!(fields.input_tokens, Some(2));
    }

    #[test]
    fn test_legacy_fallbacks() {
        let fields = take_genai(&mut attrs(json!({
            "gen_ai.system": "openai",
            "gen_ai.usage.prompt_tokens": 12,
            "gen_ai.usage.completion_tokens": "34",
        })));
        assert_eq!(fields.system.as_deref(), Some("openai"));
        assert_eq!(fields.input_tokens, Some(12));
        assert_eq!(fields.output_tokens, Some(34));
    }

    #[test]
    fn test_garbled_primary_falls_back() {
        let fields = take_genai(&mut attrs(json!({
            "gen_ai.usage.input_tokens": "lots",
            "gen_ai.usage.prompt_tokens": 7,
        })));
        assert_eq!(fields.input_tokens, Some(7));
    }

    #[test]
    fn test_only_promoted_keys_are_removed() {
        let mut map = attrs(json!({
            "gen_ai.system": "legacy",
            "gen_ai.provider.name": "anthropic",
            "gen_ai.usage.input_tokens": "abc",
            "gen_ai.usage.prompt_tokens": 9,
            "gen_ai.usage.cost": "free",
        }));
        let fields = take_genai(&mut map);
        assert_eq!(fields.system.as_deref(), Some("anthropic"));
        assert_eq!(fields.input_tokens, Some(9));
        assert_eq!(fields.cost_usd, None);

        assert!(!map.contains_key("gen_ai.provider.name"));
        assert!(!map.contains_key("gen_ai.usage.prompt_tokens"));
        assert_eq!(map.get("gen_ai.system"), Some(&json!("legacy")));
        assert_eq!(map.get("gen_ai.usage.input_tokens"), Some(&json!("abc")));
        assert_eq!(map.get("gen_ai.usage.cost"), Some(&json!("free")));
    }

    #[test]
    fn test_non_genai_span_is_empty() {
        let fields = take_genai(&mut attrs(json!({"http.request.method": "GET"})));
        assert_eq!(fields, GenAiFields::default());
        assert!(!fields.is_genai());
    }

    #[test]
    fn test_model_alone_marks_genai() {
        let fields = take_genai(&mut attrs(json!({"gen_ai.request.model": "claude"})));
        assert!(fields.is_genai());
        assert_eq!(fields.system, None);
    }

    #[test]
    fn test_coerce_i64() {
        assert_eq!(coerce_i64(&json!(5)), Some(5));
        assert_eq!(coerce_i64(&json!(5.0)), Some(5));
        assert_eq!(coerce_i64(&json!(" 42 ")), Some(42));
        assert_eq!(coerce_i64(&json!(5.5)), None);
        assert_eq!(coerce_i64(&json!("4.2")), None);
        assert_eq!(coerce_i64(&json!(true)), None);
        assert_eq!(coerce_i64(&json!([1])), None);
        assert_eq!(coerce_i64(&JsonValue::Null), None);
    }

    #[test]
    fn test_coerce_f64() {
        assert_eq!(coerce_f64(&json!(0.04)), Some(0.04));
        assert_eq!(coerce_f64(&json!(3)), Some(3.0));
        assert_eq!(coerce_f64(&json!("0.5")), Some(0.5));
        assert_eq!(coerce_f64(&json!("NaN")), None);
        assert_eq!(coerce_f64(&json!("cheap")), None);
    }

    #[test]
    fn test_blank_strings_are_absent() {
        let fields = take_genai(&mut attrs(json!({"gen_ai.provider.name": "  "})));
        assert_eq!(fields.system, None);
    }
}
