//! JSON extraction from free text and schema scoring with partial credit

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keywords that never constrain an instance
const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "$anchor",
    "$comment",
    "$defs",
    "definitions",
    "title",
    "description",
    "default",
    "examples",
    "readOnly",
    "writeOnly",
    "deprecated",
];

/// Relative weight of each kind of top-level constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaWeights {
    /// Each key listed in `required`
    #[serde(default = "default_weight")]
    pub required: f64,
    /// Each entry of `properties`
    #[serde(default = "default_weight")]
    pub property: f64,
    /// Every other keyword (`type`, `enum`, `minItems`, ...)
    #[serde(default = "default_weight")]
    pub keyword: f64,
}

fn default_weight() -> f64 { 1.0 }

impl Default for SchemaWeights {
    fn default() -> Self {
        Self {
            required: 1.0,
            property: 1.0,
            keyword: 1.0,
        }
    }
}

impl SchemaWeights {
    pub fn is_valid(&self) -> bool {
        [self.required, self.property, self.keyword]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
            && self.required + self.property + self.keyword > 0.0
    }
}

/// Outcome of scoring one instance against a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaScore {
    pub score: f64,
    pub valid: bool,
    pub satisfied: usize,
    pub total: usize,
}

/// Error compiling the reference schema
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid schema: {0}")]
pub struct InvalidSchema(pub String);

/// Pull the largest parseable JSON object or array out of free text.
///
/// Handles prose around the payload and code-fence wrapping. Falls back to
/// parsing the whole trimmed text, so bare scalars still come through.
pub fn extract_json_span(text: &str) -> Option<Value> {
    let mut spans = balanced_spans(text);
    spans.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)).then(a.0.cmp(&b.0)));

    for (start, end) in spans {
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
            return Some(value);
        }
    }

    let trimmed = strip_fence(text.trim());
    serde_json::from_str::<Value>(trimmed).ok()
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Byte ranges of every balanced `{...}` / `[...]` span, string-aware
fn balanced_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();

    for (start, &b) in bytes.iter().enumerate() {
        if b != b'{' && b != b'[' {
            continue;
        }
        if let Some(end) = matching_close(bytes, start) {
            spans.push((start, end + 1));
        }
    }
    spans
}

fn matching_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Make sure a schema compiles
pub fn check_schema(schema: &Value) -> Result<(), InvalidSchema> {
    jsonschema::validator_for(schema)
        .map(|_| ())
        .map_err(|e| InvalidSchema(e.to_string()))
}

/// Score an instance against a schema.
///
/// A valid instance scores 1.0. Otherwise the score is the weighted share of
/// satisfied top-level constraints: `type` and every other keyword, each
/// `required` key, and each declared property (an absent optional property
/// counts as satisfied).
pub fn schema_score(
    instance: &Value,
    schema: &Value,
    weights: &SchemaWeights,
) -> Result<SchemaScore, InvalidSchema> {
    let validator =
        jsonschema::validator_for(schema).map_err(|e| InvalidSchema(e.to_string()))?;

    let constraints = top_level_constraints(schema);
    let total = constraints.len();

    if validator.is_valid(instance) {
        return Ok(SchemaScore {
            score: 1.0,
            valid: true,
            satisfied: total,
            total,
        });
    }

    let mut satisfied = 0;
    let mut earned = 0.0;
    let mut possible = 0.0;
    for constraint in &constraints {
        let weight = constraint.weight(weights);
        possible += weight;
        if constraint.is_satisfied(instance, schema) {
            satisfied += 1;
            earned += weight;
        }
    }

    // Every counted constraint holds yet the whole schema fails: charge the
    // failure as one more unmet keyword
    if satisfied == total {
        possible += weights.keyword;
    }

    let score = if possible > 0.0 { earned / possible } else { 0.0 };
    Ok(SchemaScore {
        score: score.clamp(0.0, 1.0),
        valid: false,
        satisfied,
        total,
    })
}

#[derive(Debug)]
enum Constraint<'a> {
    Required(&'a str),
    Property(&'a str, &'a Value),
    Keyword(&'a str, &'a Value),
}

impl Constraint<'_> {
    fn weight(&self, weights: &SchemaWeights) -> f64 {
        match self {
            Constraint::Required(_) => weights.required,
            Constraint::Property(..) => weights.property,
            Constraint::Keyword(..) => weights.keyword,
        }
    }

    fn is_satisfied(&self, instance: &Value, root: &Value) -> bool {
        match self {
            Constraint::Required(key) => instance
                .as_object()
                .map(|obj| obj.contains_key(*key))
                .unwrap_or(false),
            Constraint::Property(key, sub) => match instance.as_object() {
                Some(obj) => match obj.get(*key) {
                    Some(value) => {
                        let wrapped = Value::Array(vec![(*sub).clone()]);
                        fragment_accepts(root, Map::from_iter([("allOf".to_string(), wrapped)]), value)
                    }
                    None => true,
                },
                None => false,
            },
            Constraint::Keyword("additionalProperties", value) => {
                let mut entries = Map::new();
                entries.insert("additionalProperties".to_string(), (*value).clone());
                for sibling in ["properties", "patternProperties"] {
                    if let Some(Value::Object(declared)) = root.get(sibling) {
                        let names = declared.keys().map(|k| (k.clone(), Value::Bool(true)));
                        entries.insert(sibling.to_string(), Value::Object(names.collect()));
                    }
                }
                fragment_accepts(root, entries, instance)
            }
            Constraint::Keyword(keyword, value) => fragment_accepts(
                root,
                Map::from_iter([(keyword.to_string(), (*value).clone())]),
                instance,
            ),
        }
    }
}

fn top_level_constraints(schema: &Value) -> Vec<Constraint<'_>> {
    let Some(obj) = schema.as_object() else {
        return Vec::new();
    };

    let mut constraints = Vec::new();
    for (keyword, value) in obj {
        if ANNOTATIONS.contains(&keyword.as_str()) {
            continue;
        }
        match (keyword.as_str(), value) {
            ("required", Value::Array(keys)) => {
                constraints.extend(keys.iter().filter_map(Value::as_str).map(Constraint::Required));
            }
            ("properties", Value::Object(props)) => {
                constraints.extend(props.iter().map(|(k, v)| Constraint::Property(k.as_str(), v)));
            }
            _ => constraints.push(Constraint::Keyword(keyword.as_str(), value)),
        }
    }
    constraints
}

/// Validate against a one-keyword schema that keeps the root's definitions
fn fragment_accepts(root: &Value, mut entries: Map<String, Value>, instance: &Value) -> bool {
    for key in ["$schema", "$defs", "definitions"] {
        if let Some(value) = root.get(key) {
            entries.insert(key.to_string(), value.clone());
        }
    }
    match jsonschema::validator_for(&Value::Object(entries)) {
        Ok(validator) => validator.is_valid(instance),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_from_prose_and_fences() {
        let text = "Sure! Here is the data:\n```json\n{\"name\": \"Ada\", \"tags\": [\"x\", \"y\"]}\n```\nLet me know.";
        assert_eq!(extract_json_span(text), Some(json!({"name": "Ada", "tags": ["x", "y"]})));
    }

    #[test]
    fn test_extract_prefers_largest_span() {
        let text = r#"First [1, 2] then {"a": {"b": [3]}, "c": "}"} done"#;
        assert_eq!(extract_json_span(text), Some(json!({"a": {"b": [3]}, "c": "}"})));
    }

    #[test]
    fn test_extract_skips_unparseable_spans() {
        let text = "{not json} but [1, 2, 3]";
        assert_eq!(extract_json_span(text), Some(json!([1, 2, 3])));
        assert_eq!(extract_json_span("no json here"), None);
        assert_eq!(extract_json_span(" 42 "), Some(json!(42)));
    }

    #[test]
    fn test_three_of_four_constraints() {
        let schema = json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {"a": {"type": "string"}}
        });
        let result = schema_score(&json!({"a": "x"}), &schema, &SchemaWeights::default()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.score, 0.75);
        assert_eq!((result.satisfied, result.total), (3, 4));
    }

    #[test]
    fn test_valid_instance_scores_one() {
        let schema = json!({"type": "object", "required": ["a"]});
        let result = schema_score(&json!({"a": 1}), &schema, &SchemaWeights::default()).unwrap();
        assert!(result.valid);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_wrong_property_type_loses_credit() {
        let schema = json!({
            "type": "object",
            "required": ["n"],
            "properties": {"n": {"type": "integer"}}
        });
        let result = schema_score(&json!({"n": "seven"}), &schema, &SchemaWeights::default()).unwrap();
        // type + required hold, property fails
        assert!((result.score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_additional_properties_ignores_declared_values() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
            "additionalProperties": false
        });
        let result = schema_score(&json!({"a": "wrong"}), &schema, &SchemaWeights::default()).unwrap();
        // type and additionalProperties hold, property a fails
        assert!((result.score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_refs_resolve_inside_fragments() {
        let schema = json!({
            "$defs": {"name": {"type": "string", "minLength": 1}},
            "type": "object",
            "required": ["name", "age"],
            "properties": {"name": {"$ref": "#/$defs/name"}}
        });
        let result = schema_score(&json!({"name": "Ada"}), &schema, &SchemaWeights::default()).unwrap();
        assert_eq!(result.score, 0.75);
    }

    #[test]
    fn test_custom_weights() {
        let schema = json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {"a": {"type": "string"}}
        });
        let weights = SchemaWeights {
            required: 2.0,
            property: 1.0,
            keyword: 1.0,
        };
        let result = schema_score(&json!({"a": "x"}), &schema, &weights).unwrap();
        // type 1 + required a 2 + property a 1 out of 6
        assert!((result.score - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_schema_reported() {
        let schema = json!({"type": "not-a-type"});
        assert!(schema_score(&json!({}), &schema, &SchemaWeights::default()).is_err());
        assert!(check_schema(&schema).is_err());
    }

    #[test]
    fn test_non_object_instance_gets_no_object_credit() {
        let schema = json!({
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "string"}}
        });
        let result = schema_score(&json!([1]), &schema, &SchemaWeights::default()).unwrap();
        assert_eq!(result.score, 0.0);
    }
}
