//! Structured output via a synthetic tool
//!
//! A requested output schema is normalized into a plain object JSON Schema and
//! offered to the model either as a vendor-native response format or as a tool
//! named `structured_output`. Once the loop completes, the tool's arguments (or
//! the JSON text of a native response) are validated and unwrapped into the
//! final content. Non-conforming output is an error, never coerced.

use crate::error::OperateError;
use crate::protocol::{ToolDefinition, STRUCTURED_OUTPUT_TOOL};
use jsonschema::JSONSchema;
use serde_json::{json, Map, Value};

/// Instruction injected whenever the synthetic tool carries the schema
pub const STRUCTURED_OUTPUT_INSTRUCTION: &str = "When you have your final answer, call the \
`structured_output` tool exactly once with the answer as its arguments. The arguments must \
satisfy the tool's parameter schema. Do not finish without calling it.";

const STRUCTURED_OUTPUT_DESCRIPTION: &str =
    "Submit the final answer. Arguments must match the required output schema.";

/// Key holding non-object answers inside the wrapper object
const WRAPPED_KEY: &str = "value";

/// Meta keywords vendors reject and the validator does not need
const META_FIELDS: &[&str] = &["$schema", "$id", "$comment"];

/// An output schema as supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    /// A pre-built JSON Schema
    JsonSchema(Value),
    /// Shorthand such as `{"name": "string", "tags": ["string"]}`
    Natural(Value),
}

impl OutputFormat {
    /// Canonical JSON Schema for this format
    pub fn to_json_schema(&self) -> Result<Value, OperateError> {
        match self {
            Self::JsonSchema(schema) => Ok(schema.clone()),
            Self::Natural(shorthand) => natural_to_json_schema(shorthand),
        }
    }
}

impl From<Value> for OutputFormat {
    fn from(value: Value) -> Self {
        if looks_like_json_schema(&value) {
            Self::JsonSchema(value)
        } else {
            Self::Natural(value)
        }
    }
}

/// Keywords that may sit beside a string `type` in a JSON Schema
const SCHEMA_KEYWORDS: &[&str] = &[
    "type", "items", "enum", "const", "required", "description", "title", "format",
    "default", "examples", "minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum",
    "minLength", "maxLength", "pattern", "minItems", "maxItems", "uniqueItems",
    "additionalProperties", "anyOf", "oneOf", "allOf", "not", "$ref", "$defs",
    "definitions", "nullable",
];

/// Maps whose keys are names chosen by the caller, not keywords
const NAMED_SCHEMA_MAPS: &[&str] = &["properties", "$defs", "definitions"];

/// `$schema` or `properties` always mean JSON Schema. A string `type` does too,
/// unless some sibling key is not a schema keyword: `{"type": "string", "name":
/// "string"}` is shorthand for an object with `type` and `name` fields. Use
/// [`OutputFormat::Natural`] directly when a shorthand has only keyword keys.
fn looks_like_json_schema(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.contains_key("$schema") || obj.get("properties").is_some_and(Value::is_object) {
        return true;
    }
    obj.get("type").is_some_and(Value::is_string)
        && obj.keys().all(|key| SCHEMA_KEYWORDS.contains(&key.as_str()))
}

/// Convert the natural shorthand into JSON Schema.
///
/// Type names (`string`, `number`, `integer`, `boolean`, `object`, `array`, `any`)
/// map to their JSON Schema types in any capitalization; a one-element array is an
/// array of that item; a longer array of non-type strings is a string enum; an
/// object is an object with every key required.
pub fn natural_to_json_schema(value: &Value) -> Result<Value, OperateError> {
    match value {
        Value::String(name) => type_name_schema(name)
            .ok_or_else(|| OperateError::InvalidSchema(format!("unknown type name '{}'", name))),
        Value::Array(items) => match items.as_slice() {
            [] => Ok(json!({"type": "array"})),
            [item] => Ok(json!({"type": "array", "items": natural_to_json_schema(item)?})),
            many => {
                let variants: Option<Vec<&str>> = many.iter().map(Value::as_str).collect();
                match variants {
                    Some(variants) => Ok(json!({"type": "string", "enum": variants})),
                    None => Err(OperateError::InvalidSchema(
                        "multi-element arrays must be string enums".to_string(),
                    )),
                }
            }
        },
        Value::Object(fields) => {
            let mut properties = Map::new();
            for (key, field) in fields {
                properties.insert(key.clone(), natural_to_json_schema(field)?);
            }
            let required: Vec<&String> = fields.keys().collect();
            Ok(json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }))
        }
        other => Err(OperateError::InvalidSchema(format!(
            "unsupported shorthand value {}",
            other
        ))),
    }
}

fn type_name_schema(name: &str) -> Option<Value> {
    let schema = match name.to_lowercase().as_str() {
        "string" => json!({"type": "string"}),
        "number" => json!({"type": "number"}),
        "integer" => json!({"type": "integer"}),
        "boolean" | "bool" => json!({"type": "boolean"}),
        "object" => json!({"type": "object"}),
        "array" => json!({"type": "array"}),
        "any" => json!({}),
        _ => return None,
    };
    Some(schema)
}

fn strip_meta_fields(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        for field in META_FIELDS {
            obj.remove(*field);
        }
        for (key, v) in obj.iter_mut() {
            // A property may itself be called `$id`
            if NAMED_SCHEMA_MAPS.contains(&key.as_str()) {
                if let Some(named) = v.as_object_mut() {
                    named.values_mut().for_each(strip_meta_fields);
                    continue;
                }
            }
            strip_meta_fields(v);
        }
    } else if let Some(arr) = value.as_array_mut() {
        for v in arr.iter_mut() {
            strip_meta_fields(v);
        }
    }
}

fn is_object_schema(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == "object",
        None => schema.get("properties").is_some(),
        _ => false,
    }
}

/// A normalized output schema plus the logic to recognize and validate answers
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutput {
    schema: Value,
    wrapped: bool,
}

impl StructuredOutput {
    /// Normalize a caller format. Fails if the schema does not compile.
    pub fn new(format: &OutputFormat) -> Result<Self, OperateError> {
        let mut schema = format.to_json_schema()?;
        strip_meta_fields(&mut schema);

        let wrapped = !is_object_schema(&schema);
        let schema = if wrapped {
            let mut properties = Map::new();
            properties.insert(WRAPPED_KEY.to_string(), schema);
            json!({
                "type": "object",
                "properties": properties,
                "required": [WRAPPED_KEY],
            })
        } else {
            if let Some(obj) = schema.as_object_mut() {
                obj.entry("type").or_insert_with(|| json!("object"));
            }
            schema
        };

        JSONSchema::compile(&schema).map_err(|e| OperateError::InvalidSchema(e.to_string()))?;
        Ok(Self { schema, wrapped })
    }

    /// The object schema sent to the vendor
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Whether a non-object caller schema was wrapped under `value`
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// The synthetic tool definition
    pub fn tool_definition(&self) -> ToolDefinition {
        structured_output_tool(&self.schema)
    }

    /// Validate tool arguments and unwrap them into the final content
    pub fn extract(&self, arguments: Value) -> Result<Value, OperateError> {
        self.validate(&arguments)?;
        if !self.wrapped {
            return Ok(arguments);
        }
        match arguments {
            Value::Object(mut map) => Ok(map.remove(WRAPPED_KEY).unwrap_or(Value::Null)),
            other => Ok(other),
        }
    }

    /// Parse a native JSON-mode text answer and extract it
    pub fn extract_from_text(&self, text: &str) -> Result<Value, OperateError> {
        let value: Value = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
            OperateError::SchemaValidation {
                errors: vec![format!("response is not valid JSON: {}", e)],
            }
        })?;
        self.extract(value)
    }

    fn validate(&self, value: &Value) -> Result<(), OperateError> {
        let compiled = JSONSchema::compile(&self.schema)
            .map_err(|e| OperateError::InvalidSchema(e.to_string()))?;
        let result = compiled.validate(value).map_err(|errors| {
            errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect::<Vec<_>>()
        });
        result.map_err(|errors| OperateError::SchemaValidation { errors })
    }
}

/// Synthetic tool whose parameters equal the schema
pub fn structured_output_tool(schema: &Value) -> ToolDefinition {
    ToolDefinition::new(
        STRUCTURED_OUTPUT_TOOL,
        STRUCTURED_OUTPUT_DESCRIPTION,
        schema.clone(),
    )
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
