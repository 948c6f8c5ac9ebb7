//! Caller-supplied shape of extracted data.
//!
//! Backends only accept an object at the top level, so list and scalar
//! schemas travel wrapped in a single-field object (`items` / `value`) and
//! are unwrapped again before the payload reaches the accumulator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const LIST_WRAPPER: &str = "items";
const SCALAR_WRAPPER: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ScalarType {
    fn json_type(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Number => "number",
            ScalarType::Integer => "integer",
            ScalarType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
            description: None,
        }
    }

    /// The model may leave this field out.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schema {
    Scalar { of: ScalarType },
    Object { fields: Vec<Field> },
    ListOf { item: Box<Schema> },
}

impl Schema {
    pub fn string() -> Self {
        Schema::Scalar {
            of: ScalarType::String,
        }
    }

    pub fn number() -> Self {
        Schema::Scalar {
            of: ScalarType::Number,
        }
    }

    pub fn integer() -> Self {
        Schema::Scalar {
            of: ScalarType::Integer,
        }
    }

    pub fn boolean() -> Self {
        Schema::Scalar {
            of: ScalarType::Boolean,
        }
    }

    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema::Object {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn list_of(item: Schema) -> Self {
        Schema::ListOf {
            item: Box::new(item),
        }
    }

    /// JSON Schema for this exact shape.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::Scalar { of } => json!({ "type": of.json_type() }),
            Schema::Object { fields } => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    let mut property = field.schema.to_json_schema();
                    if let (Some(description), Some(obj)) =
                        (&field.description, property.as_object_mut())
                    {
                        obj.insert("description".into(), json!(description));
                    }
                    properties.insert(field.name.clone(), property);
                    if field.required {
                        required.push(json!(field.name));
                    }
                }
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
            Schema::ListOf { item } => json!({
                "type": "array",
                "items": item.to_json_schema(),
            }),
        }
    }

    /// The object-rooted schema sent to the backend.
    pub fn request_schema(&self) -> Schema {
        match self {
            Schema::Object { .. } => self.clone(),
            Schema::ListOf { .. } => Schema::object([Field::new(LIST_WRAPPER, self.clone())]),
            Schema::Scalar { .. } => Schema::object([Field::new(SCALAR_WRAPPER, self.clone())]),
        }
    }

    /// Strip the wrapper added by [`Schema::request_schema`].
    ///
    /// Payloads that already have the unwrapped shape pass through.
    pub fn unwrap_payload(&self, payload: Value) -> Value {
        let key = match self {
            Schema::Object { .. } => return payload,
            Schema::ListOf { .. } => LIST_WRAPPER,
            Schema::Scalar { .. } => SCALAR_WRAPPER,
        };
        match payload {
            Value::Object(mut map) if map.contains_key(key) => {
                map.remove(key).unwrap_or(Value::Null)
            }
            Value::Object(_) if matches!(self, Schema::ListOf { .. }) => Value::Array(Vec::new()),
            other => other,
        }
    }

    /// Starting accumulator before any chunk was read.
    pub fn empty_payload(&self) -> Value {
        match self {
            Schema::Scalar { .. } => Value::Null,
            Schema::Object { .. } => Value::Object(Map::new()),
            Schema::ListOf { .. } => Value::Array(Vec::new()),
        }
    }
}
