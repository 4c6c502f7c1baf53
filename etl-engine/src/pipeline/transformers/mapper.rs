//! Field-mapping transformer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};

use crate::pipeline::traits::{ConfigMap, Transformer};
use crate::{Error, Result};

/// Target type of a field conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    #[serde(alias = "bool")]
    Boolean,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Number => write!(f, "number"),
            FieldType::Boolean => write!(f, "boolean"),
        }
    }
}

/// One source-to-target field mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field name in the input object.
    pub source: String,
    /// Field name in the output object.
    pub target: String,
    /// Optional conversion; `None` copies the value unchanged.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            field_type: None,
        }
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }
}

/// Field mapper configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    pub mappings: Vec<FieldMapping>,
}

/// Copies listed fields from the input object to the output object, renaming
/// and converting them on the way.
///
/// Only mapped fields reach the output. A mapping whose source field is
/// absent from the input is skipped. A top-level array is mapped element by
/// element.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    config: MapperConfig,
}

impl FieldMapper {
    /// Create a new field mapper, validating its mappings.
    pub fn new(config: MapperConfig) -> Result<Self> {
        if config.mappings.is_empty() {
            return Err(Error::config("field_mapper requires at least one mapping"));
        }
        for mapping in &config.mappings {
            if mapping.source.is_empty() {
                return Err(Error::config("field_mapper mapping has an empty source field"));
            }
            if mapping.target.is_empty() {
                return Err(Error::config("field_mapper mapping has an empty target field"));
            }
        }
        Ok(Self { config })
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.config.mappings
    }

    fn map_object(&self, input: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut output = Map::new();
        for mapping in &self.config.mappings {
            let Some(value) = input.get(&mapping.source) else {
                continue;
            };
            let value = match mapping.field_type {
                Some(field_type) => convert(value, field_type).map_err(|reason| {
                    Error::transform(format!(
                        "cannot convert field '{}' to {}: {}",
                        mapping.source, field_type, reason
                    ))
                })?,
                None => value.clone(),
            };
            output.insert(mapping.target.clone(), value);
        }
        Ok(output)
    }
}

fn convert(value: &Value, field_type: FieldType) -> std::result::Result<Value, String> {
    match field_type {
        FieldType::String => Ok(Value::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        FieldType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => parse_number(s.trim())
                .map(Value::Number)
                .ok_or_else(|| format!("'{s}' is not a number")),
            other => Err(format!("unsupported source type {}", type_name(other))),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            other => Err(format!("unsupported source type {}", type_name(other))),
        },
    }
}

/// Integral strings become integers so `"30"` maps to `30`, not `30.0`.
fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Number::from(u));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Transformer for FieldMapper {
    fn component_type(&self) -> &'static str {
        "field_mapper"
    }

    fn transform(&self, data: &[u8]) -> Result<Vec<u8>> {
        let input: Value = serde_json::from_slice(data)
            .map_err(|e| Error::transform(format!("invalid input JSON: {e}")))?;

        let output = match input {
            Value::Object(object) => Value::Object(self.map_object(&object)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(object) => self.map_object(object).map(Value::Object),
                        other => Err(Error::transform(format!(
                            "expected array of objects, found {}",
                            type_name(other)
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => {
                return Err(Error::transform(format!(
                    "expected a JSON object, found {}",
                    type_name(&other)
                )));
            }
        };

        Ok(serde_json::to_vec(&output)?)
    }

    fn transform_config(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("mappings".into(), json!(self.config.mappings));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(mappings: Vec<FieldMapping>) -> FieldMapper {
        FieldMapper::new(MapperConfig { mappings }).unwrap()
    }

    fn run(mapper: &FieldMapper, input: Value) -> Result<Value> {
        let out = mapper.transform(&serde_json::to_vec(&input).unwrap())?;
        Ok(serde_json::from_slice(&out).unwrap())
    }

    #[test]
    fn test_numeric_string_becomes_integer() {
        let m = mapper(vec![FieldMapping::new("age", "age").with_type(FieldType::Number)]);
        assert_eq!(run(&m, json!({"age": "30"})).unwrap(), json!({"age": 30}));
    }

    #[test]
    fn test_missing_field_is_skipped() {
        let m = mapper(vec![FieldMapping::new("age", "age").with_type(FieldType::Number)]);
        let out = run(&m, json!({"name": "x"})).unwrap();
        assert!(out.get("age").is_none());
        assert_eq!(out, json!({}));
    }

    #[test]
    fn test_unmapped_fields_dropped_and_renamed() {
        let m = mapper(vec![
            FieldMapping::new("id", "external_id").with_type(FieldType::String),
            FieldMapping::new("name", "full_name"),
            FieldMapping::new("is_active", "active").with_type(FieldType::Boolean),
        ]);
        let out = run(
            &m,
            json!({"id": 123, "name": "John Doe", "is_active": "true", "secret": "x"}),
        )
        .unwrap();
        assert_eq!(
            out,
            json!({"external_id": "123", "full_name": "John Doe", "active": true})
        );
    }

    #[test]
    fn test_float_string() {
        let m = mapper(vec![FieldMapping::new("price", "price").with_type(FieldType::Number)]);
        assert_eq!(run(&m, json!({"price": "12.5"})).unwrap(), json!({"price": 12.5}));
    }

    #[test]
    fn test_conversion_errors() {
        let m = mapper(vec![FieldMapping::new("age", "age").with_type(FieldType::Number)]);
        assert!(matches!(run(&m, json!({"age": "thirty"})), Err(Error::Transform(_))));
        assert!(matches!(run(&m, json!({"age": true})), Err(Error::Transform(_))));

        let m = mapper(vec![FieldMapping::new("ok", "ok").with_type(FieldType::Boolean)]);
        assert!(matches!(run(&m, json!({"ok": 1})), Err(Error::Transform(_))));
        assert!(matches!(run(&m, json!({"ok": "yes"})), Err(Error::Transform(_))));
    }

    #[test]
    fn test_string_conversion_of_structured_values() {
        let m = mapper(vec![FieldMapping::new("tags", "tags").with_type(FieldType::String)]);
        assert_eq!(
            run(&m, json!({"tags": ["a", "b"]})).unwrap(),
            json!({"tags": "[\"a\",\"b\"]"})
        );
    }

    #[test]
    fn test_array_of_objects() {
        let m = mapper(vec![FieldMapping::new("id", "id").with_type(FieldType::String)]);
        assert_eq!(
            run(&m, json!([{"id": 1}, {"id": 2, "x": 0}])).unwrap(),
            json!([{"id": "1"}, {"id": "2"}])
        );
        assert!(run(&m, json!([1, 2])).is_err());
    }

    #[test]
    fn test_malformed_input() {
        let m = mapper(vec![FieldMapping::new("a", "b")]);
        assert!(matches!(m.transform(b"{not json"), Err(Error::Transform(_))));
        assert!(matches!(m.transform(b"42"), Err(Error::Transform(_))));
    }

    #[test]
    fn test_construction_validation() {
        assert!(FieldMapper::new(MapperConfig::default()).is_err());
        assert!(FieldMapper::new(MapperConfig {
            mappings: vec![FieldMapping::new("", "x")]
        })
        .is_err());
        assert!(FieldMapper::new(MapperConfig {
            mappings: vec![FieldMapping::new("x", "")]
        })
        .is_err());
    }

    #[test]
    fn test_config_deserialize() {
        let config: MapperConfig = serde_json::from_value(json!({
            "mappings": [
                {"source": "age", "target": "age", "type": "number"},
                {"source": "name", "target": "full_name"}
            ]
        }))
        .unwrap();
        assert_eq!(config.mappings[0].field_type, Some(FieldType::Number));
        assert_eq!(config.mappings[1].field_type, None);

        let bad: std::result::Result<MapperConfig, _> = serde_json::from_value(json!({
            "mappings": [{"source": "a", "target": "b", "type": "date"}]
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_unknown_field_type_rejected_at_construction() {
        let registry = crate::registry::ComponentRegistry::with_defaults().unwrap();
        let err = registry
            .transformers
            .create(
                "field_mapper",
                &json!({"mappings": [{"source": "created", "target": "created", "type": "date"}]}),
            )
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("date")));
    }
}
