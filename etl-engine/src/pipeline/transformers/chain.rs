//! Sequential composition of transformers.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::pipeline::traits::{ConfigMap, Transformer};
use crate::{Error, Result};

/// Runs several transformers in order, feeding each one's output to the next.
pub struct TransformChain {
    steps: Vec<Arc<dyn Transformer>>,
}

impl TransformChain {
    pub fn new(steps: Vec<Arc<dyn Transformer>>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::config("transform chain requires at least one step"));
        }
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Transformer for TransformChain {
    fn component_type(&self) -> &'static str {
        "chain"
    }

    fn transform(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for (index, step) in self.steps.iter().enumerate() {
            current = step.transform(&current).map_err(|e| {
                Error::transform(format!(
                    "step {} ({}) failed: {}",
                    index,
                    step.component_type(),
                    e
                ))
            })?;
        }
        Ok(current)
    }

    fn transform_config(&self) -> ConfigMap {
        let steps: Vec<Value> = self
            .steps
            .iter()
            .map(|s| json!({"type": s.component_type(), "config": s.transform_config()}))
            .collect();
        let mut map = ConfigMap::new();
        map.insert("steps".into(), Value::Array(steps));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transformers::{FieldMapper, FieldMapping, FieldType, MapperConfig};

    #[test]
    fn test_chain_applies_in_order() {
        let rename = FieldMapper::new(MapperConfig {
            mappings: vec![FieldMapping::new("age", "years")],
        })
        .unwrap();
        let convert = FieldMapper::new(MapperConfig {
            mappings: vec![FieldMapping::new("years", "years").with_type(FieldType::String)],
        })
        .unwrap();

        let chain = TransformChain::new(vec![Arc::new(rename), Arc::new(convert)]).unwrap();
        let out = chain.transform(br#"{"age": 41}"#).unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out, json!({"years": "41"}));
        assert_eq!(chain.transform_config()["steps"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(TransformChain::new(Vec::new()).is_err());
    }
}
