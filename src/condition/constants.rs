use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::operand::CondOperand;

/// Value a host-supplied constant resolves to in `consts.NAME`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantValue {
    Bool(bool),
    Int(i32),
    Float(f64),
}

impl ConstantValue {
    pub(crate) fn operand(self) -> CondOperand {
        match self {
            Self::Bool(v) => CondOperand::Boolean(v),
            Self::Int(v) => CondOperand::Int(v),
            Self::Float(v) => CondOperand::Float(v),
        }
    }
}

/// Named constants visible to condition expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstantTable {
    values: BTreeMap<String, ConstantValue>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ConstantValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<ConstantValue> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_pick_the_narrowest_type() {
        let t: ConstantTable =
            serde_json::from_str(r#"{"MAX_LIGHTS": 8, "BIAS": 0.5, "FANCY": true}"#).unwrap();
        assert_eq!(t.get("MAX_LIGHTS"), Some(ConstantValue::Int(8)));
        assert_eq!(t.get("BIAS"), Some(ConstantValue::Float(0.5)));
        assert_eq!(t.get("FANCY"), Some(ConstantValue::Bool(true)));
        assert_eq!(t.len(), 3);
    }
}
