use crate::foundation::error::ShaderResult;

/// Compiler switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Report deprecated syntax and technique load failures.
    pub verbose: bool,
    /// Collect the text of every parsed condition.
    pub dump_conditions: bool,
    /// Append the build-time condition tree, with the value sets of every node, to the dump.
    pub dump_values: bool,
    /// Only consider techniques with exactly this priority.
    pub force_priority: Option<i32>,
}

impl CompilerOptions {
    pub fn from_json(text: &str) -> ShaderResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> ShaderResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let o = CompilerOptions::from_json(r#"{ "verbose": true }"#).unwrap();
        assert!(o.verbose);
        assert!(!o.dump_conditions);
        assert_eq!(o.force_priority, None);
    }

    #[test]
    fn json_roundtrip_keeps_priority() {
        let o = CompilerOptions {
            force_priority: Some(150),
            ..CompilerOptions::default()
        };
        let back = CompilerOptions::from_json(&o.to_json().unwrap()).unwrap();
        assert_eq!(back, o);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = CompilerOptions::from_json("{ verbose").unwrap_err();
        assert!(err.to_string().contains("serialization error:"));
    }
}
