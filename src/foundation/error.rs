pub type ShaderResult<T> = Result<T, ShaderError>;

#[derive(thiserror::Error, Debug)]
pub enum ShaderError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("structure error: {0}")]
    Structure(String),

    #[error("load error: {0}")]
    Load(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShaderError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    pub fn structure(msg: impl Into<String>) -> Self {
        Self::Structure(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for ShaderError {
    fn from(e: serde_json::Error) -> Self {
        Self::serde(e.to_string())
    }
}

impl From<roxmltree::Error> for ShaderError {
    fn from(e: roxmltree::Error) -> Self {
        Self::syntax(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ShaderError::syntax("x")
                .to_string()
                .contains("syntax error:")
        );
        assert!(
            ShaderError::structure("x")
                .to_string()
                .contains("structure error:")
        );
        assert!(ShaderError::load("x").to_string().contains("load error:"));
        assert!(ShaderError::io("x").to_string().contains("io error:"));
        assert!(
            ShaderError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ShaderError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn json_errors_convert_to_serde() {
        let err: ShaderError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ShaderError::Serde(_)));
    }
}
