use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque texture resource, identified by the name the host registered it under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextureHandle(pub String);

/// Opaque render buffer resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferHandle(pub String);

/// A shader variable value as seen by condition evaluation and pass setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ShaderVariable {
    Int(i32),
    Float(f32),
    Vector([f32; 4]),
    Texture(TextureHandle),
    Buffer(BufferHandle),
    Array(Vec<ShaderVariable>),
}

impl ShaderVariable {
    pub fn int(&self) -> i32 {
        match self {
            Self::Int(v) => *v,
            Self::Float(v) => *v as i32,
            Self::Vector(v) => v[0] as i32,
            _ => 0,
        }
    }

    pub fn float(&self) -> f32 {
        match self {
            Self::Int(v) => *v as f32,
            Self::Float(v) => *v,
            Self::Vector(v) => v[0],
            _ => 0.0,
        }
    }

    /// Vector view. Scalars fill the first component only.
    pub fn vector(&self) -> [f32; 4] {
        match self {
            Self::Int(v) => [*v as f32, 0.0, 0.0, 0.0],
            Self::Float(v) => [*v, 0.0, 0.0, 0.0],
            Self::Vector(v) => *v,
            _ => [0.0; 4],
        }
    }

    pub fn texture(&self) -> Option<&TextureHandle> {
        match self {
            Self::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<&BufferHandle> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn element(&self, index: usize) -> Option<&ShaderVariable> {
        match self {
            Self::Array(items) => items.get(index),
            _ => None,
        }
    }

    /// Parses the text content of a `<shadervar type="...">` declaration.
    pub fn parse(kind: &str, text: &str) -> Option<Self> {
        let text = text.trim();
        let floats = || -> Option<Vec<f32>> {
            text.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<f32>().ok())
                .collect()
        };
        match kind {
            "int" | "integer" => text.parse().ok().map(Self::Int),
            "float" => text.parse().ok().map(Self::Float),
            "vector2" | "vector3" | "vector4" => {
                let want = match kind {
                    "vector2" => 2,
                    "vector3" => 3,
                    _ => 4,
                };
                let vals = floats()?;
                if vals.len() != want {
                    return None;
                }
                let mut v = [0.0, 0.0, 0.0, 1.0];
                v[..want].copy_from_slice(&vals);
                Some(Self::Vector(v))
            }
            "texture" => {
                (!text.is_empty()).then(|| Self::Texture(TextureHandle(text.to_owned())))
            }
            _ => None,
        }
    }
}

/// Snapshot of the shader variables visible to one draw call, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShaderVarStack {
    vars: BTreeMap<String, ShaderVariable>,
}

impl ShaderVarStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: ShaderVariable) {
        self.vars.insert(name.into(), value);
    }

    /// Inserts only when no value is present, like pushing a default below existing values.
    pub fn set_default(&mut self, name: impl Into<String>, value: ShaderVariable) {
        self.vars.entry(name.into()).or_insert(value);
    }

    pub fn remove(&mut self, name: &str) -> Option<ShaderVariable> {
        self.vars.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ShaderVariable> {
        self.vars.get(name)
    }

    /// Resolves `name[i][j]...` by descending into array elements.
    pub fn lookup(&self, name: &str, indices: &[usize]) -> Option<&ShaderVariable> {
        let mut var = self.vars.get(name)?;
        for &i in indices {
            var = var.element(i)?;
        }
        Some(var)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ShaderVariable)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}
