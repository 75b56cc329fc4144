use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Well-known render buffers a mesh may provide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RenderBufferName {
    Position,
    Normal,
    Color,
    ColorUnlit,
    Index,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoordLightmap,
    Generic0,
    Generic1,
    Generic2,
    Generic3,
    Tangent,
    Binormal,
}

impl RenderBufferName {
    const DESCRIPTORS: [(&'static str, RenderBufferName); 16] = [
        ("position", Self::Position),
        ("normal", Self::Normal),
        ("color", Self::Color),
        ("color unlit", Self::ColorUnlit),
        ("index", Self::Index),
        ("texture coordinate 0", Self::TexCoord0),
        ("texture coordinate 1", Self::TexCoord1),
        ("texture coordinate 2", Self::TexCoord2),
        ("texture coordinate 3", Self::TexCoord3),
        ("texture coordinate lightmap", Self::TexCoordLightmap),
        ("generic0", Self::Generic0),
        ("generic1", Self::Generic1),
        ("generic2", Self::Generic2),
        ("generic3", Self::Generic3),
        ("tangent", Self::Tangent),
        ("binormal", Self::Binormal),
    ];

    /// Maps a buffer descriptor such as `"texture coordinate 0"` to its buffer name.
    pub fn from_descr(descr: &str) -> Option<Self> {
        Self::DESCRIPTORS
            .iter()
            .find(|(d, _)| *d == descr)
            .map(|(_, n)| *n)
    }

    pub fn descr(self) -> &'static str {
        Self::DESCRIPTORS
            .iter()
            .find(|(_, n)| *n == self)
            .map(|(d, _)| *d)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZMode {
    None,
    Fill,
    Test,
    #[default]
    Use,
    Equal,
    Invert,
    /// Use whatever mode the mesh carries.
    Mesh,
    Mesh2,
}

impl ZMode {
    pub fn from_token(s: &str) -> Option<Self> {
        Some(match s {
            "znone" => Self::None,
            "zfill" => Self::Fill,
            "ztest" => Self::Test,
            "zuse" => Self::Use,
            "zequal" => Self::Equal,
            "zinvert" => Self::Invert,
            "zmesh" => Self::Mesh,
            "zmesh2" => Self::Mesh2,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixMode {
    #[default]
    Copy,
    Multiply,
    Multiply2,
    Add,
    Alpha,
    Transparent,
    DestAlphaAdd,
    SrcAlphaAdd,
    PremultAlpha,
    Mesh,
}

impl MixMode {
    pub fn from_token(s: &str) -> Option<Self> {
        Some(match s {
            "copy" => Self::Copy,
            "multiply" => Self::Multiply,
            "multiply2" => Self::Multiply2,
            "add" => Self::Add,
            "alpha" => Self::Alpha,
            "transparent" => Self::Transparent,
            "destalphaadd" => Self::DestAlphaAdd,
            "srcalphaadd" => Self::SrcAlphaAdd,
            "premultalpha" => Self::PremultAlpha,
            "mesh" => Self::Mesh,
            _ => return None,
        })
    }

    pub fn uses_destination_alpha(self) -> bool {
        matches!(self, Self::DestAlphaAdd)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaType {
    /// Derived from a texture's alpha channel at setup time.
    Auto { texture: Option<String> },
    #[default]
    None,
    Binary,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl Default for WriteMask {
    fn default() -> Self {
        Self {
            r: true,
            g: true,
            b: true,
            a: true,
        }
    }
}

/// Mesh-level render state consulted by conditions and adjusted by pass setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderMeshModes {
    /// Render buffers the mesh provides.
    pub buffers: BTreeSet<RenderBufferName>,
    pub mix_mode: MixMode,
    pub alpha_type: AlphaType,
    pub z_mode: ZMode,
    pub flip_culling: bool,
    pub z_offset: bool,
}

impl RenderMeshModes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffers(buffers: impl IntoIterator<Item = RenderBufferName>) -> Self {
        Self {
            buffers: buffers.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn has_buffer(&self, name: RenderBufferName) -> bool {
        self.buffers.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_descriptors_round_trip() {
        for (d, n) in RenderBufferName::DESCRIPTORS {
            assert_eq!(RenderBufferName::from_descr(d), Some(n));
            assert_eq!(n.descr(), d);
        }
        assert_eq!(RenderBufferName::from_descr("diffuse"), None);
    }

    #[test]
    fn tokens_parse() {
        assert_eq!(ZMode::from_token("ztest"), Some(ZMode::Test));
        assert_eq!(MixMode::from_token("add"), Some(MixMode::Add));
        assert!(MixMode::DestAlphaAdd.uses_destination_alpha());
        assert_eq!(MixMode::from_token("bogus"), None);
    }
}
