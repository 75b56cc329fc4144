//! Interfaces the compiler consumes from the renderer that hosts it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::preprocess::wrapped::NodeView;
use crate::state::modes::{AlphaType, RenderBufferName, RenderMeshModes, WriteMask, ZMode};
use crate::state::shadervar::{BufferHandle, ShaderVarStack, TextureHandle};

/// Vertex attribute slot a buffer can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexAttrib {
    /// Generic attribute `0..16`.
    Generic(u8),
    Position,
    Normal,
    /// Also known as the primary color.
    Color,
    SecondaryColor,
    TexCoord(u8),
}

impl VertexAttrib {
    pub const GENERIC_COUNT: u8 = 16;

    /// Attributes with a fixed meaning; these take default buffer mappings.
    pub fn is_specific(self) -> bool {
        !matches!(self, Self::Generic(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    #[default]
    None,
    RToTexture,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareFunc {
    #[default]
    LEqual,
    GEqual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureCompare {
    pub mode: CompareMode,
    pub function: CompareFunc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferBinding {
    pub attrib: VertexAttrib,
    pub buffer: Option<BufferHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub unit: i32,
    pub texture: Option<TextureHandle>,
    pub compare: TextureCompare,
}

/// Renderer capabilities consulted while loading techniques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsCaps {
    pub destination_alpha: bool,
}

impl Default for GraphicsCaps {
    fn default() -> Self {
        Self {
            destination_alpha: true,
        }
    }
}

/// Pipeline state a pass manipulates while it is active.
pub trait Graphics {
    fn z_mode(&self) -> ZMode;

    fn set_z_mode(&mut self, mode: ZMode);

    fn write_mask(&self) -> WriteMask;

    fn set_write_mask(&mut self, mask: WriteMask);

    /// Binds the mesh buffers named by `defaults` plus the explicitly resolved `custom` ones.
    fn activate_buffers(
        &mut self,
        defaults: &[(VertexAttrib, RenderBufferName)],
        custom: &[BufferBinding],
    );

    fn deactivate_buffers(&mut self, attribs: &[VertexAttrib]);

    fn set_texture_state(&mut self, textures: &[TextureBinding]);

    fn clear_texture_state(&mut self, units: &[i32]);

    /// Alpha classification of a texture's contents.
    fn texture_alpha_type(&self, _texture: &TextureHandle) -> AlphaType {
        AlphaType::None
    }
}

/// A vertex, fragment or vertex preprocessing program supplied by a program plugin.
pub trait ShaderProgram {
    /// Reads the program description. `resolver` is the pass's fragment program, if any.
    fn load(&mut self, resolver: Option<&dyn ShaderProgram>, node: &NodeView<'_>) -> bool;

    fn compile(&mut self) -> bool;

    fn activate(&mut self);

    fn deactivate(&mut self);

    fn setup_state(&mut self, modes: &RenderMeshModes, stack: &ShaderVarStack);

    fn reset_state(&mut self);

    fn used_shader_vars(&self, _names: &mut BTreeSet<String>) {}

    /// Texture unit bound to a symbolic destination.
    fn resolve_texture_unit(&self, _binding: &str) -> Option<i32> {
        None
    }

    fn resolve_buffer_destination(&self, _binding: &str) -> Option<VertexAttrib> {
        None
    }
}

pub trait ProgramFactory {
    /// Creates an empty program, or `None` when `plugin` is not available.
    fn create(&self, plugin: &str, program_type: &str) -> Option<Box<dyn ShaderProgram>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPresence {
    #[default]
    Neutral,
    Forbidden,
    Required,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagOptions {
    pub presence: TagPresence,
    pub priority: i32,
}

/// Technique tags known to the shader manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShaderTags {
    tags: BTreeMap<String, TagOptions>,
}

impl ShaderTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>, presence: TagPresence, priority: i32) -> Self {
        self.set_tag_options(tag, presence, priority);
        self
    }

    pub fn set_tag_options(&mut self, tag: impl Into<String>, presence: TagPresence, priority: i32) {
        self.tags.insert(tag.into(), TagOptions { presence, priority });
    }

    /// Options of `tag`; unknown tags are neutral with priority 0.
    pub fn tag_options(&self, tag: &str) -> TagOptions {
        self.tags.get(tag).copied().unwrap_or_default()
    }

    pub fn count(&self, presence: TagPresence) -> usize {
        self.tags.values().filter(|o| o.presence == presence).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_are_neutral() {
        let tags = ShaderTags::new()
            .with_tag("lowend", TagPresence::Forbidden, 0)
            .with_tag("bumpmap", TagPresence::Neutral, 5)
            .with_tag("core", TagPresence::Required, 0);
        assert_eq!(tags.tag_options("bumpmap").priority, 5);
        assert_eq!(tags.tag_options("nope"), TagOptions::default());
        assert_eq!(tags.count(TagPresence::Required), 1);
        assert_eq!(tags.count(TagPresence::Forbidden), 1);
    }

    #[test]
    fn tags_load_from_json() {
        let tags: ShaderTags =
            serde_json::from_str(r#"{ "hdr": { "presence": "required" } }"#).unwrap();
        assert_eq!(tags.tag_options("hdr").presence, TagPresence::Required);
        assert_eq!(tags.tag_options("hdr").priority, 0);
    }

    #[test]
    fn only_generic_attributes_are_unspecific() {
        assert!(!VertexAttrib::Generic(3).is_specific());
        assert!(VertexAttrib::TexCoord(0).is_specific());
        assert!(VertexAttrib::Position.is_specific());
    }
}
