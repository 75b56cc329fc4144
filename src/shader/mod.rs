//! Shaders, techniques and passes built on top of a wrapped document.

pub mod compiler;
pub mod host;
pub(crate) mod pass;
pub(crate) mod technique;
pub mod xmlshader;

pub use compiler::{CompilerEnv, ShaderCompiler};
pub use host::{
    BufferBinding, CompareFunc, CompareMode, Graphics, GraphicsCaps, ProgramFactory,
    ShaderProgram, ShaderTags, TagOptions, TagPresence, TextureBinding, TextureCompare,
    VertexAttrib,
};
pub use pass::{DIFFUSE_TEXTURE_VAR, LIGHT_COUNT_VAR, PassScratch};
pub use xmlshader::{Ticket, XmlShader};
