#![forbid(unsafe_code)]

pub mod condition;
pub mod diagnostics;
pub mod document;
pub mod expression;
pub mod foundation;
pub mod options;
pub mod preprocess;
pub mod resolver;
pub mod shader;
pub mod state;

pub use condition::constants::{ConstantTable, ConstantValue};
pub use condition::evaluator::{ConditionEvaluator, EvalCache};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use document::node::{NodeKind, SourceNode};
pub use document::xml::parse_document;
pub use foundation::error::{ShaderError, ShaderResult};
pub use foundation::ids::ConditionId;
pub use options::CompilerOptions;
pub use preprocess::files::{DirFiles, FileSource, MemoryFiles};
pub use preprocess::{Preprocessor, WrapResult};
pub use resolver::runtime::ConditionResolver;
pub use shader::{CompilerEnv, PassScratch, ShaderCompiler, XmlShader};
pub use state::modes::{AlphaType, MixMode, RenderBufferName, RenderMeshModes, WriteMask, ZMode};
pub use state::shadervar::{BufferHandle, ShaderVarStack, ShaderVariable, TextureHandle};
