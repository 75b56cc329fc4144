use std::rc::Rc;

use crate::condition::constants::ConstantTable;
use crate::condition::evaluator::ConditionEvaluator;
use crate::diagnostics::{Diagnostics, Severity};
use crate::document::node::{NodeKind, SourceNode};
use crate::document::xml::parse_document;
use crate::foundation::error::{ShaderError, ShaderResult};
use crate::options::CompilerOptions;
use crate::preprocess::Preprocessor;
use crate::preprocess::files::FileSource;
use crate::preprocess::wrapped::ReadContext;
use crate::resolver::runtime::ConditionResolver;
use crate::state::modes::RenderMeshModes;
use crate::state::shadervar::ShaderVarStack;

use super::host::{GraphicsCaps, ProgramFactory, ShaderTags};
use super::technique::read_shader_vars;
use super::xmlshader::XmlShader;

const MAX_FALLBACK_DEPTH: usize = 8;

/// Services and settings shared by a compiler and every shader it produces.
pub struct CompilerEnv {
    pub(crate) options: CompilerOptions,
    pub(crate) files: Box<dyn FileSource>,
    pub(crate) programs: Box<dyn ProgramFactory>,
    pub(crate) tags: ShaderTags,
    pub(crate) caps: GraphicsCaps,
    pub(crate) constants: ConstantTable,
    pub(crate) diagnostics: Diagnostics,
}

impl CompilerEnv {
    pub fn new(files: impl FileSource + 'static, programs: impl ProgramFactory + 'static) -> Self {
        Self {
            options: CompilerOptions::default(),
            files: Box::new(files),
            programs: Box::new(programs),
            tags: ShaderTags::default(),
            caps: GraphicsCaps::default(),
            constants: ConstantTable::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_tags(mut self, tags: ShaderTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_caps(mut self, caps: GraphicsCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_constants(mut self, constants: ConstantTable) -> Self {
        self.constants = constants;
        self
    }
}

pub struct ShaderCompiler {
    env: Rc<CompilerEnv>,
}

impl ShaderCompiler {
    pub fn new(env: CompilerEnv) -> Self {
        Self { env: Rc::new(env) }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.env.diagnostics
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.env.options
    }

    /// True if `shader` is a `<shader type="xmlshader">` element with content.
    pub fn is_template_to_compiler(&self, shader: &SourceNode) -> bool {
        if !shader.is_element() || shader.value != "shader" {
            return false;
        }
        let ty = shader.attribute("type");
        if ty != Some("xmlshader") {
            self.env.diagnostics.report(
                Severity::Error,
                format!(
                    "Type of shader '{}' is not 'xmlshader', but '{}'",
                    shader.attribute("name").unwrap_or_default(),
                    ty.unwrap_or_default()
                ),
            );
            return false;
        }
        !shader.children.is_empty()
    }

    /// Compiles a document whose root, or first root element, is the `<shader>`.
    pub fn compile(&self, doc: &SourceNode) -> ShaderResult<XmlShader> {
        self.compile_with_priority(doc, self.env.options.force_priority)
    }

    pub fn compile_with_priority(
        &self,
        doc: &SourceNode,
        force_priority: Option<i32>,
    ) -> ShaderResult<XmlShader> {
        self.compile_nested(doc, force_priority, 0)
    }

    pub fn compile_file(&self, path: &str) -> ShaderResult<XmlShader> {
        self.compile_file_nested(path, 0)
    }

    /// Priorities of the techniques a shader offers under the default render state, best first.
    pub fn priorities(&self, doc: &SourceNode) -> ShaderResult<Vec<i32>> {
        let shader = self.compile(doc)?;
        Ok(shader.technique_priorities(&RenderMeshModes::default(), &ShaderVarStack::new()))
    }

    fn read_document(&self, path: &str) -> ShaderResult<SourceNode> {
        let text = self
            .env
            .files
            .read(path)
            .map_err(|e| ShaderError::io(format!("{path}: {e}")))?;
        Ok(parse_document(&text)?)
    }

    fn compile_file_nested(&self, path: &str, depth: usize) -> ShaderResult<XmlShader> {
        let doc = self.read_document(path)?;
        self.compile_nested(&doc, self.env.options.force_priority, depth)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(depth = depth))]
    fn compile_nested(
        &self,
        doc: &SourceNode,
        force_priority: Option<i32>,
        depth: usize,
    ) -> ShaderResult<XmlShader> {
        let shader = shader_element(doc)
            .ok_or_else(|| ShaderError::structure("document has no <shader> element"))?;
        let name = shader.attribute("name").unwrap_or_default().to_owned();
        if !self.is_template_to_compiler(shader) {
            return Err(ShaderError::structure(format!(
                "'{name}' is not an xmlshader template"
            )));
        }
        if depth > MAX_FALLBACK_DEPTH {
            return Err(ShaderError::structure(format!(
                "Fallback chain of shader '{name}' is too deep"
            )));
        }

        let wrap_root = match doc.kind {
            NodeKind::Root => doc.clone(),
            _ => SourceNode::root().with_child(shader.clone()),
        };
        let mut resolver =
            ConditionResolver::new(ConditionEvaluator::new(self.env.constants.clone()));
        let wrapped = Preprocessor::new(&*self.env.files, &self.env.diagnostics, &self.env.options)
            .wrap(&wrap_root, &mut resolver);

        let modes = RenderMeshModes::default();
        let stack = ShaderVarStack::new();
        let mut variables = ShaderVarStack::new();
        let mut fallback_source = None;
        if let Some(view) = wrapped
            .document
            .view(ReadContext::new(&resolver, &modes, &stack))
            .first_child("shader")
        {
            if let Some(block) = view.first_child("shadervars") {
                read_shader_vars(&block, &mut variables, &name, &self.env.diagnostics);
            }
            fallback_source = view.first_child("fallbackshader").map(|n| n.materialize());
        }

        let fallback = fallback_source.and_then(|node| {
            match self.load_fallback(&node, depth) {
                Ok(f) => Some(Box::new(f)),
                Err(e) => {
                    self.env.diagnostics.report(
                        Severity::Error,
                        format!("Unable to load fallback shader of '{name}': {e}"),
                    );
                    None
                }
            }
        });

        tracing::debug!(
            shader = %name,
            variants = resolver.variant_count(),
            techniques = wrapped.techniques.len(),
            fallback = fallback.is_some(),
            "shader compiled"
        );
        Ok(XmlShader::new(
            Rc::clone(&self.env),
            name,
            resolver,
            wrapped.techniques,
            wrapped.document,
            force_priority,
            variables,
            fallback,
            wrapped.dump,
        ))
    }

    fn load_fallback(&self, node: &SourceNode, depth: usize) -> ShaderResult<XmlShader> {
        if let Some(file) = node.attribute("file") {
            return self.compile_file_nested(file, depth + 1);
        }
        let inline = node
            .first_child("shader")
            .ok_or_else(|| ShaderError::structure("<fallbackshader> has no <shader> element"))?;
        self.compile_nested(inline, self.env.options.force_priority, depth + 1)
    }
}

fn shader_element(doc: &SourceNode) -> Option<&SourceNode> {
    match doc.kind {
        NodeKind::Root => doc.children.iter().find(|c| c.is_element()),
        NodeKind::Element => Some(doc),
        _ => None,
    }
}
