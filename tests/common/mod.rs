#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use xmlshader::preprocess::wrapped::NodeView;
use xmlshader::shader::{
    BufferBinding, Graphics, ProgramFactory, ShaderProgram, ShaderTags, TextureBinding,
    VertexAttrib,
};
use xmlshader::{
    CompilerEnv, CompilerOptions, MemoryFiles, RenderBufferName, RenderMeshModes, ShaderCompiler,
    ShaderVarStack, WriteMask, XmlShader, ZMode,
};

pub type Log = Rc<RefCell<Vec<String>>>;

/// Program that records its lifecycle calls. Plugin `broken` fails to compile.
pub struct RecordingProgram {
    plugin: String,
    log: Log,
}

impl ShaderProgram for RecordingProgram {
    fn load(&mut self, _resolver: Option<&dyn ShaderProgram>, node: &NodeView<'_>) -> bool {
        self.log
            .borrow_mut()
            .push(format!("load {} <{}>", self.plugin, node.value()));
        true
    }

    fn compile(&mut self) -> bool {
        self.plugin != "broken"
    }

    fn activate(&mut self) {
        self.log.borrow_mut().push(format!("activate {}", self.plugin));
    }

    fn deactivate(&mut self) {
        self.log.borrow_mut().push(format!("deactivate {}", self.plugin));
    }

    fn setup_state(&mut self, _modes: &RenderMeshModes, _stack: &ShaderVarStack) {
        self.log.borrow_mut().push(format!("setup {}", self.plugin));
    }

    fn reset_state(&mut self) {
        self.log.borrow_mut().push(format!("reset {}", self.plugin));
    }

    fn resolve_texture_unit(&self, binding: &str) -> Option<i32> {
        (binding == "diffuse map").then_some(5)
    }
}

/// Creates recording programs for any plugin except `missing`.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub created: Rc<RefCell<Vec<String>>>,
    pub log: Log,
}

impl ProgramFactory for RecordingFactory {
    fn create(&self, plugin: &str, _program_type: &str) -> Option<Box<dyn ShaderProgram>> {
        if plugin == "missing" {
            return None;
        }
        self.created.borrow_mut().push(plugin.to_owned());
        Some(Box::new(RecordingProgram {
            plugin: plugin.to_owned(),
            log: Rc::clone(&self.log),
        }))
    }
}

#[derive(Debug)]
pub struct MockGraphics {
    pub z_mode: ZMode,
    pub write_mask: WriteMask,
    pub defaults: Vec<(VertexAttrib, RenderBufferName)>,
    pub buffers: Vec<BufferBinding>,
    pub textures: Vec<TextureBinding>,
    pub released_attribs: Vec<VertexAttrib>,
    pub released_units: Vec<i32>,
}

impl Default for MockGraphics {
    fn default() -> Self {
        Self {
            z_mode: ZMode::Use,
            write_mask: WriteMask::default(),
            defaults: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            released_attribs: Vec::new(),
            released_units: Vec::new(),
        }
    }
}

impl Graphics for MockGraphics {
    fn z_mode(&self) -> ZMode {
        self.z_mode
    }

    fn set_z_mode(&mut self, mode: ZMode) {
        self.z_mode = mode;
    }

    fn write_mask(&self) -> WriteMask {
        self.write_mask
    }

    fn set_write_mask(&mut self, mask: WriteMask) {
        self.write_mask = mask;
    }

    fn activate_buffers(
        &mut self,
        defaults: &[(VertexAttrib, RenderBufferName)],
        custom: &[BufferBinding],
    ) {
        self.defaults = defaults.to_vec();
        self.buffers = custom.to_vec();
    }

    fn deactivate_buffers(&mut self, attribs: &[VertexAttrib]) {
        self.released_attribs.extend_from_slice(attribs);
    }

    fn set_texture_state(&mut self, textures: &[TextureBinding]) {
        self.textures = textures.to_vec();
    }

    fn clear_texture_state(&mut self, units: &[i32]) {
        self.released_units.extend_from_slice(units);
    }
}

/// Routes diagnostics to the test output; safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn compiler(files: MemoryFiles, factory: RecordingFactory) -> ShaderCompiler {
    compiler_with(files, factory, CompilerOptions::default(), ShaderTags::new())
}

pub fn compiler_with(
    files: MemoryFiles,
    factory: RecordingFactory,
    options: CompilerOptions,
    tags: ShaderTags,
) -> ShaderCompiler {
    init_logging();
    ShaderCompiler::new(
        CompilerEnv::new(files, factory)
            .with_options(options)
            .with_tags(tags),
    )
}

pub fn compile(compiler: &ShaderCompiler, xml: &str) -> XmlShader {
    let doc = xmlshader::parse_document(xml).unwrap();
    compiler.compile(&doc).unwrap()
}

pub fn int_var(name: &str, value: i32) -> ShaderVarStack {
    let mut s = ShaderVarStack::new();
    s.set(name, xmlshader::ShaderVariable::Int(value));
    s
}
