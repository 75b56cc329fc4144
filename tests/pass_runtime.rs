mod common;

use common::{MockGraphics, RecordingFactory, compile, compiler, compiler_with};
use xmlshader::shader::{
    BufferBinding, CompareFunc, CompareMode, GraphicsCaps, ShaderTags, VertexAttrib,
};
use xmlshader::{
    AlphaType, BufferHandle, CompilerEnv, CompilerOptions, MemoryFiles, MixMode, PassScratch,
    RenderBufferName, RenderMeshModes, ShaderCompiler, ShaderVarStack, ShaderVariable,
    TextureHandle, WriteMask, ZMode,
};

const LIT: &str = r#"<shader name="lit" type="xmlshader">
  <technique priority="1">
    <pass minlights="1">
      <vp plugin="vertex"/>
      <fp plugin="fragment"/>
      <mixmode><alpha>0.25</alpha></mixmode>
      <alphamode><binary/></alphamode>
      <zmode><ztest/></zmode>
      <writemask r="false" a="false"/>
      <buffer destination="attribute 3" customsource="weights"/>
      <buffer destination="texture coordinate 1" source="texture coordinate 1"/>
      <texture name="tex diffuse" destination="unit 2"/>
      <texture name="tex spec" destination="diffuse map" comparemode="rToTexture" comparefunc="gequal"/>
    </pass>
  </technique>
</shader>"#;

fn lit_stack() -> ShaderVarStack {
    let mut s = ShaderVarStack::new();
    s.set(xmlshader::shader::LIGHT_COUNT_VAR, ShaderVariable::Int(1));
    s.set("weights", ShaderVariable::Buffer(BufferHandle("w".to_owned())));
    s.set("tex diffuse", ShaderVariable::Texture(TextureHandle("d".to_owned())));
    s
}

#[test]
fn pass_binds_and_restores_state() {
    let factory = RecordingFactory::default();
    let c = compiler(MemoryFiles::new(), factory.clone());
    let mut shader = compile(&c, LIT);
    let stack = lit_stack();
    let mut modes =
        RenderMeshModes::with_buffers([RenderBufferName::Position, RenderBufferName::TexCoord1]);
    let t = shader.get_ticket(&modes, &stack).unwrap();

    let mut g3d = MockGraphics::default();
    let mut scratch = PassScratch::new();
    assert!(shader.activate_pass(t, 0, &mut g3d));
    assert!(!shader.activate_pass(t, 0, &mut g3d));
    assert_eq!(g3d.z_mode, ZMode::Test);
    assert_eq!(
        g3d.write_mask,
        WriteMask {
            r: false,
            g: true,
            b: true,
            a: false
        }
    );

    assert!(shader.setup_pass(t, &mut g3d, &mut scratch, &mut modes, &stack));
    assert!(g3d.defaults.contains(&(VertexAttrib::Position, RenderBufferName::Position)));
    assert!(g3d.defaults.contains(&(VertexAttrib::TexCoord(1), RenderBufferName::TexCoord1)));
    assert!(!g3d.defaults.iter().any(|(a, _)| *a == VertexAttrib::Normal));
    assert_eq!(
        g3d.buffers,
        vec![BufferBinding {
            attrib: VertexAttrib::Generic(3),
            buffer: Some(BufferHandle("w".to_owned())),
        }]
    );
    assert_eq!(g3d.textures.len(), 2);
    assert_eq!(g3d.textures[0].unit, 2);
    assert_eq!(g3d.textures[0].texture, Some(TextureHandle("d".to_owned())));
    assert_eq!(g3d.textures[1].unit, 5);
    assert_eq!(g3d.textures[1].texture, None);
    assert_eq!(g3d.textures[1].compare.mode, CompareMode::RToTexture);
    assert_eq!(g3d.textures[1].compare.function, CompareFunc::GEqual);
    assert_eq!(modes.alpha_type, AlphaType::Binary);
    assert_eq!(modes.mix_mode, MixMode::Alpha);
    assert_eq!(scratch.mixmode_alpha, 0.75);

    assert!(shader.teardown_pass(t, &mut g3d));
    assert_eq!(g3d.released_attribs, vec![VertexAttrib::Generic(3)]);
    assert_eq!(g3d.released_units, vec![2, 5]);

    assert!(shader.deactivate_pass(t, &mut g3d));
    assert_eq!(g3d.z_mode, ZMode::Use);
    assert_eq!(g3d.write_mask, WriteMask::default());
    assert!(!shader.deactivate_pass(t, &mut g3d));

    let log = factory.log.borrow();
    let order: Vec<&str> = log
        .iter()
        .map(String::as_str)
        .filter(|e| !e.starts_with("load"))
        .collect();
    assert_eq!(
        order,
        [
            "activate vertex",
            "activate fragment",
            "setup vertex",
            "setup fragment",
            "reset vertex",
            "reset fragment",
            "deactivate vertex",
            "deactivate fragment",
        ]
    );
}

#[test]
fn too_few_lights_skip_setup() {
    let c = compiler(MemoryFiles::new(), RecordingFactory::default());
    let mut shader = compile(&c, LIT);
    let mut stack = lit_stack();
    stack.remove(xmlshader::shader::LIGHT_COUNT_VAR);
    let mut modes = RenderMeshModes::new();
    let t = shader.get_ticket(&modes, &stack).unwrap();

    let mut g3d = MockGraphics::default();
    assert!(shader.activate_pass(t, 0, &mut g3d));
    assert!(!shader.setup_pass(t, &mut g3d, &mut PassScratch::new(), &mut modes, &stack));
    assert!(g3d.buffers.is_empty());
    assert!(shader.deactivate_pass(t, &mut g3d));
}

#[test]
fn used_variables_cover_mappings() {
    let c = compiler(MemoryFiles::new(), RecordingFactory::default());
    let mut shader = compile(&c, LIT);
    let t = shader
        .get_ticket(&RenderMeshModes::new(), &ShaderVarStack::new())
        .unwrap();
    let used = shader.used_shader_vars(t);
    for name in ["weights", "tex diffuse", "tex spec"] {
        assert!(used.contains(name), "{name} missing from {used:?}");
    }
}

#[test]
fn auto_alpha_follows_the_diffuse_texture() {
    let c = compiler(MemoryFiles::new(), RecordingFactory::default());
    let mut shader = compile(
        &c,
        r#"<shader name="auto" type="xmlshader"><technique priority="1"><pass/></technique></shader>"#,
    );
    let mut modes = RenderMeshModes::new();
    modes.alpha_type = AlphaType::Smooth;
    let stack = ShaderVarStack::new();
    let t = shader.get_ticket(&modes, &stack).unwrap();

    let mut g3d = MockGraphics::default();
    assert!(shader.activate_pass(t, 0, &mut g3d));
    assert!(shader.setup_pass(t, &mut g3d, &mut PassScratch::new(), &mut modes, &stack));
    // Without a diffuse texture the mock reports no alpha.
    assert_eq!(modes.alpha_type, AlphaType::None);
    assert_eq!(modes.mix_mode, MixMode::Copy);
    assert!(shader.deactivate_pass(t, &mut g3d));
}

fn verbose_compiler() -> ShaderCompiler {
    compiler_with(
        MemoryFiles::new(),
        RecordingFactory::default(),
        CompilerOptions {
            verbose: true,
            ..CompilerOptions::default()
        },
        ShaderTags::new(),
    )
}

fn single_pass(pass_body: &str) -> String {
    format!(
        r#"<shader name="bad" type="xmlshader"><technique priority="1"><pass>{pass_body}</pass></technique></shader>"#
    )
}

#[test]
fn invalid_buffer_mappings_fail_the_technique() {
    for (body, reason) in [
        (
            r#"<buffer destination="position" source="index"/>"#,
            "invalid buffermapping, 'index' not allowed here.",
        ),
        (
            r#"<buffer destination="normal"/>"#,
            "invalid buffermapping, source missing.",
        ),
    ] {
        let c = verbose_compiler();
        let mut shader = compile(&c, &single_pass(body));
        assert_eq!(
            shader.get_ticket(&RenderMeshModes::new(), &ShaderVarStack::new()),
            None
        );
        assert!(c.diagnostics().contains(reason), "{body}");
        assert!(c.diagnostics().contains("No technique validated for shader 'bad'"));
    }
}

#[test]
fn unknown_buffer_destination_is_skipped() {
    let c = verbose_compiler();
    let mut shader = compile(
        &c,
        &single_pass(r#"<buffer destination="tangent space" source="tangent"/>"#),
    );
    assert!(
        shader
            .get_ticket(&RenderMeshModes::new(), &ShaderVarStack::new())
            .is_some()
    );
    assert!(c.diagnostics().contains("invalid buffer destination 'tangent space'"));
}

#[test]
fn invalid_texture_comparison_fails_the_technique() {
    let c = verbose_compiler();
    let mut shader = compile(
        &c,
        &single_pass(
            r#"<texture name="shadow" destination="unit 0" comparemode="sometimes" comparefunc="lequal"/>"#,
        ),
    );
    assert_eq!(
        shader.get_ticket(&RenderMeshModes::new(), &ShaderVarStack::new()),
        None
    );
    assert!(c.diagnostics().contains("invalid texture comparison mode 'sometimes'"));
}

#[test]
fn destination_alpha_requires_renderer_support() {
    let env = CompilerEnv::new(MemoryFiles::new(), RecordingFactory::default())
        .with_caps(GraphicsCaps {
            destination_alpha: false,
        });
    let c = ShaderCompiler::new(env);
    let xml = single_pass("<mixmode><destalphaadd/></mixmode>");
    let mut shader = compile(&c, &xml);
    assert_eq!(
        shader.get_ticket(&RenderMeshModes::new(), &ShaderVarStack::new()),
        None
    );

    let c = compiler(MemoryFiles::new(), RecordingFactory::default());
    let mut shader = compile(&c, &xml);
    assert!(
        shader
            .get_ticket(&RenderMeshModes::new(), &ShaderVarStack::new())
            .is_some()
    );
}
