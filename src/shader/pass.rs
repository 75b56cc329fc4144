use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::Severity;
use crate::preprocess::wrapped::{NodeView, ReadContext, parse_bool};
use crate::state::modes::{AlphaType, MixMode, RenderBufferName, RenderMeshModes, WriteMask, ZMode};
use crate::state::shadervar::{BufferHandle, ShaderVarStack, ShaderVariable};

use super::host::{
    BufferBinding, CompareFunc, CompareMode, Graphics, ShaderProgram, TextureBinding,
    TextureCompare, VertexAttrib,
};
use super::technique::LoadContext;

/// Shader variable holding the number of lights affecting a mesh.
pub const LIGHT_COUNT_VAR: &str = "light count";
/// Texture whose alpha channel decides the alpha type of `auto` passes.
pub const DIFFUSE_TEXTURE_VAR: &str = "tex diffuse";

/// Per-draw buffers reused across [`crate::shader::XmlShader::setup_pass`] calls.
#[derive(Debug, Clone, Default)]
pub struct PassScratch {
    pub defaults: Vec<(VertexAttrib, RenderBufferName)>,
    pub buffers: Vec<BufferBinding>,
    pub textures: Vec<TextureBinding>,
    /// Value for the `mixmode alpha` shader variable.
    pub mixmode_alpha: f32,
}

impl PassScratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.defaults.clear();
        self.buffers.clear();
        self.textures.clear();
        self.mixmode_alpha = 1.0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MappingSource {
    Buffer(RenderBufferName),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CustomMapping {
    attrib: VertexAttrib,
    source: MappingSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TextureMapping {
    name: String,
    indices: Vec<usize>,
    unit: i32,
    compare: TextureCompare,
}

/// State saved by [`Pass::activate`] and restored by [`Pass::deactivate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SavedState {
    z_mode: Option<ZMode>,
    write_mask: WriteMask,
}

enum ProgramLoad {
    Absent,
    Loaded(Box<dyn ShaderProgram>),
    Failed,
}

pub(crate) struct Pass {
    vp: Option<Box<dyn ShaderProgram>>,
    fp: Option<Box<dyn ShaderProgram>>,
    vproc: Option<Box<dyn ShaderProgram>>,
    mix_mode: MixMode,
    /// Strength of an `<alpha>` mix mode.
    mix_alpha: f32,
    alpha: AlphaType,
    z_mode: Option<ZMode>,
    flip_culling: bool,
    z_offset: bool,
    write_mask: WriteMask,
    min_lights: i32,
    default_mappings: BTreeMap<VertexAttrib, Option<RenderBufferName>>,
    custom_mappings: Vec<CustomMapping>,
    textures: Vec<TextureMapping>,
}

impl Pass {
    fn new() -> Self {
        let default_mappings = [
            (VertexAttrib::Position, RenderBufferName::Position),
            (VertexAttrib::Normal, RenderBufferName::Normal),
            (VertexAttrib::Color, RenderBufferName::Color),
            (VertexAttrib::TexCoord(0), RenderBufferName::TexCoord0),
        ]
        .into_iter()
        .map(|(a, b)| (a, Some(b)))
        .collect();
        Self {
            vp: None,
            fp: None,
            vproc: None,
            mix_mode: MixMode::Mesh,
            mix_alpha: 0.0,
            alpha: AlphaType::Auto {
                texture: Some(DIFFUSE_TEXTURE_VAR.to_owned()),
            },
            z_mode: None,
            flip_culling: false,
            z_offset: false,
            write_mask: WriteMask::default(),
            min_lights: 0,
            default_mappings,
            custom_mappings: Vec::new(),
            textures: Vec::new(),
        }
    }

    /// Loads pass `number` from its `<pass>` element; the error is the failure reason.
    pub(crate) fn load(
        ctx: &LoadContext<'_>,
        node: &NodeView<'_>,
        number: usize,
    ) -> Result<Self, String> {
        let mut pass = Self::new();
        let mut failure: Option<String> = None;

        // The fragment program goes first: the others may resolve destinations through it.
        match load_program(ctx, node, "fp", None) {
            ProgramLoad::Loaded(p) => pass.fp = Some(p),
            ProgramLoad::Failed => {
                failure.get_or_insert_with(|| format!("pass {number} fragment program failed to load"));
            }
            ProgramLoad::Absent => {}
        }
        match load_program(ctx, node, "vp", pass.fp.as_deref()) {
            ProgramLoad::Loaded(p) => pass.vp = Some(p),
            ProgramLoad::Failed => {
                failure.get_or_insert_with(|| format!("pass {number} vertex program failed to load"));
            }
            ProgramLoad::Absent => {}
        }
        match load_program(ctx, node, "vproc", pass.fp.as_deref()) {
            ProgramLoad::Loaded(p) => pass.vproc = Some(p),
            ProgramLoad::Failed => {
                failure.get_or_insert_with(|| {
                    format!("pass {number} vertex preprocessor failed to load")
                });
            }
            ProgramLoad::Absent => {}
        }
        if let Some(reason) = failure {
            return Err(reason);
        }

        pass.parse_modes(ctx, node);
        if pass.mix_mode.uses_destination_alpha() && !ctx.env.caps.destination_alpha {
            return Err("destination alpha not supported by renderer".to_owned());
        }
        pass.parse_buffers(ctx, node, number)?;
        pass.parse_textures(node)?;
        Ok(pass)
    }

    fn parse_modes(&mut self, ctx: &LoadContext<'_>, node: &NodeView<'_>) {
        if let Some(mm) = node.first_child("mixmode") {
            match mm.elements().next() {
                Some(token) if token.value() == "alpha" => {
                    self.mix_mode = MixMode::Alpha;
                    self.mix_alpha = token
                        .contents_value()
                        .trim()
                        .parse::<f32>()
                        .map(|a| a.clamp(0.0, 1.0))
                        .unwrap_or(0.5);
                }
                Some(token) => match MixMode::from_token(token.value()) {
                    Some(m) => self.mix_mode = m,
                    None => ctx.bad_token(token.value(), "mixmode"),
                },
                None => ctx.bad_token("", "mixmode"),
            }
        }

        if let Some(am) = node.first_child("alphamode") {
            match am.elements().next() {
                Some(token) => match token.value() {
                    "auto" => {
                        self.alpha = AlphaType::Auto {
                            texture: Some(
                                token
                                    .attribute("texture")
                                    .unwrap_or(DIFFUSE_TEXTURE_VAR)
                                    .to_owned(),
                            ),
                        };
                    }
                    "none" => self.alpha = AlphaType::None,
                    "binary" => self.alpha = AlphaType::Binary,
                    "smooth" => self.alpha = AlphaType::Smooth,
                    other => ctx.bad_token(other, "alphamode"),
                },
                None => ctx.bad_token("", "alphamode"),
            }
        }

        if let Some(zm) = node.first_child("zmode") {
            let token = zm.elements().next();
            let name = token.as_ref().map(NodeView::value).unwrap_or("");
            match ZMode::from_token(name) {
                Some(z) => self.z_mode = Some(z),
                None => ctx.bad_token(name, "zmode"),
            }
        }

        if let Some(n) = node.first_child("flipculling") {
            self.flip_culling = parse_bool(&n.contents_value()).unwrap_or(false);
        }
        if let Some(n) = node.first_child("zoffset") {
            self.z_offset = parse_bool(&n.contents_value()).unwrap_or(false);
        }

        self.write_mask = WriteMask::default();
        if let Some(wm) = node.first_child("writemask") {
            let channel = |name: &str, current: bool| {
                wm.attribute(name)
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(current)
            };
            self.write_mask = WriteMask {
                r: channel("r", true),
                g: channel("g", true),
                b: channel("b", true),
                a: channel("a", true),
            };
        }

        self.min_lights = node.attribute_as_int("minlights");
    }

    fn parse_buffers(
        &mut self,
        ctx: &LoadContext<'_>,
        node: &NodeView<'_>,
        number: usize,
    ) -> Result<(), String> {
        for mapping in node.children_named("buffer") {
            let dest = mapping.attribute("destination").unwrap_or("");
            let Some(attrib) = self.buffer_destination(dest) else {
                if ctx.env.options.verbose {
                    ctx.env.diagnostics.warning(format!(
                        "Shader '{}', pass {number}: invalid buffer destination '{dest}'",
                        ctx.shader
                    ));
                }
                continue;
            };

            let custom = mapping.attribute("customsource");
            let source = mapping.attribute("source");
            if source.is_none() && custom.is_none() {
                return Err("invalid buffermapping, source missing.".to_owned());
            }
            let unmapped = source.is_some_and(|s| s.eq_ignore_ascii_case("none"));
            let buffer = source.and_then(RenderBufferName::from_descr);

            if !unmapped && (buffer.is_none() || custom.is_some()) {
                let name = custom.or(source).unwrap_or_default();
                self.custom_mappings.push(CustomMapping {
                    attrib,
                    source: MappingSource::Variable(name.to_owned()),
                });
                continue;
            }

            if buffer == Some(RenderBufferName::Index) {
                return Err(format!(
                    "invalid buffermapping, '{}' not allowed here.",
                    source.unwrap_or_default()
                ));
            }
            if attrib.is_specific() {
                self.default_mappings.insert(attrib, buffer);
            } else if let Some(buffer) = buffer {
                self.custom_mappings.push(CustomMapping {
                    attrib,
                    source: MappingSource::Buffer(buffer),
                });
                // Positions bound to a generic slot are no longer bound by default.
                if buffer == RenderBufferName::Position {
                    self.default_mappings.insert(VertexAttrib::Position, None);
                }
            }
        }
        Ok(())
    }

    fn buffer_destination(&self, dest: &str) -> Option<VertexAttrib> {
        let lower = dest.to_ascii_lowercase();
        if let Some(n) = lower.strip_prefix("attribute ")
            && let Ok(i) = n.parse::<u8>()
            && i < VertexAttrib::GENERIC_COUNT
        {
            return Some(VertexAttrib::Generic(i));
        }
        match lower.as_str() {
            "position" => return Some(VertexAttrib::Position),
            "normal" => return Some(VertexAttrib::Normal),
            "color" | "primary color" => return Some(VertexAttrib::Color),
            "secondary color" => return Some(VertexAttrib::SecondaryColor),
            "texture coordinate" => return Some(VertexAttrib::TexCoord(0)),
            _ => {}
        }
        if lower.starts_with("texture coordinate ") {
            let target = &dest["texture coordinate ".len()..];
            let unit = self
                .fp
                .as_ref()
                .and_then(|fp| fp.resolve_texture_unit(target))
                .filter(|u| *u >= 0)
                .or_else(|| target.trim().parse::<i32>().ok())?;
            return u8::try_from(unit).ok().map(VertexAttrib::TexCoord);
        }
        self.vp
            .as_ref()
            .and_then(|vp| vp.resolve_buffer_destination(dest))
    }

    fn parse_textures(&mut self, node: &NodeView<'_>) -> Result<(), String> {
        for mapping in node.children_named("texture") {
            let (Some(name), Some(dest)) = (mapping.attribute("name"), mapping.attribute("destination"))
            else {
                continue;
            };
            let mut unit = self
                .fp
                .as_ref()
                .and_then(|fp| fp.resolve_texture_unit(dest))
                .unwrap_or(-1);
            if unit < 0
                && dest.len() >= 5
                && dest.is_char_boundary(5)
                && dest[..5].eq_ignore_ascii_case("unit ")
            {
                unit = dest[5..].trim().parse().unwrap_or(-1);
            }
            if unit < 0 {
                continue;
            }

            let mut compare = TextureCompare::default();
            if let (Some(mode), Some(func)) =
                (mapping.attribute("comparemode"), mapping.attribute("comparefunc"))
            {
                compare.mode = match mode {
                    "rToTexture" => CompareMode::RToTexture,
                    "none" => CompareMode::None,
                    _ => return Err(format!("invalid texture comparison mode '{mode}'")),
                };
                compare.function = match func {
                    "lequal" => CompareFunc::LEqual,
                    "gequal" => CompareFunc::GEqual,
                    _ => return Err(format!("invalid texture comparison function '{func}'")),
                };
            }

            let (name, indices) = split_indices(name);
            self.textures.push(TextureMapping {
                name,
                indices,
                unit,
                compare,
            });
        }
        Ok(())
    }

    fn programs_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn ShaderProgram>> {
        [&mut self.vproc, &mut self.vp, &mut self.fp]
            .into_iter()
            .filter_map(Option::as_mut)
    }

    pub(crate) fn activate(&mut self, g3d: &mut dyn Graphics) -> SavedState {
        for p in self.programs_mut() {
            p.activate();
        }
        let z_mode = self.z_mode.map(|z| {
            let old = g3d.z_mode();
            g3d.set_z_mode(z);
            old
        });
        let write_mask = g3d.write_mask();
        g3d.set_write_mask(self.write_mask);
        SavedState { z_mode, write_mask }
    }

    pub(crate) fn setup(
        &mut self,
        g3d: &mut dyn Graphics,
        scratch: &mut PassScratch,
        modes: &mut RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> bool {
        let lights = stack.get(LIGHT_COUNT_VAR).map(ShaderVariable::int).unwrap_or(0);
        if lights < self.min_lights {
            return false;
        }
        if let Some(vproc) = self.vproc.as_mut() {
            vproc.setup_state(modes, stack);
        }

        scratch.clear();
        scratch.defaults.extend(
            self.default_mappings
                .iter()
                .filter_map(|(a, b)| b.map(|b| (*a, b)))
                .filter(|(_, b)| modes.has_buffer(*b)),
        );
        for m in &self.custom_mappings {
            let buffer = match &m.source {
                MappingSource::Buffer(b) => modes
                    .has_buffer(*b)
                    .then(|| BufferHandle(b.descr().to_owned())),
                MappingSource::Variable(name) => {
                    stack.get(name).and_then(ShaderVariable::buffer).cloned()
                }
            };
            scratch.buffers.push(BufferBinding {
                attrib: m.attrib,
                buffer,
            });
        }
        g3d.activate_buffers(&scratch.defaults, &scratch.buffers);

        for t in &self.textures {
            scratch.textures.push(TextureBinding {
                unit: t.unit,
                texture: stack
                    .lookup(&t.name, &t.indices)
                    .and_then(ShaderVariable::texture)
                    .cloned(),
                compare: t.compare,
            });
        }
        g3d.set_texture_state(&scratch.textures);

        modes.alpha_type = match &self.alpha {
            AlphaType::Auto { texture } => texture
                .as_deref()
                .and_then(|name| stack.get(name))
                .and_then(ShaderVariable::texture)
                .map(|tex| g3d.texture_alpha_type(tex))
                .unwrap_or(AlphaType::None),
            explicit => explicit.clone(),
        };
        if self.mix_mode != MixMode::Mesh {
            modes.mix_mode = self.mix_mode;
        }
        modes.flip_culling = self.flip_culling;
        scratch.mixmode_alpha = if modes.mix_mode == MixMode::Alpha && self.mix_mode == MixMode::Alpha {
            1.0 - self.mix_alpha
        } else {
            1.0
        };
        modes.z_offset = self.z_offset;

        if let Some(vp) = self.vp.as_mut() {
            vp.setup_state(modes, stack);
        }
        if let Some(fp) = self.fp.as_mut() {
            fp.setup_state(modes, stack);
        }
        true
    }

    pub(crate) fn teardown(&mut self, g3d: &mut dyn Graphics) {
        let attribs: Vec<VertexAttrib> = self.custom_mappings.iter().map(|m| m.attrib).collect();
        g3d.deactivate_buffers(&attribs);
        let units: Vec<i32> = self.textures.iter().map(|t| t.unit).collect();
        g3d.clear_texture_state(&units);
        for p in self.programs_mut() {
            p.reset_state();
        }
    }

    pub(crate) fn deactivate(&mut self, g3d: &mut dyn Graphics, saved: SavedState) {
        for p in self.programs_mut() {
            p.deactivate();
        }
        if let Some(z) = saved.z_mode {
            g3d.set_z_mode(z);
        }
        g3d.set_write_mask(saved.write_mask);
    }

    pub(crate) fn used_shader_vars(&self, names: &mut BTreeSet<String>) {
        if let Some(p) = &self.vproc {
            p.used_shader_vars(names);
        }
        for m in &self.custom_mappings {
            if let MappingSource::Variable(name) = &m.source {
                names.insert(name.clone());
            }
        }
        names.extend(self.textures.iter().map(|t| t.name.clone()));
        if let Some(p) = &self.vp {
            p.used_shader_vars(names);
        }
        if let Some(p) = &self.fp {
            p.used_shader_vars(names);
        }
    }
}

fn load_program(
    ctx: &LoadContext<'_>,
    pass: &NodeView<'_>,
    tag: &str,
    resolver: Option<&dyn ShaderProgram>,
) -> ProgramLoad {
    let Some(node) = pass.first_child(tag) else {
        return ProgramLoad::Absent;
    };
    let Some(plugin) = node.attribute("plugin") else {
        ctx.env.diagnostics.report(
            Severity::Error,
            format!(
                "No shader program plugin specified for <{tag}> in shader '{}'",
                ctx.shader
            ),
        );
        return ProgramLoad::Absent;
    };
    let program_type = node.attribute("type").unwrap_or(tag);
    let Some(mut program) = ctx.env.programs.create(plugin, program_type) else {
        if ctx.env.options.verbose {
            ctx.env.diagnostics.warning(format!(
                "Couldn't retrieve shader plugin '{plugin}' for <{tag}> in shader '{}'",
                ctx.shader
            ));
        }
        return ProgramLoad::Failed;
    };

    let loaded = match node.attribute("file") {
        Some(file) => match ctx.open_program_file(file) {
            Some((doc, scratch)) => {
                let view = doc.view(ReadContext::new(&scratch, ctx.modes, ctx.stack));
                program.load(resolver, &view)
            }
            None => false,
        },
        None => program.load(resolver, &node),
    };
    if loaded && program.compile() {
        ProgramLoad::Loaded(program)
    } else {
        ProgramLoad::Failed
    }
}

/// Splits `name[1][2]` into the variable name and its array indices.
fn split_indices(name: &str) -> (String, Vec<usize>) {
    let mut indices = Vec::new();
    let mut rest = name.trim_end();
    while let Some(open) = rest.rfind('[')
        && rest.ends_with(']')
        && let Ok(i) = rest[open + 1..rest.len() - 1].trim().parse::<usize>()
    {
        indices.push(i);
        rest = rest[..open].trim_end();
    }
    indices.reverse();
    (rest.to_owned(), indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_split_off_the_name() {
        assert_eq!(split_indices("tex diffuse"), ("tex diffuse".to_owned(), vec![]));
        assert_eq!(split_indices("lights[2][0]"), ("lights".to_owned(), vec![2, 0]));
        assert_eq!(split_indices("odd[x]"), ("odd[x]".to_owned(), vec![]));
    }

    #[test]
    fn builtin_buffer_destinations() {
        let p = Pass::new();
        assert_eq!(p.buffer_destination("attribute 3"), Some(VertexAttrib::Generic(3)));
        assert_eq!(p.buffer_destination("Attribute 15"), Some(VertexAttrib::Generic(15)));
        assert_eq!(p.buffer_destination("attribute 16"), None);
        assert_eq!(p.buffer_destination("Primary Color"), Some(VertexAttrib::Color));
        assert_eq!(p.buffer_destination("texture coordinate"), Some(VertexAttrib::TexCoord(0)));
        assert_eq!(p.buffer_destination("texture coordinate 2"), Some(VertexAttrib::TexCoord(2)));
        assert_eq!(p.buffer_destination("texture coordinate lightmap"), None);
        assert_eq!(p.buffer_destination("tangent"), None);
    }
}
