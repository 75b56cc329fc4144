use std::collections::BTreeSet;

use crate::condition::evaluator::ConditionEvaluator;
use crate::diagnostics::{Diagnostics, Severity};
use crate::document::xml::parse_document;
use crate::preprocess::Preprocessor;
use crate::preprocess::wrapped::{NodeView, WrappedDocument};
use crate::resolver::runtime::ConditionResolver;
use crate::state::modes::RenderMeshModes;
use crate::state::shadervar::{ShaderVarStack, ShaderVariable};

use super::compiler::CompilerEnv;
use super::host::{ShaderTags, TagPresence};
use super::pass::Pass;

/// Everything technique loading reads besides the technique element itself.
pub(crate) struct LoadContext<'a> {
    pub(crate) env: &'a CompilerEnv,
    pub(crate) shader: &'a str,
    pub(crate) evaluator: &'a ConditionEvaluator,
    pub(crate) modes: &'a RenderMeshModes,
    pub(crate) stack: &'a ShaderVarStack,
}

impl LoadContext<'_> {
    pub(crate) fn bad_token(&self, token: &str, parent: &str) {
        self.env.diagnostics.warning(format!(
            "Unexpected token '{token}' in <{parent}> of shader '{}'",
            self.shader
        ));
    }

    /// Reads and statically wraps a program file under the current render state.
    ///
    /// The returned resolver only backs reads of the returned document.
    pub(crate) fn open_program_file(
        &self,
        path: &str,
    ) -> Option<(WrappedDocument, ConditionResolver)> {
        let text = match self.env.files.read(path) {
            Ok(text) => text,
            Err(_) => {
                self.env.diagnostics.report(
                    Severity::Error,
                    format!("Unable to open shader program file '{path}'"),
                );
                return None;
            }
        };
        let root = match parse_document(&text) {
            Ok(root) => root,
            Err(e) => {
                self.env.diagnostics.report(
                    Severity::Error,
                    format!("Unable to parse shader program file '{path}': {e}"),
                );
                return None;
            }
        };
        let mut scratch = ConditionResolver::new(self.evaluator.clone());
        let wrapped = Preprocessor::new(&*self.env.files, &self.env.diagnostics, &self.env.options)
            .wrap_static(&root, &mut scratch, self.modes, self.stack);
        Some((wrapped.document, scratch))
    }
}

/// A `<technique>` child considered for loading.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub(crate) node: NodeView<'a>,
    pub(crate) priority: i32,
    pub(crate) tag_priority: i32,
}

/// Visible techniques of `shader`, best first.
pub(crate) fn scan_techniques<'a>(
    shader: &NodeView<'a>,
    tags: &ShaderTags,
    force_priority: Option<i32>,
) -> Vec<Candidate<'a>> {
    let mut out: Vec<Candidate<'a>> = shader
        .children_named("technique")
        .map(|node| {
            let tag_priority = node
                .children_named("tag")
                .map(|t| tags.tag_options(t.contents_value().trim()))
                .filter(|o| o.presence == TagPresence::Neutral)
                .map(|o| o.priority)
                .sum::<i32>();
            Candidate {
                node,
                priority: node.attribute_as_int("priority"),
                tag_priority,
            }
        })
        .filter(|c| force_priority.is_none_or(|p| p == c.priority))
        .collect();
    out.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.tag_priority.cmp(&a.tag_priority))
    });
    out
}

/// Reads the `<shadervar>` children of a `<shadervars>` block.
pub(crate) fn read_shader_vars(
    block: &NodeView<'_>,
    into: &mut ShaderVarStack,
    shader: &str,
    diagnostics: &Diagnostics,
) {
    for var in block.children_named("shadervar") {
        let Some(name) = var.attribute("name") else {
            diagnostics.warning(format!("Shader variable without name in shader '{shader}'"));
            continue;
        };
        let kind = var.attribute("type").unwrap_or("");
        match ShaderVariable::parse(kind, &var.contents_value()) {
            Some(value) => into.set(name, value),
            None => diagnostics.warning(format!(
                "Invalid value for shader variable '{name}' of type '{kind}' in shader '{shader}'"
            )),
        }
    }
}

pub(crate) struct Technique {
    priority: i32,
    pub(crate) passes: Vec<Pass>,
    variables: ShaderVarStack,
}

impl Technique {
    /// Loads a technique; the error is the reason it failed.
    pub(crate) fn load(
        ctx: &LoadContext<'_>,
        candidate: &Candidate<'_>,
        shader: &NodeView<'_>,
    ) -> Result<Self, String> {
        let node = &candidate.node;
        let mut tech = Self {
            priority: candidate.priority,
            passes: Vec::new(),
            variables: ShaderVarStack::new(),
        };
        tech.load_boilerplate(ctx, node, shader)?;

        let mut failure = None;
        for (number, pass) in node.children_named("pass").enumerate() {
            match Pass::load(ctx, &pass, number) {
                Ok(p) => tech.passes.push(p),
                Err(reason) => {
                    failure.get_or_insert(reason);
                }
            }
        }
        match failure {
            Some(reason) => Err(reason),
            None => Ok(tech),
        }
    }

    fn load_boilerplate(
        &mut self,
        ctx: &LoadContext<'_>,
        node: &NodeView<'_>,
        shader: &NodeView<'_>,
    ) -> Result<(), String> {
        if !node.is_element() || node.value() != "technique" {
            return Err("Node is not a well formed technique".to_owned());
        }

        let tags = &ctx.env.tags;
        let mut required_present = 0usize;
        for tag in node.children_named("tag") {
            let name = tag.contents_value();
            let name = name.trim();
            match tags.tag_options(name).presence {
                TagPresence::Required => required_present += 1,
                TagPresence::Forbidden => return Err(format!("Shader tag '{name}' is forbidden")),
                TagPresence::Neutral => {}
            }
        }
        if tags.count(TagPresence::Required) != 0 && required_present == 0 {
            return Err("No required shader tag is present".to_owned());
        }

        for level in [shader, node] {
            if let Some(block) = level.first_child("shadervars") {
                read_shader_vars(&block, &mut self.variables, ctx.shader, &ctx.env.diagnostics);
            }
        }
        Ok(())
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn variables(&self) -> &ShaderVarStack {
        &self.variables
    }

    pub(crate) fn used_shader_vars(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for p in &self.passes {
            p.used_shader_vars(&mut names);
        }
        names
    }
}
