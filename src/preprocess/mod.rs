//! Document preprocessing: expands instructions and wraps conditional content.

pub(crate) mod args;
pub(crate) mod eval;
pub mod files;
pub(crate) mod processor;
pub(crate) mod template;
pub mod wrapped;

use crate::diagnostics::Diagnostics;
use crate::document::node::SourceNode;
use crate::foundation::ids::ConditionId;
use crate::options::CompilerOptions;
use crate::resolver::runtime::ConditionResolver;
use crate::state::modes::RenderMeshModes;
use crate::state::shadervar::ShaderVarStack;

use eval::{StaticEval, TreeEval};
use files::FileSource;
use processor::{ConditionDumper, Env, Processor};
use wrapped::WrappedDocument;

/// Output of a wrap call.
#[derive(Debug)]
pub struct WrapResult {
    pub document: WrappedDocument,
    /// One resolver per technique scope, indexed by [`wrapped::NodeView::scope`].
    ///
    /// Each carries a copy of the final evaluator, so any of them can read the whole document.
    pub techniques: Vec<ConditionResolver>,
    /// Condition and tree dump, filled according to the dump options.
    pub dump: String,
}

pub struct Preprocessor<'a> {
    files: &'a dyn FileSource,
    diagnostics: &'a Diagnostics,
    options: &'a CompilerOptions,
}

impl<'a> Preprocessor<'a> {
    pub fn new(
        files: &'a dyn FileSource,
        diagnostics: &'a Diagnostics,
        options: &'a CompilerOptions,
    ) -> Self {
        Self {
            files,
            diagnostics,
            options,
        }
    }

    fn env(&self) -> Env<'a> {
        Env {
            files: self.files,
            diagnostics: self.diagnostics,
            verbose: self.options.verbose,
        }
    }

    /// Wraps `root`, loading the conditions that decide the technique choice into `resolver`.
    ///
    /// Conditions inside a `<technique>`, including those of the program files its passes
    /// reference, go to a resolver of that technique instead.
    pub fn wrap(&self, root: &SourceNode, resolver: &mut ConditionResolver) -> WrapResult {
        self.wrap_preset(root, resolver, &[])
    }

    /// Like [`Self::wrap`], with some condition results known in advance.
    #[tracing::instrument(level = "debug", skip_all, fields(preset = preset.len()))]
    pub fn wrap_preset(
        &self,
        root: &SourceNode,
        resolver: &mut ConditionResolver,
        preset: &[(ConditionId, bool)],
    ) -> WrapResult {
        let env = self.env();
        let mut dumper = self.options.dump_conditions.then(ConditionDumper::default);

        let (document, tree, scopes) = {
            let mut eval = TreeEval::new(resolver.evaluator_mut());
            eval.preset(preset);
            let document = Processor::new(&mut eval, dumper.as_mut(), &env).run(root);
            let (tree, scopes) = eval.into_trees();
            (document, tree, scopes)
        };
        tree.to_resolver(resolver);
        let techniques: Vec<ConditionResolver> = scopes
            .iter()
            .map(|scope| {
                let mut r = ConditionResolver::new(resolver.evaluator().clone());
                scope.to_resolver(&mut r);
                r
            })
            .collect();

        let mut dump = dumper.map(ConditionDumper::into_string).unwrap_or_default();
        if self.options.dump_values {
            dump.push_str("\n\n");
            dump.push_str(&tree.dump(resolver.evaluator()));
            for (i, scope) in scopes.iter().enumerate() {
                dump.push_str(&format!("\ntechnique {i}:\n"));
                dump.push_str(&scope.dump(resolver.evaluator()));
            }
        }
        tracing::debug!(
            nodes = document.node_count(),
            variants = resolver.variant_count(),
            techniques = techniques.len(),
            "document wrapped"
        );
        WrapResult {
            document,
            techniques,
            dump,
        }
    }

    /// Wraps `root` deciding every condition right away against one render state.
    pub fn wrap_static(
        &self,
        root: &SourceNode,
        resolver: &mut ConditionResolver,
        modes: &RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> WrapResult {
        let env = self.env();
        let mut dumper = self.options.dump_conditions.then(ConditionDumper::default);
        let document = {
            let mut eval = StaticEval::new(resolver.evaluator_mut(), modes, stack);
            Processor::new(&mut eval, dumper.as_mut(), &env).run(root)
        };
        WrapResult {
            document,
            techniques: Vec::new(),
            dump: dumper.map(ConditionDumper::into_string).unwrap_or_default(),
        }
    }
}
