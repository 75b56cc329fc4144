//! Processing-instruction state machine.
//!
//! Walks source nodes, expands templates, includes and generate loops, resolves static defines,
//! and turns `if`/`elsif`/`else`/`endif` into gated wrappers while the branch evaluator tracks
//! which outcomes are still possible.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::condition::evaluator::ConditionEvaluator;
use crate::condition::logic3::Logic3;
use crate::diagnostics::Diagnostics;
use crate::document::node::{NodeKind, SourceNode};
use crate::document::xml::parse_document;
use crate::foundation::ids::ConditionId;
use crate::preprocess::args::{
    decode_entities, parse_arguments, single_argument, split_instruction,
};
use crate::preprocess::eval::BranchEval;
use crate::preprocess::files::{FileSource, parent_dir, resolve_path};
use crate::preprocess::template::Template;
use crate::preprocess::wrapped::{WNodeIdx, WrappedDocument, WrapperIdx};

/// Instruction names that can't be used as template names.
const RESERVED: &[&str] = &[
    "if",
    "endif",
    "else",
    "elsif",
    "include",
    "template",
    "endtemplate",
    "Include",
    "Template",
    "TemplateWeak",
    "Endtemplate",
    "Generate",
    "Endgenerate",
    "Define",
    "Undef",
    "SIfDef",
    "SIfNDef",
    "SElsIfDef",
    "SElsIfNDef",
    "SElse",
    "SEndIf",
];

const MAX_EXPANSION_DEPTH: usize = 64;

/// Pass children that may load their program from a file.
const PROGRAM_ELEMENTS: &[&str] = &["vp", "fp", "vproc"];

/// Collects the text of every parsed condition, sub-conditions first, each id once.
#[derive(Debug, Default)]
pub(crate) struct ConditionDumper {
    out: String,
    seen: HashSet<ConditionId>,
}

impl ConditionDumper {
    pub(crate) fn dump(&mut self, eval: &ConditionEvaluator, id: ConditionId, text: &str) {
        if !id.is_sentinel() {
            if !self.seen.insert(id) {
                return;
            }
            if let Some(op) = eval.condition(id) {
                for sub in [op.left.operation(), op.right.operation()]
                    .into_iter()
                    .flatten()
                {
                    let sub_text = eval.condition_description(sub);
                    self.dump(eval, sub, &sub_text);
                }
            }
        }
        self.out.push_str(&format!("condition {id} = '{text}'\n"));
    }

    pub(crate) fn into_string(self) -> String {
        self.out
    }
}

/// Collaborators shared by every processor of one wrap call.
pub(crate) struct Env<'a> {
    pub(crate) files: &'a dyn FileSource,
    pub(crate) diagnostics: &'a Diagnostics,
    pub(crate) verbose: bool,
}

#[derive(Debug)]
enum CaptureKind {
    Template {
        name: String,
        weak: bool,
        params: Vec<String>,
    },
    Generate {
        var: String,
        /// `(start, end, step)`; `None` when the range can't be walked, which swallows the body.
        range: Option<(i32, i32, i32)>,
    },
}

#[derive(Debug)]
struct Capture {
    kind: CaptureKind,
    nest: usize,
    nodes: Vec<SourceNode>,
}

#[derive(Debug, Clone, Copy)]
struct StaticIf {
    process: bool,
    else_branch: bool,
}

/// Per-element processing state.
#[derive(Debug)]
struct Scope {
    current: WrapperIdx,
    wrapper_stack: Vec<WrapperIdx>,
    /// Levels to leave at each pending `endif`: one per `if` plus one per `elsif`.
    ascend_stack: Vec<usize>,
    capture: Option<Capture>,
    static_ifs: Vec<StaticIf>,
    static_nest: Vec<usize>,
}

impl Scope {
    fn new(top: WrapperIdx) -> Self {
        Self {
            current: top,
            wrapper_stack: Vec::new(),
            ascend_stack: Vec::new(),
            capture: None,
            static_ifs: Vec::new(),
            static_nest: Vec::new(),
        }
    }
}

/// Decoded `(command, arguments)` of a processing instruction.
fn instruction(node: &SourceNode) -> Option<(String, String)> {
    if node.kind != NodeKind::ProcessingInstruction {
        return None;
    }
    let body = decode_entities(&node.value);
    split_instruction(&body).map(|(cmd, args)| (cmd.to_owned(), args.to_owned()))
}

pub(crate) struct Processor<'p, E: BranchEval> {
    eval: &'p mut E,
    dumper: Option<&'p mut ConditionDumper>,
    env: &'p Env<'p>,
    out: WrappedDocument,
    templates: HashMap<String, Rc<Template>>,
    defines: HashSet<String>,
    includes: HashMap<String, Rc<SourceNode>>,
    dirs: Vec<String>,
    depth: usize,
}

impl<'p, E: BranchEval> Processor<'p, E> {
    pub(crate) fn new(
        eval: &'p mut E,
        dumper: Option<&'p mut ConditionDumper>,
        env: &'p Env<'p>,
    ) -> Self {
        Self {
            eval,
            dumper,
            env,
            out: WrappedDocument::new(),
            templates: HashMap::new(),
            defines: HashSet::new(),
            includes: HashMap::new(),
            dirs: vec![String::new()],
            depth: 0,
        }
    }

    /// Wraps `root` and everything below it.
    pub(crate) fn run(mut self, root: &SourceNode) -> WrappedDocument {
        let idx = self.wrap_node(root);
        self.out.set_root(idx);
        self.out
    }

    fn syntax_error(&self, message: impl Into<String>) {
        self.env.diagnostics.warning(message);
    }

    fn deprecated(&self, replacement: &str) {
        if self.env.verbose {
            self.env.diagnostics.warning(format!(
                "Deprecated syntax, please use '{replacement}'"
            ));
        }
    }

    fn wrap_node(&mut self, source: &SourceNode) -> WNodeIdx {
        match source.kind {
            NodeKind::Element | NodeKind::Root => {
                let top = self.out.new_wrapper(ConditionId::ALWAYS_TRUE, true);
                let idx = self.out.new_node(source, Some(top));
                let technique = source.is_element() && source.value == "technique";
                let tech_scope = if technique {
                    self.eval.enter_scope()
                } else {
                    None
                };
                if let Some(id) = tech_scope {
                    self.out.set_scope(idx, id);
                }
                if self.eval.current_scope().is_some()
                    && PROGRAM_ELEMENTS.contains(&source.value.as_str())
                    && let Some(file) = source.attribute("file")
                {
                    self.scan_program_file(file);
                }

                let mut scope = Scope::new(top);
                for child in &source.children {
                    self.process_node(&mut scope, child);
                }
                self.finish_scope(&mut scope);
                if tech_scope.is_some() {
                    self.eval.leave_scope();
                }
                idx
            }
            NodeKind::Text | NodeKind::ProcessingInstruction => self.out.new_node(source, None),
        }
    }

    /// Runs a program file through the current technique scope so its conditionals select
    /// variants too. The wrapped output is dropped; the pass loads the file itself.
    fn scan_program_file(&mut self, file: &str) {
        if self.depth >= MAX_EXPANSION_DEPTH {
            self.syntax_error(format!("Expansion of '{file}' nested too deeply"));
            return;
        }
        let root = match self.env.files.read(file) {
            Ok(text) => match parse_document(&text) {
                Ok(root) => root,
                Err(err) => {
                    tracing::debug!(file, error = %err, "program file not scanned");
                    return;
                }
            },
            Err(err) => {
                tracing::debug!(file, error = %err, "program file not scanned");
                return;
            }
        };
        let mut nested = Processor::new(&mut *self.eval, self.dumper.as_deref_mut(), self.env);
        nested.depth = self.depth + 1;
        nested.run(&root);
    }

    fn finish_scope(&mut self, scope: &mut Scope) {
        match scope.capture.take().map(|c| c.kind) {
            Some(CaptureKind::Template { .. }) => {
                self.syntax_error("'Template' without 'Endtemplate'")
            }
            Some(CaptureKind::Generate { .. }) => {
                self.syntax_error("'Generate' without 'Endgenerate'")
            }
            None => {}
        }
        if !scope.static_ifs.is_empty() {
            self.syntax_error("'SIfDef' without 'SEndIf'");
        }
        while let Some(n) = scope.ascend_stack.pop() {
            self.syntax_error("'if' without 'endif'");
            self.leave(scope, n);
        }
    }

    fn process_node(&mut self, scope: &mut Scope, node: &SourceNode) {
        if self.capture_node(scope, node) {
            return;
        }
        if self.static_if(scope, node) {
            return;
        }
        if node.kind == NodeKind::ProcessingInstruction {
            self.process_instruction(scope, node);
            return;
        }
        if self.out.is_unreachable(scope.current) {
            return;
        }
        self.eval.commit();
        let idx = self.wrap_node(node);
        self.out.push_node(scope.current, idx);
    }

    fn process_instruction(&mut self, scope: &mut Scope, node: &SourceNode) {
        let body = decode_entities(&node.value);
        if body.starts_with('!') || body.starts_with('#') {
            return;
        }
        let Some((cmd, args)) = split_instruction(&body) else {
            self.syntax_error("Empty processing instruction");
            return;
        };

        match cmd {
            "if" => self.process_if(scope, args),
            "elsif" => self.process_elsif(scope, args),
            "else" => self.process_else(scope, args),
            "endif" => self.process_endif(scope, args),
            "include" | "Include" => {
                if cmd == "include" {
                    self.deprecated("Include");
                }
                let filename = args.trim();
                if filename.is_empty() {
                    self.syntax_error("'include' without filename");
                } else {
                    self.process_include(scope, filename);
                }
            }
            "template" | "Template" | "TemplateWeak" => {
                if cmd == "template" {
                    self.deprecated("Template");
                }
                self.begin_template(scope, args, cmd == "TemplateWeak");
            }
            "endtemplate" | "Endtemplate" => {
                if cmd == "endtemplate" {
                    self.deprecated("Endtemplate");
                }
                self.syntax_error("'Endtemplate' without 'Template'");
            }
            "Generate" => self.begin_generate(scope, args),
            "Endgenerate" => self.syntax_error("'Endgenerate' without 'Generate'"),
            "Define" => match single_argument(args) {
                Some(sym) => {
                    self.defines.insert(sym);
                }
                None => self.syntax_error("One parameter expected for 'Define'"),
            },
            "Undef" => match single_argument(args) {
                Some(sym) => {
                    self.defines.remove(&sym);
                }
                None => self.syntax_error("One parameter expected for 'Undef'"),
            },
            "SIfDef" | "SIfNDef" => {
                self.static_if_def(scope, args, cmd == "SIfNDef");
            }
            "SElsIfDef" | "SElsIfNDef" | "SElse" | "SEndIf" => {
                self.syntax_error(format!("'{cmd}' without 'SIfDef'"));
            }
            _ => {
                let params = parse_arguments(args, false);
                if !self.invoke_template(scope, cmd, &params) {
                    self.syntax_error(format!("Unknown command '{cmd}'"));
                }
            }
        }
    }

    // Conditionals

    fn parse_condition(&mut self, text: &str) -> ConditionId {
        let id = match self.eval.parse_condition(text) {
            Ok(id) => id,
            Err(err) => {
                self.syntax_error(format!("Error parsing condition '{text}': {err}"));
                ConditionId::ALWAYS_FALSE
            }
        };
        if let Some(dumper) = self.dumper.as_deref_mut() {
            dumper.dump(self.eval.evaluator(), id, text);
        }
        id
    }

    /// Descends into `condition` and returns the id the gate should carry.
    fn descend(&mut self, scope: &Scope, parsed: ConditionId) -> ConditionId {
        let condition = if self.out.is_unreachable(scope.current) {
            ConditionId::ALWAYS_FALSE
        } else {
            parsed
        };
        match self.eval.descend(condition) {
            Logic3::Truth => ConditionId::ALWAYS_TRUE,
            Logic3::Lie => ConditionId::ALWAYS_FALSE,
            Logic3::Uncertain => parsed,
        }
    }

    fn enter(&mut self, scope: &mut Scope, wrapper: WrapperIdx) {
        if !self.out.is_unreachable(wrapper) {
            self.out.attach(scope.current, wrapper);
        }
        scope.wrapper_stack.push(scope.current);
        scope.current = wrapper;
    }

    fn leave(&mut self, scope: &mut Scope, levels: usize) {
        self.eval.ascend(levels);
        for _ in 0..levels {
            let last = scope.current;
            let Some(parent) = scope.wrapper_stack.pop() else {
                break;
            };
            scope.current = parent;
            if self.out.is_empty(last) {
                self.out.detach(parent, last);
            }
        }
    }

    /// Replaces the current wrapper by its negation.
    fn else_wrapper(&mut self, scope: &mut Scope) -> Option<WrapperIdx> {
        let old = scope.current;
        scope.current = scope.wrapper_stack.pop()?;
        let (condition, _) = self.out.condition(old);
        let wrapper = self.out.new_wrapper(condition, false);
        if self.out.is_empty(old) {
            self.out.detach(scope.current, old);
        }
        Some(wrapper)
    }

    fn process_if(&mut self, scope: &mut Scope, args: &str) {
        let parsed = self.parse_condition(args);
        let condition = self.descend(scope, parsed);
        scope.ascend_stack.push(1);
        let wrapper = self.out.new_wrapper(condition, true);
        self.enter(scope, wrapper);
    }

    fn process_elsif(&mut self, scope: &mut Scope, args: &str) {
        if scope.ascend_stack.is_empty() {
            self.syntax_error("'elsif' without 'if' or 'elsif'");
            return;
        }
        if self.eval.branch() != 0 {
            self.syntax_error("'elsif' after 'else'");
            return;
        }
        let Some(else_wrapper) = self.else_wrapper(scope) else {
            return;
        };
        self.enter(scope, else_wrapper);

        let parsed = self.parse_condition(args);
        self.eval.switch_branch();
        let condition = self.descend(scope, parsed);
        if let Some(n) = scope.ascend_stack.last_mut() {
            *n += 1;
        }
        let wrapper = self.out.new_wrapper(condition, true);
        self.enter(scope, wrapper);
    }

    fn process_else(&mut self, scope: &mut Scope, args: &str) {
        if !args.is_empty() {
            self.syntax_error("'else' has parameters");
            return;
        }
        if scope.ascend_stack.is_empty() {
            self.syntax_error("'else' without 'if' or 'elsif'");
            return;
        }
        if self.eval.branch() != 0 {
            self.syntax_error("Double 'else'");
            return;
        }
        let Some(wrapper) = self.else_wrapper(scope) else {
            return;
        };
        self.enter(scope, wrapper);
        self.eval.switch_branch();
    }

    fn process_endif(&mut self, scope: &mut Scope, args: &str) {
        if !args.is_empty() {
            self.syntax_error("'endif' has parameters");
            return;
        }
        let Some(levels) = scope.ascend_stack.pop() else {
            self.syntax_error("'endif' without 'if' or 'elsif'");
            return;
        };
        self.leave(scope, levels);
    }

    // Static defines

    fn static_if_def(&mut self, scope: &mut Scope, args: &str, invert: bool) -> bool {
        let Some(sym) = single_argument(args) else {
            self.syntax_error("One parameter expected for 'SIfDef'");
            return false;
        };
        let enclosing = scope.static_ifs.last().is_none_or(|s| s.process);
        let defined = self.defines.contains(&sym);
        scope.static_ifs.push(StaticIf {
            process: (defined != invert) && enclosing,
            else_branch: false,
        });
        scope.static_nest.push(1);
        true
    }

    /// Flips the innermost static conditional to its else branch.
    fn static_else(&mut self, scope: &mut Scope) {
        let Some(mut state) = scope.static_ifs.pop() else {
            return;
        };
        if state.else_branch {
            self.syntax_error("Multiple 'SElse's in 'SIfDef'");
            state.process = false;
        } else {
            let enclosing = scope.static_ifs.last().is_none_or(|s| s.process);
            state.process = !state.process && enclosing;
            state.else_branch = true;
        }
        scope.static_ifs.push(state);
    }

    /// Handles static conditionals once one is open; true if `node` was consumed.
    fn static_if(&mut self, scope: &mut Scope, node: &SourceNode) -> bool {
        let Some(top) = scope.static_ifs.last().copied() else {
            return false;
        };
        if let Some((cmd, args)) = instruction(node) {
            match cmd.as_str() {
                "SIfDef" | "SIfNDef" => {
                    self.static_if_def(scope, &args, cmd == "SIfNDef");
                    return true;
                }
                "SElse" => {
                    self.static_else(scope);
                    return true;
                }
                "SElsIfDef" | "SElsIfNDef" => {
                    self.static_else(scope);
                    if self.static_if_def(scope, &args, cmd == "SElsIfNDef") {
                        scope.static_nest.pop();
                        if let Some(n) = scope.static_nest.last_mut() {
                            *n += 1;
                        }
                    }
                    return true;
                }
                "SEndIf" => {
                    if let Some(n) = scope.static_nest.pop() {
                        let keep = scope.static_ifs.len().saturating_sub(n);
                        scope.static_ifs.truncate(keep);
                    }
                    return true;
                }
                _ => {}
            }
        }
        !top.process
    }

    // Includes

    fn process_include(&mut self, scope: &mut Scope, filename: &str) {
        let dir = self.dirs.last().map(String::as_str).unwrap_or("");
        let path = resolve_path(dir, filename);
        let include = match self.includes.get(&path) {
            Some(node) => Rc::clone(node),
            None => {
                let text = match self.env.files.read(&path) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::debug!(path = %path, error = %err, "include read failed");
                        self.syntax_error(format!("could not open '{filename}'"));
                        return;
                    }
                };
                let doc = match parse_document(&text) {
                    Ok(doc) => doc,
                    Err(err) => {
                        self.syntax_error(format!("error parsing '{filename}': {err}"));
                        return;
                    }
                };
                let Some(node) = doc.first_child("include") else {
                    self.syntax_error(format!("{filename}: no <include> node"));
                    return;
                };
                let node = Rc::new(node.clone());
                self.includes.insert(path.clone(), Rc::clone(&node));
                node
            }
        };

        if !self.enter_expansion(filename) {
            return;
        }
        self.dirs.push(parent_dir(&path));
        for child in &include.children {
            self.process_node(scope, child);
        }
        self.dirs.pop();
        self.depth -= 1;
    }

    fn enter_expansion(&mut self, what: &str) -> bool {
        if self.depth >= MAX_EXPANSION_DEPTH {
            self.syntax_error(format!("Expansion of '{what}' nested too deeply"));
            return false;
        }
        self.depth += 1;
        true
    }

    // Templates and generate loops

    fn begin_template(&mut self, scope: &mut Scope, args: &str, weak: bool) {
        let (name, rest) = match args.find(' ') {
            Some(i) => (&args[..i], &args[i + 1..]),
            None => (args, ""),
        };
        let mut params = Vec::new();
        for p in parse_arguments(rest, true) {
            if params.contains(&p) {
                self.syntax_error(format!("Duplicate template parameter '{p}'"));
                return;
            }
            params.push(p);
        }
        if name.is_empty() {
            self.syntax_error("'template' without name");
            return;
        }
        if RESERVED.contains(&name) {
            self.syntax_error(format!("Reserved template name '{name}'"));
            return;
        }
        scope.capture = Some(Capture {
            kind: CaptureKind::Template {
                name: name.to_owned(),
                weak,
                params,
            },
            nest: 1,
            nodes: Vec::new(),
        });
    }

    fn begin_generate(&mut self, scope: &mut Scope, args: &str) {
        let args = parse_arguments(args, false);
        if !(3..=4).contains(&args.len()) {
            self.syntax_error(format!(
                "'Generate' expects 3 or 4 arguments, got {}",
                args.len()
            ));
            return;
        }
        let mut ints = Vec::with_capacity(3);
        for a in &args[1..] {
            match a.trim_start().parse::<i32>() {
                Ok(v) => ints.push(v),
                Err(_) => {
                    self.syntax_error(format!("Argument '{a}' is not an integer"));
                    return;
                }
            }
        }
        let (start, end) = (ints[0], ints[1]);
        let step = ints
            .get(2)
            .copied()
            .unwrap_or(if end < start { -1 } else { 1 });

        let range = if (start > end && step >= 0) || (end >= start && step <= 0) {
            self.syntax_error(format!(
                "Can't reach end value {end} starting from {start} with step {step}"
            ));
            None
        } else {
            Some((start, end, step))
        };
        scope.capture = Some(Capture {
            kind: CaptureKind::Generate {
                var: args[0].clone(),
                range,
            },
            nest: 1,
            nodes: Vec::new(),
        });
    }

    /// Feeds `node` to an active template or generate capture; false if none is active.
    fn capture_node(&mut self, scope: &mut Scope, node: &SourceNode) -> bool {
        let Some(capture) = scope.capture.as_mut() else {
            return false;
        };
        let generating = matches!(capture.kind, CaptureKind::Generate { .. });

        match instruction(node) {
            Some((cmd, args)) => match cmd.as_str() {
                "endtemplate" | "Endtemplate" => {
                    if cmd == "endtemplate" {
                        self.deprecated("Endtemplate");
                    }
                    if generating {
                        capture.nodes.push(node.clone());
                    } else {
                        capture.nest -= 1;
                        if capture.nest != 0 {
                            capture.nodes.push(node.clone());
                        }
                    }
                }
                "Generate" => {
                    if generating {
                        capture.nest += 1;
                    }
                    capture.nodes.push(node.clone());
                }
                "Endgenerate" => {
                    if generating {
                        capture.nest -= 1;
                        if capture.nest != 0 {
                            capture.nodes.push(node.clone());
                        }
                    } else {
                        capture.nodes.push(node.clone());
                    }
                }
                _ => {
                    if cmd == "template" {
                        self.deprecated("Template");
                    }
                    if !generating && matches!(cmd.as_str(), "template" | "Template" | "TemplateWeak")
                    {
                        capture.nest += 1;
                    }
                    let known = (!generating && capture.nest == 1)
                        .then(|| self.templates.get(&cmd).cloned())
                        .flatten();
                    match known {
                        Some(templ) => {
                            let params = parse_arguments(&args, false);
                            capture.nodes.extend(templ.instantiate(&params));
                        }
                        None => {
                            let own_name = matches!(
                                &capture.kind,
                                CaptureKind::Template { name, .. } if *name == cmd
                            );
                            if !own_name {
                                capture.nodes.push(node.clone());
                            }
                        }
                    }
                }
            },
            None => capture.nodes.push(node.clone()),
        }

        if capture.nest == 0
            && let Some(done) = scope.capture.take()
        {
            self.finish_capture(scope, done);
        }
        true
    }

    fn finish_capture(&mut self, scope: &mut Scope, capture: Capture) {
        match capture.kind {
            CaptureKind::Template { name, weak, params } => {
                if !weak || !self.templates.contains_key(&name) {
                    self.templates.insert(
                        name,
                        Rc::new(Template {
                            params,
                            nodes: capture.nodes,
                        }),
                    );
                }
            }
            CaptureKind::Generate { var, range } => {
                let Some((start, end, step)) = range else {
                    return;
                };
                let body = Template {
                    params: vec![var],
                    nodes: capture.nodes,
                };
                let mut v = start;
                loop {
                    if (step >= 0 && v > end) || (step < 0 && v < end) {
                        break;
                    }
                    for n in body.instantiate(&[v.to_string()]) {
                        self.process_node(scope, &n);
                    }
                    match v.checked_add(step) {
                        Some(next) => v = next,
                        None => break,
                    }
                }
            }
        }
    }

    fn invoke_template(&mut self, scope: &mut Scope, name: &str, params: &[String]) -> bool {
        let Some(templ) = self.templates.get(name).cloned() else {
            return false;
        };
        if !self.enter_expansion(name) {
            return true;
        }
        tracing::trace!(template = name, "invoking template");
        for n in templ.instantiate(params) {
            self.process_node(scope, &n);
        }
        self.depth -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::constants::ConstantTable;
    use crate::preprocess::eval::{StaticEval, TreeEval};
    use crate::preprocess::files::MemoryFiles;
    use crate::preprocess::wrapped::ReadContext;
    use crate::resolver::runtime::ConditionResolver;
    use crate::state::modes::RenderMeshModes;
    use crate::state::shadervar::{ShaderVarStack, ShaderVariable};

    fn run_static(root: &SourceNode, files: &MemoryFiles, stack: &ShaderVarStack) -> (String, Diagnostics) {
        let diagnostics = Diagnostics::new();
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let modes = RenderMeshModes::new();
        let doc = {
            let env = Env {
                files,
                diagnostics: &diagnostics,
                verbose: true,
            };
            let mut eval = StaticEval::new(&mut e, &modes, stack);
            Processor::new(&mut eval, None, &env).run(root)
        };
        let resolver = ConditionResolver::new(e);
        let text = doc
            .view(ReadContext::new(&resolver, &modes, stack))
            .materialize()
            .to_xml();
        (text, diagnostics)
    }

    fn root(children: Vec<SourceNode>) -> SourceNode {
        SourceNode::root().with_child(SourceNode::element("r").with_children(children))
    }

    fn pi(s: &str) -> SourceNode {
        SourceNode::instruction(s)
    }

    fn txt(s: &str) -> SourceNode {
        SourceNode::text(s)
    }

    #[test]
    fn static_conditionals_pick_one_branch() {
        let doc = root(vec![
            pi("if vars.a.int == 1"),
            txt("one"),
            pi("elsif vars.a.int == 2"),
            txt("two"),
            pi("else"),
            txt("other"),
            pi("endif"),
        ]);
        let files = MemoryFiles::new();
        let mut stack = ShaderVarStack::new();
        stack.set("a", ShaderVariable::Int(2));
        let (xml, d) = run_static(&doc, &files, &stack);
        assert!(xml.contains("two"), "{xml}");
        assert!(!xml.contains("one") && !xml.contains("other"), "{xml}");
        assert!(d.records().is_empty());
    }

    #[test]
    fn structural_errors_are_reported() {
        let doc = root(vec![
            pi("endif"),
            pi("else"),
            pi("if true"),
            pi("else"),
            pi("else"),
            pi("endif x"),
            pi("endif"),
            pi("if vars.a"),
            pi("else"),
            pi("elsif vars.b"),
            pi("endif"),
            pi("if true"),
        ]);
        let (_, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(d.contains("'endif' without 'if' or 'elsif'"));
        assert!(d.contains("'else' without 'if' or 'elsif'"));
        assert!(d.contains("Double 'else'"));
        assert!(d.contains("'elsif' after 'else'"));
        assert!(d.contains("'endif' has parameters"));
        assert!(d.contains("'if' without 'endif'"));
    }

    #[test]
    fn templates_expand_with_arguments() {
        let doc = root(vec![
            pi("Template tex unit name"),
            SourceNode::element("texture")
                .with_attr("destination", "unit ?unit?")
                .with_attr("name", "?name?"),
            pi("Endtemplate"),
            pi("tex 0 diffuse"),
            pi("tex 1"),
        ]);
        let (xml, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(xml.contains(r#"destination="unit 0""#), "{xml}");
        assert!(xml.contains(r#"name="diffuse""#), "{xml}");
        assert!(xml.contains(r#"name="?name?""#), "{xml}");
        assert!(d.records().is_empty());
    }

    #[test]
    fn template_errors() {
        let doc = root(vec![
            pi("Template if"),
            pi("Template"),
            pi("Template t a a"),
            pi("Endtemplate"),
            pi("nope 1 2"),
            pi("Template open"),
        ]);
        let (_, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(d.contains("Reserved template name 'if'"));
        assert!(d.contains("'template' without name"));
        assert!(d.contains("Duplicate template parameter 'a'"));
        assert!(d.contains("'Endtemplate' without 'Template'"));
        assert!(d.contains("Unknown command 'nope'"));
        assert!(d.contains("'Template' without 'Endtemplate'"));
    }

    #[test]
    fn weak_templates_do_not_replace() {
        let doc = root(vec![
            pi("Template t"),
            txt("strong"),
            pi("Endtemplate"),
            pi("TemplateWeak t"),
            txt("weak"),
            pi("Endtemplate"),
            pi("t"),
        ]);
        let (xml, _) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(xml.contains("strong") && !xml.contains("weak"), "{xml}");
    }

    #[test]
    fn generate_repeats_body() {
        let doc = root(vec![
            pi("Generate i 3 1"),
            SourceNode::element("v").with_attr("n", "?i?"),
            pi("Endgenerate"),
            pi("Generate j 0 4 2"),
            SourceNode::element("w").with_attr("n", "?j?"),
            pi("Endgenerate"),
        ]);
        let (xml, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        let order: Vec<_> = ["n=\"3\"", "n=\"2\"", "n=\"1\""]
            .iter()
            .map(|s| xml.find(s).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{xml}");
        assert_eq!(xml.matches("<w ").count(), 3, "{xml}");
        assert!(d.records().is_empty());
    }

    #[test]
    fn generate_errors_swallow_body() {
        let doc = root(vec![
            pi("Generate i 0 3 -1"),
            txt("never"),
            pi("Endgenerate"),
            pi("Generate i x 3"),
            pi("Generate i 1"),
            pi("Endgenerate"),
        ]);
        let (xml, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(!xml.contains("never"), "{xml}");
        assert!(d.contains("Can't reach end value 3 starting from 0 with step -1"));
        assert!(d.contains("Argument 'x' is not an integer"));
        assert!(d.contains("'Generate' expects 3 or 4 arguments, got 2"));
        assert!(d.contains("'Endgenerate' without 'Generate'"));
    }

    #[test]
    fn static_defines_select_blocks() {
        let doc = root(vec![
            pi("Define FOG"),
            pi("SIfDef FOG"),
            txt("fog"),
            pi("SElse"),
            txt("clear"),
            pi("SEndIf"),
            pi("SIfDef SHADOW"),
            txt("shadow"),
            pi("SElsIfDef FOG"),
            txt("elsefog"),
            pi("SElse"),
            txt("none"),
            pi("SEndIf"),
            pi("Undef FOG"),
            pi("SIfNDef FOG"),
            txt("nofog"),
            pi("SEndIf"),
        ]);
        let (xml, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(xml.contains("fog"));
        assert!(!xml.contains("clear"), "{xml}");
        assert!(!xml.contains("shadow"), "{xml}");
        assert!(xml.contains("elsefog"), "{xml}");
        assert!(!xml.contains("none"), "{xml}");
        assert!(xml.contains("nofog"), "{xml}");
        assert!(d.records().is_empty(), "{:?}", d.records());
    }

    #[test]
    fn static_define_errors() {
        let doc = root(vec![
            pi("Define"),
            pi("SElse"),
            pi("SIfDef A"),
            pi("SElse"),
            pi("SElse"),
            pi("SEndIf"),
            pi("SIfDef B"),
        ]);
        let (_, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(d.contains("One parameter expected for 'Define'"));
        assert!(d.contains("'SElse' without 'SIfDef'"));
        assert!(d.contains("Multiple 'SElse's in 'SIfDef'"));
        assert!(d.contains("'SIfDef' without 'SEndIf'"));
    }

    #[test]
    fn includes_resolve_relative_to_the_including_file() {
        let files = MemoryFiles::new()
            .with_file(
                "lib/a.xml",
                "<include><?Include b.xml?><a/></include>",
            )
            .with_file("lib/b.xml", "<include><b/></include>")
            .with_file("lib/bad.xml", "<other/>");
        let doc = root(vec![
            pi("Include lib/a.xml"),
            pi("include lib/a.xml"),
            pi("Include missing.xml"),
            pi("Include lib/bad.xml"),
            pi("Include"),
        ]);
        let (xml, d) = run_static(&doc, &files, &ShaderVarStack::new());
        assert_eq!(xml.matches("<b/>").count(), 2, "{xml}");
        assert_eq!(xml.matches("<a/>").count(), 2, "{xml}");
        assert!(d.contains("Deprecated syntax, please use 'Include'"));
        assert!(d.contains("could not open 'missing.xml'"));
        assert!(d.contains("lib/bad.xml: no <include> node"));
        assert!(d.contains("'include' without filename"));
    }

    #[test]
    fn self_including_file_stops() {
        let files = MemoryFiles::new().with_file("loop.xml", "<include><?Include loop.xml?></include>");
        let doc = root(vec![pi("Include loop.xml")]);
        let (_, d) = run_static(&doc, &files, &ShaderVarStack::new());
        assert!(d.contains("nested too deeply"));
    }

    #[test]
    fn comments_and_empty_instructions() {
        let doc = root(vec![pi("! note"), pi("# note"), pi("   "), txt("x")]);
        let (xml, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(xml.contains('x'));
        assert!(!xml.contains("note"));
        assert!(d.contains("Empty processing instruction"));
    }

    #[test]
    fn bad_condition_disables_block() {
        let doc = root(vec![pi("if vars.a.int =="), txt("hidden"), pi("endif")]);
        let (xml, d) = run_static(&doc, &MemoryFiles::new(), &ShaderVarStack::new());
        assert!(!xml.contains("hidden"));
        assert!(d.contains("Error parsing condition 'vars.a.int =='"));
    }

    #[test]
    fn tree_processing_keeps_both_branches_and_dumps() {
        let diagnostics = Diagnostics::new();
        let files = MemoryFiles::new();
        let env = Env {
            files: &files,
            diagnostics: &diagnostics,
            verbose: false,
        };
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let mut dumper = ConditionDumper::default();
        let doc_src = root(vec![
            pi("if vars.a && vars.b"),
            txt("X"),
            pi("else"),
            txt("Y"),
            pi("endif"),
        ]);
        let (doc, tree) = {
            let mut eval = TreeEval::new(&mut e);
            let doc = Processor::new(&mut eval, Some(&mut dumper), &env).run(&doc_src);
            (doc, eval.into_trees().0)
        };
        let mut resolver = ConditionResolver::new(e);
        tree.to_resolver(&mut resolver);
        assert_eq!(resolver.variant_count(), 2);

        let modes = RenderMeshModes::new();
        let mut stack = ShaderVarStack::new();
        let r = |s: &ShaderVarStack| {
            doc.view(ReadContext::new(&resolver, &modes, s))
                .first_child("r")
                .map(|n| n.contents_value())
                .unwrap_or_default()
        };
        assert_eq!(r(&stack), "Y");
        stack.set("a", ShaderVariable::Int(1));
        stack.set("b", ShaderVariable::Int(1));
        assert_eq!(r(&stack), "X");

        let dump = dumper.into_string();
        assert!(dump.ends_with("= 'vars.a && vars.b'\n"), "{dump}");
        assert_eq!(dump.lines().count(), 3, "{dump}");
    }

    #[test]
    fn techniques_get_condition_scopes_of_their_own() {
        let diagnostics = Diagnostics::new();
        let files = MemoryFiles::new().with_file(
            "p.xml",
            "<program><?if vars.fog?><f/><?endif?></program>",
        );
        let env = Env {
            files: &files,
            diagnostics: &diagnostics,
            verbose: false,
        };
        let mut e = ConditionEvaluator::new(ConstantTable::new());
        let technique = SourceNode::element("technique").with_child(
            SourceNode::element("pass")
                .with_child(SourceNode::element("fp").with_attr("file", "p.xml")),
        );
        let doc_src = root(vec![pi("if vars.hq"), technique, pi("endif")]);
        let (doc, tree, scopes) = {
            let mut eval = TreeEval::new(&mut e);
            let doc = Processor::new(&mut eval, None, &env).run(&doc_src);
            let (tree, scopes) = eval.into_trees();
            (doc, tree, scopes)
        };
        assert_eq!(scopes.len(), 1);
        let mut top = ConditionResolver::new(e.clone());
        tree.to_resolver(&mut top);
        let mut inner = ConditionResolver::new(e);
        scopes[0].to_resolver(&mut inner);
        assert_eq!(top.variant_count(), 2);
        assert_eq!(inner.variant_count(), 2);

        let modes = RenderMeshModes::new();
        let mut stack = ShaderVarStack::new();
        stack.set("hq", ShaderVariable::Int(1));
        let tech = doc
            .view(ReadContext::new(&top, &modes, &stack))
            .first_child("r")
            .and_then(|r| r.first_child("technique"));
        assert_eq!(tech.and_then(|t| t.scope()), Some(0));
        assert!(diagnostics.records().is_empty());
    }
}
