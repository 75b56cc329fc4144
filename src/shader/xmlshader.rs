use std::collections::BTreeSet;
use std::rc::Rc;

use crate::diagnostics::Severity;
use crate::preprocess::wrapped::{NodeView, ReadContext, WrappedDocument};
use crate::resolver::runtime::ConditionResolver;
use crate::state::modes::RenderMeshModes;
use crate::state::shadervar::ShaderVarStack;

use super::compiler::CompilerEnv;
use super::host::Graphics;
use super::pass::{Pass, PassScratch, SavedState};
use super::technique::{LoadContext, Technique, scan_techniques};

#[derive(Default)]
struct ShaderVariant {
    prepared: bool,
    technique: Option<Technique>,
}

/// One `<technique>` element and the variants of the conditions inside it.
struct TechniqueSlot {
    resolver: ConditionResolver,
    /// First ticket taken by this technique.
    offset: usize,
    variants: Vec<ShaderVariant>,
}

impl TechniqueSlot {
    fn slots(&self) -> usize {
        self.resolver.variant_count().max(1)
    }
}

/// Techniques visible under one technique-choice variant.
#[derive(Default)]
struct TechVariant {
    scanned: bool,
    /// Technique indices, best first.
    candidates: Vec<usize>,
    reported: bool,
}

#[derive(Debug, Clone, Copy)]
struct ActivePass {
    technique: usize,
    variant: usize,
    pass: usize,
    saved: SavedState,
}

/// Decoded form of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticket {
    /// Variant `variant` of the technique with index `technique`.
    Technique { technique: usize, variant: usize },
    /// A ticket of the fallback shader.
    Fallback(usize),
}

/// A compiled shader: one wrapped document whose techniques are loaded lazily per variant.
///
/// The top resolver picks which techniques are visible; each technique has a resolver of its
/// own for the conditions inside it. Tickets number the variants of all techniques one after
/// the other, with fallback tickets interleaved on top.
pub struct XmlShader {
    env: Rc<CompilerEnv>,
    name: String,
    resolver: ConditionResolver,
    techniques: Vec<TechniqueSlot>,
    tech_variants: Vec<TechVariant>,
    ticket_count: usize,
    document: WrappedDocument,
    force_priority: Option<i32>,
    variables: ShaderVarStack,
    fallback: Option<Box<XmlShader>>,
    active: Option<ActivePass>,
    dump: String,
}

impl std::fmt::Debug for XmlShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlShader")
            .field("name", &self.name)
            .field("technique_variants", &self.resolver.variant_count())
            .field("tickets", &self.ticket_count)
            .field("fallback", &self.fallback.as_ref().map(|s| s.name.as_str()))
            .finish_non_exhaustive()
    }
}

impl XmlShader {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        env: Rc<CompilerEnv>,
        name: String,
        resolver: ConditionResolver,
        technique_resolvers: Vec<ConditionResolver>,
        document: WrappedDocument,
        force_priority: Option<i32>,
        variables: ShaderVarStack,
        fallback: Option<Box<XmlShader>>,
        dump: String,
    ) -> Self {
        let mut ticket_count = 0;
        let techniques = technique_resolvers
            .into_iter()
            .map(|resolver| {
                let slot = TechniqueSlot {
                    resolver,
                    offset: ticket_count,
                    variants: Vec::new(),
                };
                ticket_count += slot.slots();
                slot
            })
            .collect();
        Self {
            env,
            name,
            resolver,
            techniques,
            tech_variants: Vec::new(),
            ticket_count,
            document,
            force_priority,
            variables,
            fallback,
            active: None,
            dump,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolver of the conditions that decide which techniques are visible.
    pub fn resolver(&self) -> &ConditionResolver {
        &self.resolver
    }

    pub fn technique_count(&self) -> usize {
        self.techniques.len()
    }

    /// Resolver of the conditions inside the technique with index `technique`.
    pub fn technique_resolver(&self, technique: usize) -> Option<&ConditionResolver> {
        self.techniques.get(technique).map(|t| &t.resolver)
    }

    pub fn fallback(&self) -> Option<&XmlShader> {
        self.fallback.as_deref()
    }

    /// Condition and tree dump collected while wrapping, per the dump options.
    pub fn condition_dump(&self) -> &str {
        &self.dump
    }

    /// Number of tickets the techniques can hand out, fallback tickets aside.
    pub fn ticket_count(&self) -> usize {
        self.ticket_count
    }

    pub fn dump_stats(&self) -> String {
        let varying = !self.resolver.is_unconditional()
            || self.techniques.iter().any(|t| !t.resolver.is_unconditional());
        if !varying {
            return "unvarying".to_owned();
        }
        format!(
            "{} technique variations; tickets: {}",
            self.resolver.variant_count(),
            self.ticket_count
        )
    }

    /// Ticket of variant `variant` of the technique with index `technique`.
    pub fn ticket(&self, technique: usize, variant: usize) -> Option<usize> {
        let slot = self.techniques.get(technique)?;
        (variant < slot.slots()).then_some(slot.offset + variant)
    }

    /// Number of ticket slots, one more than that per fallback ticket.
    fn slots(&self) -> usize {
        self.ticket_count.max(1)
    }

    /// Splits a ticket into technique and variant, or into the fallback shader's ticket.
    pub fn decode_ticket(&self, ticket: usize) -> Option<Ticket> {
        let n = self.slots();
        if ticket % (n + 1) == n {
            return Some(Ticket::Fallback(ticket / (n + 1)));
        }
        let technique = self.techniques.iter().rposition(|t| t.offset <= ticket)?;
        let variant = ticket - self.techniques[technique].offset;
        (variant < self.techniques[technique].slots())
            .then_some(Ticket::Technique { technique, variant })
    }

    fn encode_fallback(&self, fallback_ticket: usize) -> Option<usize> {
        let n = self.slots();
        fallback_ticket.checked_mul(n + 1)?.checked_add(n)
    }

    fn shader_view<'a>(
        &'a self,
        modes: &'a RenderMeshModes,
        stack: &'a ShaderVarStack,
    ) -> Option<NodeView<'a>> {
        self.document
            .view(ReadContext::new(&self.resolver, modes, stack))
            .first_child("shader")
    }

    /// Priorities of the techniques visible under a render state, best first.
    pub fn technique_priorities(
        &self,
        modes: &RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> Vec<i32> {
        self.shader_view(modes, stack)
            .map(|shader| {
                scan_techniques(&shader, &self.env.tags, self.force_priority)
                    .into_iter()
                    .map(|c| c.priority)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Selects the technique and its variant for a render state, loading it on first use.
    ///
    /// Visible techniques are tried best first. Returns `None` when neither a technique nor the
    /// fallback can render the state.
    #[tracing::instrument(level = "debug", skip_all, fields(shader = %self.name))]
    pub fn get_ticket(
        &mut self,
        modes: &RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> Option<usize> {
        let tv = self.resolver.get_variant(modes, stack);
        if self.tech_variants.len() <= tv {
            self.tech_variants.resize_with(tv + 1, TechVariant::default);
        }
        if !self.tech_variants[tv].scanned {
            let candidates = self.visible_techniques(modes, stack);
            let entry = &mut self.tech_variants[tv];
            entry.candidates = candidates;
            entry.scanned = true;
        }

        let candidates = self.tech_variants[tv].candidates.clone();
        for technique in candidates {
            let Some(slot) = self.techniques.get(technique) else {
                continue;
            };
            let variant = slot.resolver.get_variant(modes, stack);
            let ticket = slot.offset + variant;
            let prepared = slot.variants.get(variant).is_some_and(|v| v.prepared);
            if !prepared {
                let loaded = self.load_technique(technique, ticket, modes, stack);
                let slot = &mut self.techniques[technique];
                if slot.variants.len() <= variant {
                    slot.variants.resize_with(variant + 1, ShaderVariant::default);
                }
                slot.variants[variant] = ShaderVariant {
                    prepared: true,
                    technique: loaded,
                };
            }
            if self.technique(technique, variant).is_some() {
                return Some(ticket);
            }
        }

        if !self.tech_variants[tv].reported {
            self.tech_variants[tv].reported = true;
            if self.fallback.is_some() {
                if self.env.options.verbose {
                    self.env.diagnostics.report(
                        Severity::Notify,
                        format!(
                            "No technique validated for shader '{}'<{tv}>: using fallback",
                            self.name
                        ),
                    );
                }
            } else {
                self.env.diagnostics.warning(format!(
                    "No technique validated for shader '{}'<{tv}>",
                    self.name
                ));
            }
        }
        let fallback_ticket = self.fallback.as_mut()?.get_ticket(modes, stack)?;
        self.encode_fallback(fallback_ticket)
    }

    /// Indices of the techniques visible under a render state, best first.
    fn visible_techniques(&self, modes: &RenderMeshModes, stack: &ShaderVarStack) -> Vec<usize> {
        let Some(shader) = self.shader_view(modes, stack) else {
            return Vec::new();
        };
        scan_techniques(&shader, &self.env.tags, self.force_priority)
            .iter()
            .filter_map(|c| c.node.scope())
            .collect()
    }

    fn load_technique(
        &self,
        technique: usize,
        ticket: usize,
        modes: &RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> Option<Technique> {
        let shader = self.shader_view(modes, stack)?;
        let candidate = scan_techniques(&shader, &self.env.tags, self.force_priority)
            .into_iter()
            .find(|c| c.node.scope() == Some(technique))?;
        let ctx = LoadContext {
            env: &self.env,
            shader: &self.name,
            evaluator: self.resolver.evaluator(),
            modes,
            stack,
        };
        let verbose = self.env.options.verbose;
        match Technique::load(&ctx, &candidate, &shader) {
            Ok(tech) => {
                if verbose {
                    self.env.diagnostics.report(
                        Severity::Notify,
                        format!(
                            "Shader '{}'<{ticket}>: Technique with priority {} succeeds!",
                            self.name,
                            tech.priority()
                        ),
                    );
                }
                Some(tech)
            }
            Err(reason) => {
                if verbose {
                    self.env.diagnostics.report(
                        Severity::Notify,
                        format!(
                            "Shader '{}'<{ticket}>: Technique with priority {} fails. Reason: {reason}.",
                            self.name, candidate.priority
                        ),
                    );
                }
                None
            }
        }
    }

    fn technique(&self, technique: usize, variant: usize) -> Option<&Technique> {
        self.techniques
            .get(technique)?
            .variants
            .get(variant)?
            .technique
            .as_ref()
    }

    fn technique_mut(&mut self, technique: usize, variant: usize) -> Option<&mut Technique> {
        self.techniques
            .get_mut(technique)?
            .variants
            .get_mut(variant)?
            .technique
            .as_mut()
    }

    pub fn num_passes(&self, ticket: usize) -> usize {
        match self.decode_ticket(ticket) {
            Some(Ticket::Fallback(ft)) => self.fallback.as_ref().map_or(0, |f| f.num_passes(ft)),
            Some(Ticket::Technique { technique, variant }) => self
                .technique(technique, variant)
                .map_or(0, |t| t.passes.len()),
            None => 0,
        }
    }

    /// Pushes the default values of the shader's variables below those already on `stack`.
    pub fn push_variables(&self, ticket: usize, stack: &mut ShaderVarStack) {
        match self.decode_ticket(ticket) {
            Some(Ticket::Fallback(ft)) => {
                if let Some(f) = &self.fallback {
                    f.push_variables(ft, stack);
                }
            }
            Some(Ticket::Technique { technique, variant }) => {
                if let Some(tech) = self.technique(technique, variant) {
                    for (name, value) in tech.variables().iter() {
                        stack.set_default(name, value.clone());
                    }
                }
                for (name, value) in self.variables.iter() {
                    stack.set_default(name, value.clone());
                }
            }
            None => {}
        }
    }

    pub fn used_shader_vars(&self, ticket: usize) -> BTreeSet<String> {
        match self.decode_ticket(ticket) {
            Some(Ticket::Fallback(ft)) => self
                .fallback
                .as_ref()
                .map(|f| f.used_shader_vars(ft))
                .unwrap_or_default(),
            Some(Ticket::Technique { technique, variant }) => self
                .technique(technique, variant)
                .map(Technique::used_shader_vars)
                .unwrap_or_default(),
            None => BTreeSet::new(),
        }
    }

    pub fn activate_pass(&mut self, ticket: usize, number: usize, g3d: &mut dyn Graphics) -> bool {
        let (technique, variant) = match self.decode_ticket(ticket) {
            Some(Ticket::Fallback(ft)) => {
                return self
                    .fallback
                    .as_mut()
                    .is_some_and(|f| f.activate_pass(ft, number, g3d));
            }
            Some(Ticket::Technique { technique, variant }) => (technique, variant),
            None => return false,
        };
        if self.active.is_some() {
            return false;
        }
        let Some(pass) = self
            .technique_mut(technique, variant)
            .and_then(|t| t.passes.get_mut(number))
        else {
            return false;
        };
        let saved = pass.activate(g3d);
        self.active = Some(ActivePass {
            technique,
            variant,
            pass: number,
            saved,
        });
        true
    }

    fn active_pass(&mut self) -> Option<&mut Pass> {
        let active = self.active?;
        self.technique_mut(active.technique, active.variant)?
            .passes
            .get_mut(active.pass)
    }

    /// Binds the active pass for one mesh, adjusting `modes` to the pass's render state.
    pub fn setup_pass(
        &mut self,
        ticket: usize,
        g3d: &mut dyn Graphics,
        scratch: &mut PassScratch,
        modes: &mut RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> bool {
        if let Some(Ticket::Fallback(ft)) = self.decode_ticket(ticket) {
            return self
                .fallback
                .as_mut()
                .is_some_and(|f| f.setup_pass(ft, g3d, scratch, modes, stack));
        }
        self.active_pass()
            .is_some_and(|pass| pass.setup(g3d, scratch, modes, stack))
    }

    pub fn teardown_pass(&mut self, ticket: usize, g3d: &mut dyn Graphics) -> bool {
        if let Some(Ticket::Fallback(ft)) = self.decode_ticket(ticket) {
            return self
                .fallback
                .as_mut()
                .is_some_and(|f| f.teardown_pass(ft, g3d));
        }
        match self.active_pass() {
            Some(pass) => {
                pass.teardown(g3d);
                true
            }
            None => false,
        }
    }

    pub fn deactivate_pass(&mut self, ticket: usize, g3d: &mut dyn Graphics) -> bool {
        if let Some(Ticket::Fallback(ft)) = self.decode_ticket(ticket) {
            return self
                .fallback
                .as_mut()
                .is_some_and(|f| f.deactivate_pass(ft, g3d));
        }
        let Some(active) = self.active else {
            return false;
        };
        let restored = match self.active_pass() {
            Some(pass) => {
                pass.deactivate(g3d, active.saved);
                true
            }
            None => false,
        };
        self.active = None;
        restored
    }
}
