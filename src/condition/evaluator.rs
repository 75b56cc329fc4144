use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;

use crate::condition::constants::ConstantTable;
use crate::condition::operand::{
    CondOperand, CondOperation, OperandType, Operator, SvLocation, ValueKind,
};
use crate::expression::ast::{BinaryOp, Expr, Lit, PathSegment, UnaryOp};
use crate::expression::lexer::lex;
use crate::expression::parser::parse_tokens;
use crate::foundation::bits::BitArray;
use crate::foundation::ids::ConditionId;
use crate::foundation::intern::StringInterner;
use crate::state::modes::{RenderBufferName, RenderMeshModes};
use crate::state::shadervar::{ShaderVarStack, ShaderVariable};

const FLOAT_EPSILON: f64 = 1e-6;

/// Memoized condition results for one evaluation pass over a render state.
#[derive(Debug, Clone, Default)]
pub struct EvalCache {
    checked: BitArray,
    results: BitArray,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.checked.clear();
        self.results.clear();
    }

    /// Preloads known results; later evaluations of these conditions return them unchanged.
    pub fn force_condition_results(
        &mut self,
        results: impl IntoIterator<Item = (ConditionId, bool)>,
    ) {
        for (id, value) in results {
            if id.is_sentinel() {
                continue;
            }
            self.checked.set(id.index(), true);
            self.results.set(id.index(), value);
        }
    }

    fn get(&self, id: ConditionId) -> Option<bool> {
        self.checked
            .get(id.index())
            .then(|| self.results.get(id.index()))
    }

    fn put(&mut self, id: ConditionId, value: bool) {
        self.checked.set(id.index(), true);
        self.results.set(id.index(), value);
    }
}

/// Parses, normalizes, interns and evaluates shader conditions.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    names: StringInterner,
    constants: ConstantTable,
    conditions: Vec<CondOperation>,
    ids: HashMap<CondOperation, ConditionId>,
}

impl ConditionEvaluator {
    pub fn new(constants: ConstantTable) -> Self {
        Self {
            constants,
            ..Self::default()
        }
    }

    pub fn num_conditions(&self) -> usize {
        self.conditions.len()
    }

    pub(crate) fn names(&self) -> &StringInterner {
        &self.names
    }

    pub(crate) fn condition(&self, id: ConditionId) -> Option<&CondOperation> {
        if id.is_sentinel() {
            return None;
        }
        self.conditions.get(id.index())
    }

    /// Parses `text` and returns the interned, folded condition.
    pub fn parse_condition(&mut self, text: &str) -> Result<ConditionId, String> {
        let tokens = lex(text).map_err(|e| format!("Tokenization: {e}"))?;
        let expr = parse_tokens(tokens).map_err(|e| format!("Parsing: {e}"))?;
        let op = self
            .process_expression(&expr)
            .map_err(|e| format!("Processing: {e}"))?;
        Ok(self.find_optimized(op))
    }

    pub(crate) fn process_expression(&mut self, expr: &Expr) -> Result<CondOperation, String> {
        match expr {
            Expr::Lit(_) | Expr::Path(_) => {
                let v = self.resolve_operand(expr)?;
                check_types(&expr.to_string(), &v, OperandType::Boolean)?;
                Ok(CondOperation::new(
                    Operator::Equal,
                    v,
                    CondOperand::Boolean(true),
                ))
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr: inner,
            } => {
                let v = self.resolve_operand(inner)?;
                check_types("!", &v, OperandType::Boolean)?;
                Ok(CondOperation::new(
                    Operator::Equal,
                    v,
                    CondOperand::Boolean(false),
                ))
            }
            Expr::Binary { op, left, right } => {
                let (operator, swap) = match op {
                    BinaryOp::Eq => (Operator::Equal, false),
                    BinaryOp::Ne => (Operator::NotEqual, false),
                    BinaryOp::Lt => (Operator::Lesser, false),
                    BinaryOp::Le => (Operator::LesserEqual, false),
                    BinaryOp::Gt => (Operator::Lesser, true),
                    BinaryOp::Ge => (Operator::LesserEqual, true),
                    BinaryOp::And | BinaryOp::Or => {
                        let operator = if *op == BinaryOp::And {
                            Operator::And
                        } else {
                            Operator::Or
                        };
                        let l = self.resolve_logic_operand(op.symbol(), left)?;
                        let r = self.resolve_logic_operand(op.symbol(), right)?;
                        return Ok(CondOperation::new(operator, l, r));
                    }
                };
                let (l, r) = if swap { (right, left) } else { (left, right) };
                let l = self.resolve_operand(l)?;
                let r = self.resolve_operand(r)?;
                check_types(op.symbol(), &l, r.operand_type())?;
                Ok(CondOperation::new(operator, l, r))
            }
        }
    }

    /// Operand of `&&`/`||`, always turned into an operation reference.
    fn resolve_logic_operand(&mut self, token: &str, expr: &Expr) -> Result<CondOperand, String> {
        let v = self.resolve_operand(expr)?;
        check_types(token, &v, OperandType::Boolean)?;
        if matches!(v, CondOperand::Operation(_)) {
            return Ok(v);
        }
        let id = self.find_optimized(CondOperation::new(
            Operator::Equal,
            v,
            CondOperand::Boolean(true),
        ));
        Ok(CondOperand::Operation(id))
    }

    fn resolve_operand(&mut self, expr: &Expr) -> Result<CondOperand, String> {
        match expr {
            Expr::Lit(Lit::Int(v)) => Ok(CondOperand::Int(*v)),
            Expr::Lit(Lit::Float(v)) => Ok(CondOperand::Float(*v)),
            Expr::Lit(Lit::Bool(v)) => Ok(CondOperand::Boolean(*v)),
            Expr::Path(segments) => self.resolve_path(segments, expr),
            Expr::Unary { .. } | Expr::Binary { .. } => {
                let op = self.process_expression(expr)?;
                Ok(CondOperand::Operation(self.find_optimized(op)))
            }
        }
    }

    fn resolve_path(&mut self, segments: &[PathSegment], expr: &Expr) -> Result<CondOperand, String> {
        match segments {
            [root, var, rest @ ..] if root.name == "vars" && root.indices.is_empty() => {
                let location = SvLocation {
                    name: self.names.intern(&var.name),
                    indices: var.indices.iter().copied().collect::<SmallVec<_>>(),
                    buffer: RenderBufferName::from_descr(&var.name),
                };
                match rest {
                    [] => Ok(CondOperand::ShaderVar(location)),
                    [spec] => match ValueKind::from_specializer(&spec.name) {
                        Some(kind) if spec.indices.is_empty() => {
                            Ok(CondOperand::ShaderVarValue(location, kind))
                        }
                        _ => Err(format!(
                            "Unknown shader variable specializer '{spec}'"
                        )),
                    },
                    _ => Err("Right subexpression is not of type 'value'".to_owned()),
                }
            }
            [root, name] if root.name == "consts" && root.indices.is_empty() => self
                .constants
                .get(&name.name)
                .filter(|_| name.indices.is_empty())
                .map(|c| c.operand())
                .ok_or_else(|| format!("Unknown symbol '{name}'")),
            _ => Err(format!("Unknown identifier '{expr}'")),
        }
    }

    /// Folds constants and trivial logic, then interns what remains.
    pub(crate) fn find_optimized(&mut self, mut op: CondOperation) -> ConditionId {
        fold_sentinel(&mut op.left);
        fold_sentinel(&mut op.right);

        if op.left.is_constant() && op.right.is_constant() {
            return if evaluate_const(&op) {
                ConditionId::ALWAYS_TRUE
            } else {
                ConditionId::ALWAYS_FALSE
            };
        }

        match op.op {
            Operator::And => match (&op.left, &op.right) {
                (CondOperand::Boolean(false), _) | (_, CondOperand::Boolean(false)) => {
                    return ConditionId::ALWAYS_FALSE;
                }
                (CondOperand::Boolean(true), other) | (other, CondOperand::Boolean(true)) => {
                    let other = other.clone();
                    return self.operand_condition(other);
                }
                _ => {}
            },
            Operator::Or => match (&op.left, &op.right) {
                (CondOperand::Boolean(true), _) | (_, CondOperand::Boolean(true)) => {
                    return ConditionId::ALWAYS_TRUE;
                }
                (CondOperand::Boolean(false), other) | (other, CondOperand::Boolean(false)) => {
                    let other = other.clone();
                    return self.operand_condition(other);
                }
                _ => {}
            },
            _ => {}
        }

        self.find_or_intern(op)
    }

    fn operand_condition(&mut self, operand: CondOperand) -> ConditionId {
        match operand {
            CondOperand::Operation(id) => id,
            other => self.find_optimized(CondOperation::new(
                Operator::Equal,
                other,
                CondOperand::Boolean(true),
            )),
        }
    }

    /// Returns the id of a structurally equal operation, interning it when new.
    pub(crate) fn find_or_intern(&mut self, op: CondOperation) -> ConditionId {
        if let Some(&id) = self.ids.get(&op) {
            return id;
        }
        let id = ConditionId::from_index(self.conditions.len());
        self.conditions.push(op.clone());
        self.ids.insert(op, id);
        id
    }

    /// Evaluates a condition against a concrete render state.
    pub fn evaluate(
        &self,
        id: ConditionId,
        cache: &mut EvalCache,
        modes: &RenderMeshModes,
        stack: &ShaderVarStack,
    ) -> bool {
        match id {
            ConditionId::ALWAYS_TRUE => return true,
            ConditionId::ALWAYS_FALSE => return false,
            _ => {}
        }
        if let Some(v) = cache.get(id) {
            return v;
        }
        let Some(op) = self.conditions.get(id.index()) else {
            return false;
        };
        let mut ctx = Live {
            eval: self,
            cache,
            modes,
            stack,
        };
        let result = ctx.operation(op);
        ctx.cache.put(id, result);
        result
    }

    /// True if `condition` is `container` or appears somewhere inside it.
    pub fn is_condition_part_of(&self, condition: ConditionId, container: ConditionId) -> bool {
        if condition == container {
            return true;
        }
        let Some(op) = self.condition(container) else {
            return false;
        };
        [&op.left, &op.right].into_iter().any(|o| match o {
            CondOperand::Operation(id) => self.is_condition_part_of(condition, *id),
            _ => false,
        })
    }

    /// Names of the shader variables a condition reads.
    pub fn used_shader_vars(&self, id: ConditionId) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_used_svs(id, &mut out);
        out
    }

    fn collect_used_svs(&self, id: ConditionId, out: &mut BTreeSet<String>) {
        let Some(op) = self.condition(id) else {
            return;
        };
        for o in [&op.left, &op.right] {
            match o {
                CondOperand::Operation(sub) => self.collect_used_svs(*sub, out),
                CondOperand::ShaderVar(loc) | CondOperand::ShaderVarValue(loc, _) => {
                    out.insert(self.names.get(loc.name).to_owned());
                }
                _ => {}
            }
        }
    }

    /// Renders a condition back to text, for dumps.
    pub fn condition_description(&self, id: ConditionId) -> String {
        match id {
            ConditionId::ALWAYS_TRUE => return "AlwaysTrue".to_owned(),
            ConditionId::ALWAYS_FALSE => return "AlwaysFalse".to_owned(),
            _ => {}
        }
        match self.condition(id) {
            Some(op) => format!(
                "{} {} {}",
                self.operand_description(&op.left),
                op.op.symbol(),
                self.operand_description(&op.right)
            ),
            None => format!("<unknown condition {id}>"),
        }
    }

    fn operand_description(&self, o: &CondOperand) -> String {
        let location = |loc: &SvLocation| {
            let mut s = format!("vars.\"{}\"", self.names.get(loc.name));
            for i in &loc.indices {
                s.push_str(&format!("[{i}]"));
            }
            s
        };
        match o {
            CondOperand::None => "<none>".to_owned(),
            CondOperand::Operation(id) => format!("({})", self.condition_description(*id)),
            CondOperand::Float(v) => format!("{v}"),
            CondOperand::Int(v) => format!("{v}"),
            CondOperand::Boolean(v) => format!("{v}"),
            CondOperand::ShaderVar(loc) => location(loc),
            CondOperand::ShaderVarValue(loc, kind) => {
                format!("{}.{}", location(loc), kind.specializer())
            }
        }
    }
}

fn check_types(token: &str, v: &CondOperand, want: OperandType) -> Result<(), String> {
    let have = v.operand_type();
    if have.compatible(want) {
        Ok(())
    } else {
        Err(format!(
            "Type of '{token}' is '{}', not compatible to '{}'",
            have.description(),
            want.description()
        ))
    }
}

fn fold_sentinel(o: &mut CondOperand) {
    match o {
        CondOperand::Operation(ConditionId::ALWAYS_TRUE) => *o = CondOperand::Boolean(true),
        CondOperand::Operation(ConditionId::ALWAYS_FALSE) => *o = CondOperand::Boolean(false),
        _ => {}
    }
}

fn const_bool(o: &CondOperand) -> bool {
    match o {
        CondOperand::Boolean(v) => *v,
        CondOperand::Int(v) => *v != 0,
        CondOperand::Float(v) => *v != 0.0,
        _ => false,
    }
}

fn const_int(o: &CondOperand) -> i32 {
    match o {
        CondOperand::Int(v) => *v,
        CondOperand::Float(v) => *v as i32,
        CondOperand::Boolean(v) => i32::from(*v),
        _ => 0,
    }
}

fn const_float(o: &CondOperand) -> f64 {
    match o {
        CondOperand::Float(v) => *v,
        CondOperand::Int(v) => f64::from(*v),
        CondOperand::Boolean(v) => f64::from(u8::from(*v)),
        _ => 0.0,
    }
}

fn evaluate_const(op: &CondOperation) -> bool {
    let (l, r) = (&op.left, &op.right);
    let floats = matches!(l, CondOperand::Float(_)) || matches!(r, CondOperand::Float(_));
    match op.op {
        Operator::And => const_bool(l) && const_bool(r),
        Operator::Or => const_bool(l) || const_bool(r),
        Operator::Equal | Operator::NotEqual => {
            let eq = if floats {
                (const_float(l) - const_float(r)).abs() < FLOAT_EPSILON
            } else if matches!(l, CondOperand::Boolean(_)) && matches!(r, CondOperand::Boolean(_)) {
                const_bool(l) == const_bool(r)
            } else {
                const_int(l) == const_int(r)
            };
            eq == (op.op == Operator::Equal)
        }
        Operator::Lesser if floats => const_float(l) < const_float(r),
        Operator::Lesser => const_int(l) < const_int(r),
        Operator::LesserEqual if floats => const_float(l) <= const_float(r),
        Operator::LesserEqual => const_int(l) <= const_int(r),
    }
}

/// Comparison domain picked from the operand types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Domain {
    Float,
    Bool,
    Int,
}

pub(crate) fn comparison_domain(op: &CondOperation) -> Domain {
    let (lt, rt) = (op.left.operand_type(), op.right.operand_type());
    if lt.is_float_valued() || rt.is_float_valued() {
        Domain::Float
    } else if matches!(op.op, Operator::Equal | Operator::NotEqual)
        && lt.compatible(OperandType::Boolean)
        && rt.compatible(OperandType::Boolean)
    {
        Domain::Bool
    } else {
        Domain::Int
    }
}

/// Evaluation against live values.
struct Live<'a> {
    eval: &'a ConditionEvaluator,
    cache: &'a mut EvalCache,
    modes: &'a RenderMeshModes,
    stack: &'a ShaderVarStack,
}

impl Live<'_> {
    fn operation(&mut self, op: &CondOperation) -> bool {
        match op.op {
            Operator::And => self.boolean(&op.left) && self.boolean(&op.right),
            Operator::Or => self.boolean(&op.left) || self.boolean(&op.right),
            Operator::Equal | Operator::NotEqual => {
                let eq = match comparison_domain(op) {
                    Domain::Float => {
                        (self.float(&op.left) - self.float(&op.right)).abs() < FLOAT_EPSILON
                    }
                    Domain::Bool => self.boolean(&op.left) == self.boolean(&op.right),
                    Domain::Int => self.int(&op.left) == self.int(&op.right),
                };
                eq == (op.op == Operator::Equal)
            }
            Operator::Lesser => match comparison_domain(op) {
                Domain::Float => self.float(&op.left) < self.float(&op.right),
                _ => self.int(&op.left) < self.int(&op.right),
            },
            Operator::LesserEqual => match comparison_domain(op) {
                Domain::Float => self.float(&op.left) <= self.float(&op.right),
                _ => self.int(&op.left) <= self.int(&op.right),
            },
        }
    }

    fn lookup(&self, loc: &SvLocation) -> Option<&ShaderVariable> {
        self.stack.lookup(self.eval.names.get(loc.name), &loc.indices)
    }

    fn boolean(&mut self, o: &CondOperand) -> bool {
        match o {
            CondOperand::Operation(id) => self.eval.evaluate(*id, self.cache, self.modes, self.stack),
            CondOperand::Boolean(v) => *v,
            CondOperand::ShaderVar(loc) => self.lookup(loc).is_some(),
            CondOperand::ShaderVarValue(loc, ValueKind::Texture) => {
                self.lookup(loc).and_then(|v| v.texture()).is_some()
            }
            CondOperand::ShaderVarValue(loc, ValueKind::Buffer) => match loc.buffer {
                Some(name) => self.modes.has_buffer(name),
                None => self.lookup(loc).and_then(|v| v.buffer()).is_some(),
            },
            other => self.int(other) != 0,
        }
    }

    fn int(&mut self, o: &CondOperand) -> i32 {
        match o {
            CondOperand::ShaderVarValue(loc, kind) => {
                let Some(v) = self.lookup(loc) else {
                    return 0;
                };
                match kind {
                    ValueKind::Int => v.int(),
                    ValueKind::Float => v.float() as i32,
                    ValueKind::X | ValueKind::Y | ValueKind::Z | ValueKind::W => {
                        v.vector()[kind.component()] as i32
                    }
                    ValueKind::Texture | ValueKind::Buffer => 0,
                }
            }
            CondOperand::Operation(_) | CondOperand::ShaderVar(_) => i32::from(self.boolean(o)),
            other => const_int(other),
        }
    }

    fn float(&mut self, o: &CondOperand) -> f64 {
        match o {
            CondOperand::ShaderVarValue(loc, kind) => {
                let Some(v) = self.lookup(loc) else {
                    return 0.0;
                };
                match kind {
                    ValueKind::Int => f64::from(v.int()),
                    ValueKind::Float => f64::from(v.float()),
                    ValueKind::X | ValueKind::Y | ValueKind::Z | ValueKind::W => {
                        f64::from(v.vector()[kind.component()])
                    }
                    ValueKind::Texture | ValueKind::Buffer => 0.0,
                }
            }
            CondOperand::Operation(_) | CondOperand::ShaderVar(_) => {
                f64::from(u8::from(self.boolean(o)))
            }
            other => const_float(other),
        }
    }
}
