//! Three-valued checking of conditions against sets of possible variable values.
//!
//! Besides the verdict, a full check narrows the assumed values for both outcomes: after
//! `vars.n.int < 3` turns out uncertain, the true side knows `n < 3` and the false side
//! knows `n >= 3`.

use crate::condition::evaluator::{ConditionEvaluator, Domain, comparison_domain};
use crate::condition::logic3::Logic3;
use crate::condition::operand::{CondOperand, CondOperation, Operator, ValueKind};
use crate::condition::valueset::{Interval, ValueSet, ValueSetBool};
use crate::condition::variables::{BoolSlot, SvKey, Variables};
use crate::foundation::ids::ConditionId;

/// Verdict of a full check plus the narrowed assumptions for each outcome.
#[derive(Debug, Clone)]
pub(crate) struct CheckResult {
    pub(crate) result: Logic3,
    pub(crate) true_vars: Variables,
    pub(crate) false_vars: Variables,
}

impl CheckResult {
    fn unchanged(result: Logic3, vars: &Variables) -> Self {
        Self {
            result,
            true_vars: vars.clone(),
            false_vars: vars.clone(),
        }
    }
}

trait PossibleValues: Clone {
    type Item: PartialEq;

    fn single(&self) -> Option<Self::Item>;
    fn meet(&self, other: &Self) -> Self;
    fn negate(&self) -> Self;
    fn is_void(&self) -> bool;
}

impl PossibleValues for ValueSet {
    type Item = f64;

    fn single(&self) -> Option<f64> {
        self.single_value()
    }

    fn meet(&self, other: &Self) -> Self {
        self.intersect(other)
    }

    fn negate(&self) -> Self {
        self.complement()
    }

    fn is_void(&self) -> bool {
        self.is_empty()
    }
}

impl PossibleValues for ValueSetBool {
    type Item = bool;

    fn single(&self) -> Option<bool> {
        self.single_value()
    }

    fn meet(&self, other: &Self) -> Self {
        self.intersect(*other)
    }

    fn negate(&self) -> Self {
        self.complement()
    }

    fn is_void(&self) -> bool {
        self.is_empty()
    }
}

/// Result of comparing two operands, with each side's values for both outcomes.
struct Refined<S> {
    result: Logic3,
    a_true: S,
    a_false: S,
    b_true: S,
    b_false: S,
}

impl<S: Clone> Refined<S> {
    fn unchanged(result: Logic3, a: &S, b: &S) -> Self {
        Self {
            result,
            a_true: a.clone(),
            a_false: a.clone(),
            b_true: b.clone(),
            b_false: b.clone(),
        }
    }

    fn negated(self) -> Self {
        Self {
            result: !self.result,
            a_true: self.a_false,
            a_false: self.a_true,
            b_true: self.b_false,
            b_false: self.b_true,
        }
    }
}

fn equal<S: PossibleValues>(a: &S, b: &S) -> Refined<S> {
    let (sa, sb) = (a.single(), b.single());
    if let (Some(x), Some(y)) = (&sa, &sb)
        && x == y
    {
        return Refined {
            result: Logic3::Truth,
            a_true: a.clone(),
            a_false: a.negate(),
            b_true: a.clone(),
            b_false: a.negate(),
        };
    }
    let overlap = a.meet(b);
    if overlap.is_void() {
        return Refined::unchanged(Logic3::Lie, a, b);
    }
    // Inequality only excludes a value when the other side is pinned to it.
    let a_false = if sb.is_some() { a.meet(&b.negate()) } else { a.clone() };
    let b_false = if sa.is_some() { b.meet(&a.negate()) } else { b.clone() };
    Refined {
        result: Logic3::Uncertain,
        a_true: overlap.clone(),
        a_false,
        b_true: overlap,
        b_false,
    }
}

fn lesser(a: &ValueSet, b: &ValueSet) -> Refined<ValueSet> {
    let (Some((a_lo, a_lo_closed)), Some((a_hi, a_hi_closed))) = (a.lower(), a.upper()) else {
        return Refined::unchanged(Logic3::Lie, a, b);
    };
    let (Some((b_lo, b_lo_closed)), Some((b_hi, b_hi_closed))) = (b.lower(), b.upper()) else {
        return Refined::unchanged(Logic3::Lie, a, b);
    };
    if a_hi < b_lo || (a_hi == b_lo && !(a_hi_closed && b_lo_closed)) {
        return Refined::unchanged(Logic3::Truth, a, b);
    }
    if a_lo >= b_hi {
        return Refined::unchanged(Logic3::Lie, a, b);
    }
    Refined {
        result: Logic3::Uncertain,
        a_true: a.intersect(&ValueSet::from_interval(Interval::below(b_hi, false))),
        a_false: a.intersect(&ValueSet::from_interval(Interval::above(b_lo, b_lo_closed))),
        b_true: b.intersect(&ValueSet::from_interval(Interval::above(a_lo, false))),
        b_false: b.intersect(&ValueSet::from_interval(Interval::below(a_hi, a_hi_closed))),
    }
}

fn lesser_equal(a: &ValueSet, b: &ValueSet) -> Refined<ValueSet> {
    let (Some((a_lo, a_lo_closed)), Some((a_hi, a_hi_closed))) = (a.lower(), a.upper()) else {
        return Refined::unchanged(Logic3::Lie, a, b);
    };
    let (Some((b_lo, b_lo_closed)), Some((b_hi, b_hi_closed))) = (b.lower(), b.upper()) else {
        return Refined::unchanged(Logic3::Lie, a, b);
    };
    if a_hi <= b_lo {
        return Refined::unchanged(Logic3::Truth, a, b);
    }
    if a_lo > b_hi || (a_lo == b_hi && !(a_lo_closed && b_hi_closed)) {
        return Refined::unchanged(Logic3::Lie, a, b);
    }
    Refined {
        result: Logic3::Uncertain,
        a_true: a.intersect(&ValueSet::from_interval(Interval::below(b_hi, b_hi_closed))),
        a_false: a.intersect(&ValueSet::from_interval(Interval::above(b_lo, false))),
        b_true: b.intersect(&ValueSet::from_interval(Interval::above(a_lo, a_lo_closed))),
        b_false: b.intersect(&ValueSet::from_interval(Interval::below(a_hi, false))),
    }
}

/// Possible numeric values of an operand and the slot they came from.
struct NumOperand {
    values: ValueSet,
    target: Option<(SvKey, usize)>,
}

/// Possible boolean values of an operand and the slot they came from.
struct BoolOperand {
    values: ValueSetBool,
    target: Option<(SvKey, BoolSlot)>,
}

impl ConditionEvaluator {
    /// Checks `id` under the assumed `vars`, narrowing the assumptions for both outcomes.
    pub(crate) fn check_condition_results(&self, id: ConditionId, vars: &Variables) -> CheckResult {
        match id {
            ConditionId::ALWAYS_TRUE => return CheckResult::unchanged(Logic3::Truth, vars),
            ConditionId::ALWAYS_FALSE => return CheckResult::unchanged(Logic3::Lie, vars),
            _ => {}
        }
        let Some(op) = self.condition(id) else {
            return CheckResult::unchanged(Logic3::Uncertain, vars);
        };
        match op.op {
            Operator::And => self.check_and(&op.left, &op.right, vars),
            Operator::Or => self.check_or(&op.left, &op.right, vars),
            _ => self.check_comparison(op, vars),
        }
    }

    /// Verdict only, without narrowing.
    pub(crate) fn check_condition_simple(&self, id: ConditionId, vars: &Variables) -> Logic3 {
        match id {
            ConditionId::ALWAYS_TRUE => return Logic3::Truth,
            ConditionId::ALWAYS_FALSE => return Logic3::Lie,
            _ => {}
        }
        let Some(op) = self.condition(id) else {
            return Logic3::Uncertain;
        };
        match op.op {
            Operator::And => self
                .simple_operand(&op.left, vars)
                .and(self.simple_operand(&op.right, vars)),
            Operator::Or => self
                .simple_operand(&op.left, vars)
                .or(self.simple_operand(&op.right, vars)),
            _ => self.compare(op, vars).0,
        }
    }

    fn simple_operand(&self, o: &CondOperand, vars: &Variables) -> Logic3 {
        match o {
            CondOperand::Operation(id) => self.check_condition_simple(*id, vars),
            CondOperand::Boolean(v) => Logic3::from_bool(*v),
            _ => Logic3::Uncertain,
        }
    }

    fn check_operand(&self, o: &CondOperand, vars: &Variables) -> CheckResult {
        match o {
            CondOperand::Operation(id) => self.check_condition_results(*id, vars),
            CondOperand::Boolean(v) => CheckResult::unchanged(Logic3::from_bool(*v), vars),
            _ => CheckResult::unchanged(Logic3::Uncertain, vars),
        }
    }

    fn check_and(&self, a: &CondOperand, b: &CondOperand, vars: &Variables) -> CheckResult {
        let ra = self.check_operand(a, vars);
        match ra.result {
            Logic3::Truth => self.check_operand(b, &ra.true_vars),
            Logic3::Lie => ra,
            Logic3::Uncertain => {
                let at = self.check_operand(b, &ra.true_vars);
                let af = self.check_operand(b, &ra.false_vars);
                let rb = both_branches(at.result, af.result);
                CheckResult {
                    result: Logic3::Uncertain.and(rb),
                    false_vars: at.false_vars.union(&af.true_vars).union(&af.false_vars),
                    true_vars: at.true_vars,
                }
            }
        }
    }

    fn check_or(&self, a: &CondOperand, b: &CondOperand, vars: &Variables) -> CheckResult {
        let ra = self.check_operand(a, vars);
        match ra.result {
            Logic3::Truth => ra,
            Logic3::Lie => self.check_operand(b, &ra.false_vars),
            Logic3::Uncertain => {
                let at = self.check_operand(b, &ra.true_vars);
                let af = self.check_operand(b, &ra.false_vars);
                let rb = both_branches(at.result, af.result);
                CheckResult {
                    result: Logic3::Uncertain.or(rb),
                    true_vars: at.true_vars.union(&at.false_vars).union(&af.true_vars),
                    false_vars: af.false_vars,
                }
            }
        }
    }

    fn check_comparison(&self, op: &CondOperation, vars: &Variables) -> CheckResult {
        let (result, writes) = self.compare(op, vars);
        let mut out = CheckResult::unchanged(result, vars);
        writes.apply(&mut out);
        out
    }

    fn compare(&self, op: &CondOperation, vars: &Variables) -> (Logic3, Writes) {
        if comparison_domain(op) == Domain::Bool {
            let a = self.bool_operand(&op.left, vars);
            let b = self.bool_operand(&op.right, vars);
            let r = match op.op {
                Operator::NotEqual => equal(&a.values, &b.values).negated(),
                _ => equal(&a.values, &b.values),
            };
            let result = r.result;
            (result, Writes::Bool([(a.target, r.a_true, r.a_false), (b.target, r.b_true, r.b_false)]))
        } else {
            let a = self.num_operand(&op.left, vars);
            let b = self.num_operand(&op.right, vars);
            let r = match op.op {
                Operator::Equal => equal(&a.values, &b.values),
                Operator::NotEqual => equal(&a.values, &b.values).negated(),
                Operator::Lesser => lesser(&a.values, &b.values),
                _ => lesser_equal(&a.values, &b.values),
            };
            let result = r.result;
            (result, Writes::Num([(a.target, r.a_true, r.a_false), (b.target, r.b_true, r.b_false)]))
        }
    }

    fn num_operand(&self, o: &CondOperand, vars: &Variables) -> NumOperand {
        let literal = |v: f64| NumOperand {
            values: ValueSet::single(v),
            target: None,
        };
        match o {
            CondOperand::Float(v) => literal(*v),
            CondOperand::Int(v) => literal(f64::from(*v)),
            CondOperand::Boolean(v) => literal(f64::from(u8::from(*v))),
            CondOperand::ShaderVarValue(loc, kind)
                if !matches!(kind, ValueKind::Texture | ValueKind::Buffer) =>
            {
                let key = loc.key();
                let c = kind.component();
                NumOperand {
                    values: vars.get(&key).component(c).clone(),
                    target: Some((key, c)),
                }
            }
            _ => NumOperand {
                values: ValueSet::full(),
                target: None,
            },
        }
    }

    fn bool_operand(&self, o: &CondOperand, vars: &Variables) -> BoolOperand {
        if let (Some(loc), Some(slot)) = (o.location(), o.bool_slot()) {
            let key = loc.key();
            return BoolOperand {
                values: vars.get(&key).flag(slot),
                target: Some((key, slot)),
            };
        }
        let values = match o {
            CondOperand::Operation(id) => match self.check_condition_simple(*id, vars) {
                Logic3::Truth => ValueSetBool::single(true),
                Logic3::Lie => ValueSetBool::single(false),
                Logic3::Uncertain => ValueSetBool::default(),
            },
            CondOperand::Boolean(v) => ValueSetBool::single(*v),
            _ => ValueSetBool::default(),
        };
        BoolOperand {
            values,
            target: None,
        }
    }
}

fn both_branches(when_true: Logic3, when_false: Logic3) -> Logic3 {
    match (when_true, when_false) {
        (Logic3::Truth, Logic3::Truth) => Logic3::Truth,
        (Logic3::Lie, Logic3::Lie) => Logic3::Lie,
        _ => Logic3::Uncertain,
    }
}

type NumWrite = (Option<(SvKey, usize)>, ValueSet, ValueSet);
type BoolWrite = (Option<(SvKey, BoolSlot)>, ValueSetBool, ValueSetBool);

/// Narrowed values to store back, left operand first.
enum Writes {
    Num([NumWrite; 2]),
    Bool([BoolWrite; 2]),
}

impl Writes {
    fn apply(self, out: &mut CheckResult) {
        match self {
            Writes::Num(writes) => {
                for (target, t, f) in writes {
                    if let Some((key, c)) = target {
                        out.true_vars.get_mut(&key).set_component(c, t);
                        out.false_vars.get_mut(&key).set_component(c, f);
                    }
                }
            }
            Writes::Bool(writes) => {
                for (target, t, f) in writes {
                    if let Some((key, slot)) = target {
                        out.true_vars.get_mut(&key).set_flag(slot, t);
                        out.false_vars.get_mut(&key).set_flag(slot, f);
                    }
                }
            }
        }
    }
}
