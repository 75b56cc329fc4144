use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::condition::variables::{BoolSlot, SvKey};
use crate::foundation::hash::StableHasher;
use crate::foundation::ids::ConditionId;
use crate::foundation::intern::InternId;
use crate::state::modes::RenderBufferName;

/// Which value of a shader variable an operand reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ValueKind {
    Int,
    Float,
    X,
    Y,
    Z,
    W,
    Texture,
    Buffer,
}

impl ValueKind {
    pub(crate) fn from_specializer(s: &str) -> Option<Self> {
        Some(match s {
            "int" => Self::Int,
            "float" => Self::Float,
            "x" => Self::X,
            "y" => Self::Y,
            "z" => Self::Z,
            "w" => Self::W,
            "texture" => Self::Texture,
            "buffer" => Self::Buffer,
            _ => return None,
        })
    }

    pub(crate) fn specializer(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::W => "w",
            Self::Texture => "texture",
            Self::Buffer => "buffer",
        }
    }

    /// Vector component read by numeric kinds.
    pub(crate) fn component(self) -> usize {
        match self {
            Self::Y => 1,
            Self::Z => 2,
            Self::W => 3,
            _ => 0,
        }
    }

    fn tag(self) -> u8 {
        self as u8
    }
}

/// Where a shader variable lives: its name, array index path and, when the name is a
/// render-buffer descriptor, the buffer it stands for.
#[derive(Debug, Clone)]
pub(crate) struct SvLocation {
    pub(crate) name: InternId,
    pub(crate) indices: SmallVec<[usize; 2]>,
    pub(crate) buffer: Option<RenderBufferName>,
}

impl SvLocation {
    pub(crate) fn key(&self) -> SvKey {
        SvKey {
            name: self.name,
            indices: self.indices.clone(),
        }
    }
}

impl PartialEq for SvLocation {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.indices == other.indices
    }
}

impl Eq for SvLocation {}

/// Operand type lattice used for compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum OperandType {
    None,
    Operation,
    Float,
    Int,
    Boolean,
    Sv,
    SvInt,
    SvFloat,
    SvX,
    SvY,
    SvZ,
    SvW,
    SvTexture,
    SvBuffer,
}

impl OperandType {
    pub(crate) fn description(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Operation => "operation",
            Self::Float => "float",
            Self::Int => "int",
            Self::Boolean => "bool",
            Self::Sv => "shadervar",
            Self::SvInt => "shadervar int value",
            Self::SvFloat => "shadervar float value",
            Self::SvX => "shadervar vector x value",
            Self::SvY => "shadervar vector y value",
            Self::SvZ => "shadervar vector z value",
            Self::SvW => "shadervar vector w value",
            Self::SvTexture => "shadervar texture value",
            Self::SvBuffer => "shadervar buffer value",
        }
    }

    /// Plain type a value of this type behaves as.
    fn base(self) -> OperandType {
        match self {
            Self::Operation | Self::Sv | Self::SvTexture | Self::SvBuffer => Self::Boolean,
            Self::SvInt => Self::Int,
            Self::SvFloat | Self::SvX | Self::SvY | Self::SvZ | Self::SvW => Self::Float,
            other => other,
        }
    }

    pub(crate) fn compatible(self, other: OperandType) -> bool {
        let (a, b) = (self.base(), other.base());
        match a {
            Self::None => false,
            Self::Float | Self::Int => matches!(b, Self::Float | Self::Int),
            Self::Boolean => b == Self::Boolean,
            _ => false,
        }
    }

    pub(crate) fn is_float_valued(self) -> bool {
        matches!(
            self,
            Self::Float | Self::SvFloat | Self::SvX | Self::SvY | Self::SvZ | Self::SvW
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CondOperand {
    None,
    Operation(ConditionId),
    Float(f64),
    Int(i32),
    Boolean(bool),
    /// Tests whether the variable exists.
    ShaderVar(SvLocation),
    ShaderVarValue(SvLocation, ValueKind),
}

impl CondOperand {
    pub(crate) fn operation(&self) -> Option<ConditionId> {
        match self {
            Self::Operation(id) => Some(*id),
            _ => None,
        }
    }

    pub(crate) fn operand_type(&self) -> OperandType {
        match self {
            Self::None => OperandType::None,
            Self::Operation(_) => OperandType::Operation,
            Self::Float(_) => OperandType::Float,
            Self::Int(_) => OperandType::Int,
            Self::Boolean(_) => OperandType::Boolean,
            Self::ShaderVar(_) => OperandType::Sv,
            Self::ShaderVarValue(_, kind) => match kind {
                ValueKind::Int => OperandType::SvInt,
                ValueKind::Float => OperandType::SvFloat,
                ValueKind::X => OperandType::SvX,
                ValueKind::Y => OperandType::SvY,
                ValueKind::Z => OperandType::SvZ,
                ValueKind::W => OperandType::SvW,
                ValueKind::Texture => OperandType::SvTexture,
                ValueKind::Buffer => OperandType::SvBuffer,
            },
        }
    }

    pub(crate) fn is_constant(&self) -> bool {
        matches!(self, Self::Float(_) | Self::Int(_) | Self::Boolean(_))
    }

    pub(crate) fn location(&self) -> Option<&SvLocation> {
        match self {
            Self::ShaderVar(loc) | Self::ShaderVarValue(loc, _) => Some(loc),
            _ => None,
        }
    }

    /// Boolean fact an operand reads from the value sets, if it reads one.
    pub(crate) fn bool_slot(&self) -> Option<BoolSlot> {
        match self {
            Self::ShaderVar(_) => Some(BoolSlot::Exists),
            Self::ShaderVarValue(_, ValueKind::Texture) => Some(BoolSlot::Texture),
            Self::ShaderVarValue(_, ValueKind::Buffer) => Some(BoolSlot::Buffer),
            _ => None,
        }
    }

    fn stable_hash(&self, h: &mut StableHasher) {
        match self {
            Self::None => h.write_u8(0),
            Self::Operation(id) => {
                h.write_u8(1);
                h.write_u32(id.raw());
            }
            Self::Float(v) => {
                h.write_u8(2);
                h.write_f64(*v);
            }
            Self::Int(v) => {
                h.write_u8(3);
                h.write_i32(*v);
            }
            Self::Boolean(v) => {
                h.write_u8(4);
                h.write_bool(*v);
            }
            Self::ShaderVar(loc) => {
                h.write_u8(5);
                hash_location(loc, h);
            }
            Self::ShaderVarValue(loc, kind) => {
                h.write_u8(6);
                h.write_u8(kind.tag());
                hash_location(loc, h);
            }
        }
    }
}

fn hash_location(loc: &SvLocation, h: &mut StableHasher) {
    h.write_u32(loc.name.0);
    h.write_u32(u32::try_from(loc.indices.len()).unwrap_or(u32::MAX));
    for &i in &loc.indices {
        h.write_bytes(&(i as u64).to_le_bytes());
    }
}

impl PartialEq for CondOperand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Operation(a), Self::Operation(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::ShaderVar(a), Self::ShaderVar(b)) => a == b,
            (Self::ShaderVarValue(a, ka), Self::ShaderVarValue(b, kb)) => ka == kb && a == b,
            _ => false,
        }
    }
}

// Float operands come from parsed literals and constants, never NaN.
impl Eq for CondOperand {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Operator {
    And,
    Or,
    Equal,
    NotEqual,
    Lesser,
    LesserEqual,
}

impl Operator {
    pub(crate) fn is_commutative(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Equal | Self::NotEqual)
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Lesser => "<",
            Self::LesserEqual => "<=",
        }
    }

    fn tag(self) -> u8 {
        self as u8
    }
}

/// A normalized binary condition.
#[derive(Debug, Clone)]
pub(crate) struct CondOperation {
    pub(crate) op: Operator,
    pub(crate) left: CondOperand,
    pub(crate) right: CondOperand,
}

impl CondOperation {
    pub(crate) fn new(op: Operator, left: CondOperand, right: CondOperand) -> Self {
        Self { op, left, right }
    }

    fn ordered_hash(&self, l: &CondOperand, r: &CondOperand) -> u64 {
        let mut h = StableHasher::new();
        h.write_u8(self.op.tag());
        l.stable_hash(&mut h);
        r.stable_hash(&mut h);
        h.finish()
    }

    /// Order-insensitive for commutative operators.
    pub(crate) fn stable_hash(&self) -> u64 {
        let lr = self.ordered_hash(&self.left, &self.right);
        if !self.op.is_commutative() {
            return lr;
        }
        // Equal operands cancel out in the xor; the operator goes in after it.
        let mut h = StableHasher::new();
        h.write_u8(self.op.tag());
        h.write_u64(lr ^ self.ordered_hash(&self.right, &self.left));
        h.finish()
    }
}

impl PartialEq for CondOperation {
    fn eq(&self, other: &Self) -> bool {
        if self.op != other.op {
            return false;
        }
        (self.left == other.left && self.right == other.right)
            || (self.op.is_commutative() && self.left == other.right && self.right == other.left)
    }
}

impl Eq for CondOperation {}

impl Hash for CondOperation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.stable_hash());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(name: u32) -> CondOperand {
        CondOperand::ShaderVarValue(
            SvLocation {
                name: InternId(name),
                indices: SmallVec::new(),
                buffer: None,
            },
            ValueKind::Int,
        )
    }

    #[test]
    fn commutative_operations_hash_and_compare_equal() {
        let a = CondOperation::new(Operator::Equal, sv(0), CondOperand::Int(1));
        let b = CondOperation::new(Operator::Equal, CondOperand::Int(1), sv(0));
        assert_eq!(a, b);
        assert_eq!(a.stable_hash(), b.stable_hash());
    }

    #[test]
    fn operations_on_equal_operands_keep_their_operator() {
        let hashes: Vec<u64> = [Operator::And, Operator::Or, Operator::Equal, Operator::NotEqual]
            .into_iter()
            .map(|op| CondOperation::new(op, sv(2), sv(2)).stable_hash())
            .collect();
        for (i, a) in hashes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn ordered_operations_stay_distinct() {
        let a = CondOperation::new(Operator::Lesser, sv(0), CondOperand::Int(1));
        let b = CondOperation::new(Operator::Lesser, CondOperand::Int(1), sv(0));
        assert_ne!(a, b);
        assert_ne!(a.stable_hash(), b.stable_hash());
    }

    #[test]
    fn type_compatibility() {
        use OperandType::*;
        assert!(Float.compatible(SvInt));
        assert!(Int.compatible(SvX));
        assert!(Boolean.compatible(Operation));
        assert!(SvTexture.compatible(Boolean));
        assert!(!Sv.compatible(Int));
        assert!(!None.compatible(None));
        assert_eq!(SvW.description(), "shadervar vector w value");
    }

    #[test]
    fn location_equality_ignores_buffer() {
        let a = SvLocation {
            name: InternId(3),
            indices: SmallVec::from_slice(&[1]),
            buffer: Some(RenderBufferName::Normal),
        };
        let mut b = a.clone();
        b.buffer = None;
        assert_eq!(a, b);
        b.indices.push(2);
        assert_ne!(a, b);
    }
}
