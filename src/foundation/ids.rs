use serde::{Deserialize, Serialize};

/// Interned condition handle, or one of the two constant sentinels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConditionId(pub(crate) u32);

impl ConditionId {
    /// Condition that holds for every render state.
    pub const ALWAYS_TRUE: ConditionId = ConditionId(u32::MAX - 1);
    /// Condition that never holds.
    pub const ALWAYS_FALSE: ConditionId = ConditionId(u32::MAX);

    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX - 2))
    }

    pub fn is_sentinel(self) -> bool {
        self == Self::ALWAYS_TRUE || self == Self::ALWAYS_FALSE
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ConditionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::ALWAYS_TRUE => f.write_str("\"always true\""),
            Self::ALWAYS_FALSE => f.write_str("\"always false\""),
            Self(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeIdx(pub(crate) u32);

impl NodeIdx {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}
