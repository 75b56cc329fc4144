use std::ops::Not;

/// Three-valued (Kleene) truth value used while checking conditions against value sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Logic3 {
    Truth,
    Lie,
    #[default]
    Uncertain,
}

impl Logic3 {
    pub fn from_bool(v: bool) -> Self {
        if v { Self::Truth } else { Self::Lie }
    }

    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Lie, _) | (_, Self::Lie) => Self::Lie,
            (Self::Truth, Self::Truth) => Self::Truth,
            _ => Self::Uncertain,
        }
    }

    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Truth, _) | (_, Self::Truth) => Self::Truth,
            (Self::Lie, Self::Lie) => Self::Lie,
            _ => Self::Uncertain,
        }
    }

    pub fn is_certain(self) -> bool {
        self != Self::Uncertain
    }
}

impl Not for Logic3 {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Truth => Self::Lie,
            Self::Lie => Self::Truth,
            Self::Uncertain => Self::Uncertain,
        }
    }
}

impl std::fmt::Display for Logic3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Truth => "true",
            Self::Lie => "false",
            Self::Uncertain => "uncertain",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kleene_tables() {
        use Logic3::*;
        assert_eq!(Truth.and(Uncertain), Uncertain);
        assert_eq!(Lie.and(Uncertain), Lie);
        assert_eq!(Truth.or(Uncertain), Truth);
        assert_eq!(Lie.or(Uncertain), Uncertain);
        assert_eq!(!Uncertain, Uncertain);
        assert_eq!(!Truth, Lie);
    }
}
