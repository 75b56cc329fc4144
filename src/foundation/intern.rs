use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct InternId(pub(crate) u32);

/// Shader-variable names referenced by conditions, interned once per evaluator.
#[derive(Debug, Default, Clone)]
pub(crate) struct StringInterner {
    ids_by_str: HashMap<String, InternId>,
    strs_by_id: Vec<String>,
}

impl StringInterner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn intern(&mut self, s: &str) -> InternId {
        if let Some(&id) = self.ids_by_str.get(s) {
            return id;
        }
        let id = InternId(u32::try_from(self.strs_by_id.len()).unwrap_or(u32::MAX));
        self.strs_by_id.push(s.to_owned());
        self.ids_by_str.insert(s.to_owned(), id);
        id
    }

    pub(crate) fn lookup(&self, s: &str) -> Option<InternId> {
        self.ids_by_str.get(s).copied()
    }

    pub(crate) fn get(&self, id: InternId) -> &str {
        self.strs_by_id
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut i = StringInterner::new();
        let a = i.intern("light count");
        let b = i.intern("light count");
        let c = i.intern("tex diffuse");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(i.get(c), "tex diffuse");
        assert_eq!(i.lookup("missing"), None);
    }
}
