//! Meta tokens: reserved boundary/control atoms.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed roles a meta token can play, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaRole {
    /// Start of a sequence
    Start,
    /// End of a sequence
    End,
    /// Padding
    Pad,
    /// Masked atom
    Mask,
    /// Start of a hole
    Hole,
    /// End of a hole
    EndHole,
}

impl MetaRole {
    /// All roles in declaration order.
    pub const ALL: [MetaRole; 6] = [
        MetaRole::Start,
        MetaRole::End,
        MetaRole::Pad,
        MetaRole::Mask,
        MetaRole::Hole,
        MetaRole::EndHole,
    ];

    /// Literal atom used when masking is enabled.
    pub fn default_atom(self) -> &'static str {
        match self {
            MetaRole::Start => "[START]",
            MetaRole::End => "[END]",
            MetaRole::Pad => "[PAD]",
            MetaRole::Mask => "[MASK]",
            MetaRole::Hole => "[HOLE]",
            MetaRole::EndHole => "[ENDHOLE]",
        }
    }

    fn slot(self) -> usize {
        match self {
            MetaRole::Start => 0,
            MetaRole::End => 1,
            MetaRole::Pad => 2,
            MetaRole::Mask => 3,
            MetaRole::Hole => 4,
            MetaRole::EndHole => 5,
        }
    }
}

impl fmt::Display for MetaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetaRole::Start => "start",
            MetaRole::End => "end",
            MetaRole::Pad => "pad",
            MetaRole::Mask => "mask",
            MetaRole::Hole => "hole",
            MetaRole::EndHole => "end-of-hole",
        };
        f.write_str(name)
    }
}

/// Role → atom record. Every slot is optional; an empty set means masking
/// is disabled for the tokenizer owning it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTokens {
    atoms: [Option<String>; 6],
}

impl MetaTokens {
    /// No meta tokens.
    pub fn none() -> Self {
        Self::default()
    }

    /// All six roles with their default atoms (`[START]`, `[END]`, ...).
    pub fn standard() -> Self {
        let mut meta = Self::none();
        for role in MetaRole::ALL {
            meta = meta.with(role, role.default_atom());
        }
        meta
    }

    /// `standard()` when `enabled`, `none()` otherwise.
    pub fn masking(enabled: bool) -> Self {
        if enabled {
            Self::standard()
        } else {
            Self::none()
        }
    }

    /// Set the atom for `role`.
    pub fn with(mut self, role: MetaRole, atom: impl Into<String>) -> Self {
        if let Some(slot) = self.atoms.get_mut(role.slot()) {
            *slot = Some(atom.into());
        }
        self
    }

    /// Atom for `role`, if configured.
    pub fn get(&self, role: MetaRole) -> Option<&str> {
        self.atoms.get(role.slot()).and_then(|a| a.as_deref())
    }

    /// Configured `(role, atom)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (MetaRole, &str)> + '_ {
        MetaRole::ALL
            .into_iter()
            .filter_map(move |role| self.get(role).map(|atom| (role, atom)))
    }

    /// Configured atoms in declaration order.
    pub fn atoms(&self) -> impl Iterator<Item = &str> + '_ {
        self.iter().map(|(_, atom)| atom)
    }

    /// True if no role is configured.
    pub fn is_empty(&self) -> bool {
        self.atoms.iter().all(Option::is_none)
    }

    /// Whether `atom` is one of the configured meta atoms.
    pub fn contains_atom(&self, atom: &str) -> bool {
        self.atoms().any(|a| a == atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_declaration_order() {
        let meta = MetaTokens::standard();
        let atoms: Vec<&str> = meta.atoms().collect();
        assert_eq!(
            atoms,
            vec!["[START]", "[END]", "[PAD]", "[MASK]", "[HOLE]", "[ENDHOLE]"]
        );
        assert!(meta.contains_atom("[MASK]"));
        assert!(!meta.contains_atom("MASK"));
    }

    #[test]
    fn partial_set() {
        let meta = MetaTokens::none()
            .with(MetaRole::End, "[END]")
            .with(MetaRole::Start, "[START]");
        let roles: Vec<MetaRole> = meta.iter().map(|(r, _)| r).collect();
        assert_eq!(roles, vec![MetaRole::Start, MetaRole::End]);
        assert_eq!(meta.get(MetaRole::Pad), None);
        assert!(MetaTokens::masking(false).is_empty());
    }
}
