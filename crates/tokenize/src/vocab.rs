//! Atom ↔ index tables.
//!
//! [`Vocabulary`] is the frozen, immutable bijection every tokenizer encodes
//! through. [`GrowableVocabulary`] is the append-only form used while a
//! discovery pass is still learning which atoms a corpus needs; it turns into
//! a [`Vocabulary`] through [`GrowableVocabulary::freeze`] and never back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenizerError};

/// Vocabulary index type. Encoded sequences are 32-bit non-negative integers.
pub type TokenId = u32;

fn check_atom(atom: &str) -> Result<()> {
    if atom.is_empty() {
        return Err(TokenizerError::Configuration(
            "vocabulary atoms must be non-empty".to_string(),
        ));
    }
    Ok(())
}

/// Frozen bijection between atoms and indices.
///
/// Indices need not be contiguous. The decoder is derived once at
/// construction and is always the strict inverse of the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(String, TokenId)>", into = "Vec<(String, TokenId)>")]
pub struct Vocabulary {
    encoder: HashMap<String, TokenId>,
    decoder: HashMap<TokenId, String>,
}

impl Vocabulary {
    /// Build a vocabulary from explicit `(atom, index)` pairs.
    ///
    /// Fails with [`TokenizerError::DuplicateAtom`] or
    /// [`TokenizerError::DuplicateIndex`] if either side repeats.
    pub fn new<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, TokenId)>,
        S: Into<String>,
    {
        let mut encoder = HashMap::new();
        let mut decoder = HashMap::new();
        for (atom, index) in pairs {
            let atom = atom.into();
            check_atom(&atom)?;
            if encoder.contains_key(&atom) {
                return Err(TokenizerError::DuplicateAtom(atom));
            }
            if decoder.contains_key(&index) {
                return Err(TokenizerError::DuplicateIndex(index));
            }
            encoder.insert(atom.clone(), index);
            decoder.insert(index, atom);
        }
        Ok(Self { encoder, decoder })
    }

    /// Build a vocabulary assigning indices `0..n` in iteration order.
    pub fn from_atoms<I, S>(atoms: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next: TokenId = 0;
        let mut pairs = Vec::new();
        for atom in atoms {
            pairs.push((atom.into(), next));
            next = next
                .checked_add(1)
                .ok_or_else(|| TokenizerError::Configuration("vocabulary too large".to_string()))?;
        }
        Self::new(pairs)
    }

    /// Number of atoms.
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    /// True if the vocabulary holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    /// Index of `atom`, if present.
    pub fn index(&self, atom: &str) -> Option<TokenId> {
        self.encoder.get(atom).copied()
    }

    /// Atom stored at `index`, if any.
    pub fn atom(&self, index: TokenId) -> Option<&str> {
        self.decoder.get(&index).map(String::as_str)
    }

    /// Whether `atom` is part of the vocabulary.
    pub fn contains(&self, atom: &str) -> bool {
        self.encoder.contains_key(atom)
    }

    /// Index of `atom`, or [`TokenizerError::OutOfVocabulary`].
    pub fn encode_atom(&self, atom: &str) -> Result<TokenId> {
        self.index(atom)
            .ok_or_else(|| TokenizerError::OutOfVocabulary(atom.to_string()))
    }

    /// Atom at `index`, or [`TokenizerError::DecodeKeyMissing`].
    pub fn decode_index(&self, index: TokenId) -> Result<&str> {
        self.atom(index).ok_or(TokenizerError::DecodeKeyMissing(index))
    }

    /// All atoms, sorted.
    pub fn atoms(&self) -> Vec<&str> {
        let mut atoms: Vec<&str> = self.encoder.keys().map(String::as_str).collect();
        atoms.sort_unstable();
        atoms
    }

    /// All indices, sorted.
    pub fn indices(&self) -> Vec<TokenId> {
        let mut indices: Vec<TokenId> = self.decoder.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// `(atom, index)` pairs in index order.
    pub fn entries(&self) -> Vec<(&str, TokenId)> {
        let mut entries: Vec<(&str, TokenId)> = self
            .encoder
            .iter()
            .map(|(atom, &index)| (atom.as_str(), index))
            .collect();
        entries.sort_unstable_by_key(|&(_, index)| index);
        entries
    }

    /// Largest index in use.
    pub fn max_index(&self) -> Option<TokenId> {
        self.decoder.keys().copied().max()
    }
}

impl TryFrom<Vec<(String, TokenId)>> for Vocabulary {
    type Error = TokenizerError;

    fn try_from(pairs: Vec<(String, TokenId)>) -> Result<Self> {
        Self::new(pairs)
    }
}

impl From<Vocabulary> for Vec<(String, TokenId)> {
    fn from(vocab: Vocabulary) -> Self {
        let mut pairs: Vec<(String, TokenId)> = vocab.encoder.into_iter().collect();
        pairs.sort_unstable_by_key(|&(_, index)| index);
        pairs
    }
}

/// Append-only vocabulary used during discovery.
///
/// Atoms live in an arena in insertion order; new atoms receive
/// `max index + 1`, so allocation is monotonic.
#[derive(Debug, Clone, Default)]
pub struct GrowableVocabulary {
    arena: Vec<(String, TokenId)>,
    lookup: HashMap<String, usize>,
    next: TokenId,
}

impl GrowableVocabulary {
    /// Seed a growable vocabulary from `(atom, index)` pairs, with the same
    /// uniqueness checks as [`Vocabulary::new`].
    pub fn new<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, TokenId)>,
        S: Into<String>,
    {
        let seed = Vocabulary::new(pairs)?;
        let next = seed.max_index().map_or(0, |max| max.saturating_add(1));
        let mut arena = Vec::with_capacity(seed.len());
        let mut lookup = HashMap::with_capacity(seed.len());
        for (atom, index) in Vec::<(String, TokenId)>::from(seed) {
            lookup.insert(atom.clone(), arena.len());
            arena.push((atom, index));
        }
        Ok(Self { arena, lookup, next })
    }

    /// Number of atoms currently held.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// True if no atom has been added yet.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Index of `atom`, if present.
    pub fn index(&self, atom: &str) -> Option<TokenId> {
        self.lookup
            .get(atom)
            .and_then(|&slot| self.arena.get(slot))
            .map(|&(_, index)| index)
    }

    /// Atom strings in insertion order.
    pub fn atoms(&self) -> impl Iterator<Item = &str> {
        self.arena.iter().map(|(atom, _)| atom.as_str())
    }

    /// Index of `atom`, allocating a fresh one if it is not present yet.
    pub fn get_or_insert(&mut self, atom: &str) -> Result<TokenId> {
        if let Some(index) = self.index(atom) {
            return Ok(index);
        }
        check_atom(atom)?;
        let index = self.next;
        self.next = index
            .checked_add(1)
            .ok_or_else(|| TokenizerError::Configuration("vocabulary too large".to_string()))?;
        self.lookup.insert(atom.to_string(), self.arena.len());
        self.arena.push((atom.to_string(), index));
        Ok(index)
    }

    /// One-way transition to an immutable [`Vocabulary`].
    pub fn freeze(self) -> Result<Vocabulary> {
        Vocabulary::new(self.arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_atom_rejected() {
        let err = Vocabulary::new([("a", 0), ("a", 1)]).unwrap_err();
        assert!(matches!(err, TokenizerError::DuplicateAtom(ref a) if a == "a"));
        assert!(err.is_integrity());
    }

    #[test]
    fn duplicate_index_rejected() {
        let err = Vocabulary::new([("a", 0), ("b", 0)]).unwrap_err();
        assert!(matches!(err, TokenizerError::DuplicateIndex(0)));
    }

    #[test]
    fn empty_atom_rejected() {
        assert!(Vocabulary::new([("", 0)]).is_err());
    }

    #[test]
    fn decoder_is_inverse() {
        let vocab = Vocabulary::new([("a", 3), ("bc", 7), ("d", 1)]).unwrap();
        for (atom, index) in vocab.entries() {
            assert_eq!(vocab.atom(index), Some(atom));
            assert_eq!(vocab.index(atom), Some(index));
        }
        assert_eq!(vocab.indices(), vec![1, 3, 7]);
        assert_eq!(vocab.atoms(), vec!["a", "bc", "d"]);
        assert_eq!(vocab.max_index(), Some(7));
    }

    #[test]
    fn oov_and_missing_key() {
        let vocab = Vocabulary::from_atoms(["x"]).unwrap();
        assert!(matches!(vocab.encode_atom("y"), Err(TokenizerError::OutOfVocabulary(_))));
        assert!(matches!(vocab.decode_index(9), Err(TokenizerError::DecodeKeyMissing(9))));
    }

    #[test]
    fn growable_allocates_after_max() {
        let mut grow = GrowableVocabulary::new([("int", 0), ("x", 5)]).unwrap();
        assert_eq!(grow.get_or_insert("x").unwrap(), 5);
        assert_eq!(grow.get_or_insert("y").unwrap(), 6);
        assert_eq!(grow.get_or_insert("z").unwrap(), 7);
        assert_eq!(grow.get_or_insert("y").unwrap(), 6);
        let frozen = grow.freeze().unwrap();
        assert_eq!(frozen.len(), 4);
        assert_eq!(frozen.index("z"), Some(7));
    }

    #[test]
    fn serde_revalidates() {
        let vocab = Vocabulary::new([("a", 0), ("b", 1)]).unwrap();
        let bytes = bincode::serialize(&vocab).unwrap();
        let back: Vocabulary = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, vocab);

        let corrupt: Vec<(String, TokenId)> = vec![("a".into(), 0), ("b".into(), 0)];
        let bytes = bincode::serialize(&corrupt).unwrap();
        assert!(bincode::deserialize::<Vocabulary>(&bytes).is_err());
    }
}

#[cfg(test)]
mod quickcheck_tests {
    use super::*;
    use quickcheck::quickcheck;
    use std::collections::HashSet;

    quickcheck! {
        fn from_atoms_is_bijective(atoms: Vec<String>) -> bool {
            let unique: Vec<String> = atoms
                .into_iter()
                .filter(|a| !a.is_empty())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let vocab = match Vocabulary::from_atoms(unique.clone()) {
                Ok(v) => v,
                Err(_) => return false,
            };
            let indices: HashSet<TokenId> = vocab.indices().into_iter().collect();
            vocab.len() == unique.len()
                && indices.len() == unique.len()
                && unique.iter().all(|a| vocab.index(a).and_then(|i| vocab.atom(i)) == Some(a.as_str()))
        }
    }
}
