//! Greedy longest-match multi-character tokenizer.
//!
//! Built in two phases. [`GrowableWordTokenizer`] segments the corpus over
//! the full candidate set and appends any unseen character to its vocabulary.
//! [`GrowableWordTokenizer::freeze`] then keeps only the atoms the corpus
//! actually used, re-indexed (meta atoms first, the rest sorted), as an
//! immutable [`WordTokenizer`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contract::{Tokenizer, TokenizerCore};
use crate::error::{Result, TokenizerError};
use crate::meta::MetaTokens;
use crate::vocab::{GrowableVocabulary, TokenId, Vocabulary};

/// First character → multi-character atoms starting with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTable {
    by_first: BTreeMap<char, Vec<String>>,
}

impl LookupTable {
    /// Index every atom longer than one character by its first character.
    pub fn build<'a>(atoms: impl IntoIterator<Item = &'a str>) -> Self {
        let mut by_first: BTreeMap<char, Vec<String>> = BTreeMap::new();
        for atom in atoms {
            let mut chars = atom.chars();
            if let (Some(first), Some(_)) = (chars.next(), chars.next()) {
                by_first.entry(first).or_default().push(atom.to_string());
            }
        }
        for candidates in by_first.values_mut() {
            candidates.sort_unstable();
            candidates.dedup();
        }
        Self { by_first }
    }

    /// Multi-character atoms starting with `first`.
    pub fn candidates(&self, first: char) -> Option<&[String]> {
        self.by_first.get(&first).map(Vec::as_slice)
    }
}

fn window<'t>(text: &'t str, bounds: &[usize], i: usize, j: usize) -> Option<&'t str> {
    text.get(*bounds.get(i)?..*bounds.get(j)?)
}

/// Greedy segmentation of `text`.
///
/// At every position the window grows one character at a time while some
/// candidate still has it as a prefix, then shrinks until it equals a
/// candidate. Without a multi-character match the single character is the
/// piece. Pieces borrow from `text`.
pub fn segment<'t>(text: &'t str, lookup: &LookupTable) -> Vec<&'t str> {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(pos, _)| pos)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len().saturating_sub(1);

    let mut pieces = Vec::new();
    let mut i = 0;
    while i < n {
        let Some(single) = window(text, &bounds, i, i + 1) else {
            break;
        };
        let matched = single
            .chars()
            .next()
            .and_then(|first| lookup.candidates(first))
            .and_then(|candidates| {
                let mut j = i + 1;
                while j < n
                    && window(text, &bounds, i, j + 1)
                        .is_some_and(|w| candidates.iter().any(|c| c.starts_with(w)))
                {
                    j += 1;
                }
                while j > i + 1 {
                    if let Some(w) = window(text, &bounds, i, j) {
                        if candidates.iter().any(|c| c == w) {
                            return Some((w, j));
                        }
                    }
                    j -= 1;
                }
                None
            });
        match matched {
            Some((piece, end)) => {
                pieces.push(piece);
                i = end;
            }
            None => {
                pieces.push(single);
                i += 1;
            }
        }
    }
    pieces
}

/// Discovery-phase word tokenizer. Unknown characters are appended to the
/// vocabulary with fresh indices instead of failing.
#[derive(Debug, Clone)]
pub struct GrowableWordTokenizer {
    vocab: GrowableVocabulary,
    meta: MetaTokens,
    lookup: LookupTable,
    observed: BTreeSet<String>,
}

impl GrowableWordTokenizer {
    /// Candidate atoms plus meta atoms, indexed in sorted order.
    pub fn new<I, S>(candidates: I, meta: MetaTokens) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut atoms: BTreeSet<String> = candidates.into_iter().map(Into::into).collect();
        atoms.extend(meta.atoms().map(str::to_string));
        let vocab = GrowableVocabulary::new(atoms.into_iter().zip(0..))?;
        let lookup = LookupTable::build(vocab.atoms());
        Ok(Self {
            vocab,
            meta,
            lookup,
            observed: BTreeSet::new(),
        })
    }

    /// Segment `text`, growing the vocabulary with unseen characters.
    pub fn encode(&mut self, text: &str) -> Result<Vec<TokenId>> {
        let pieces = segment(text, &self.lookup);
        let mut ids = Vec::with_capacity(pieces.len());
        for piece in pieces {
            // Only single characters can be new; they never enter the lookup table.
            ids.push(self.vocab.get_or_insert(piece)?);
            if !self.observed.contains(piece) {
                self.observed.insert(piece.to_string());
            }
        }
        Ok(ids)
    }

    /// Segment `text` into atoms, growing the vocabulary as [`Self::encode`] does.
    pub fn atomize(&mut self, text: &str) -> Result<Vec<String>> {
        let pieces: Vec<String> = segment(text, &self.lookup)
            .into_iter()
            .map(str::to_string)
            .collect();
        for piece in &pieces {
            self.vocab.get_or_insert(piece)?;
            self.observed.insert(piece.clone());
        }
        Ok(pieces)
    }

    /// Current vocabulary size, including grown characters.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Index currently assigned to `atom`.
    pub fn index(&self, atom: &str) -> Option<TokenId> {
        self.vocab.index(atom)
    }

    /// Freeze into a [`WordTokenizer`] whose vocabulary is the meta atoms
    /// followed by every observed atom, sorted.
    pub fn freeze(self) -> Result<WordTokenizer> {
        let meta = self.meta;
        let used = self
            .observed
            .into_iter()
            .filter(|atom| !meta.contains_atom(atom));
        let atoms: Vec<String> = meta.atoms().map(str::to_string).chain(used).collect();
        WordTokenizer::new(Vocabulary::from_atoms(atoms)?, meta)
    }
}

/// Frozen greedy word tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTokenizer {
    core: TokenizerCore,
    lookup: LookupTable,
}

impl WordTokenizer {
    /// Wrap an existing vocabulary and derive its lookup table.
    pub fn new(vocab: Vocabulary, meta: MetaTokens) -> Result<Self> {
        let lookup = LookupTable::build(vocab.atoms());
        Ok(Self {
            core: TokenizerCore::new(vocab, meta)?,
            lookup,
        })
    }

    /// Two-phase construction from a corpus and a candidate atom set.
    ///
    /// Fails with a configuration error when `candidates` is empty or
    /// `wordpiece` is requested.
    pub fn from_text<I, S>(text: &str, candidates: I, mask_tokens: bool, wordpiece: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if wordpiece {
            return Err(TokenizerError::Configuration(
                "wordpiece tokenization is not supported".to_string(),
            ));
        }
        let candidates: Vec<String> = candidates.into_iter().map(Into::into).collect();
        if candidates.is_empty() {
            return Err(TokenizerError::Configuration("no tokens specified".to_string()));
        }

        let mut discovery = GrowableWordTokenizer::new(candidates, MetaTokens::masking(mask_tokens))?;
        let seeded = discovery.vocab_size();
        discovery.encode(text)?;
        tracing::debug!(
            seeded,
            grown = discovery.vocab_size() - seeded,
            "word discovery pass finished"
        );

        let tokenizer = discovery.freeze()?;
        tracing::info!(
            vocab_size = tokenizer.vocab_size(),
            mask_tokens,
            "built word tokenizer"
        );
        Ok(tokenizer)
    }

    /// The first-character lookup table.
    pub fn lookup(&self) -> &LookupTable {
        &self.lookup
    }
}

impl Tokenizer for WordTokenizer {
    fn core(&self) -> &TokenizerCore {
        &self.core
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        segment(text, &self.lookup)
            .into_iter()
            .map(|piece| self.vocab().encode_atom(piece))
            .collect()
    }
}

impl fmt::Display for WordTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WordTokenizer[{} tokens]", self.vocab_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<&'static str> {
        vec!["int", "in", "i", "x"]
    }

    #[test]
    fn segment_prefers_longest_match() {
        let lookup = LookupTable::build(candidates());
        assert_eq!(segment("intx", &lookup), vec!["int", "x"]);
        assert_eq!(segment("inx", &lookup), vec!["in", "x"]);
        assert_eq!(segment("ix", &lookup), vec!["i", "x"]);
        assert_eq!(segment("", &lookup), Vec::<&str>::new());
    }

    #[test]
    fn segment_backs_off_after_failed_extension() {
        let lookup = LookupTable::build(["for", "float"]);
        assert_eq!(segment("fort", &lookup), vec!["for", "t"]);
        assert_eq!(segment("flo", &lookup), vec!["f", "l", "o"]);
    }

    #[test]
    fn segment_handles_multibyte_text() {
        let lookup = LookupTable::build(["é=", "=="]);
        assert_eq!(segment("é==é", &lookup), vec!["é=", "=", "é"]);
    }

    #[test]
    fn intx_two_phase() {
        let tok = WordTokenizer::from_text("intx", candidates(), false, false).unwrap();
        assert_eq!(tok.vocab_size(), 2);
        assert_eq!(tok.vocab().index("int"), Some(0));
        assert_eq!(tok.vocab().index("x"), Some(1));
        assert_eq!(tok.encode("intx").unwrap(), vec![0, 1]);
        assert_eq!(tok.atomize("intx").unwrap(), vec!["int", "x"]);
        assert_eq!(tok.to_string(), "WordTokenizer[2 tokens]");
    }

    #[test]
    fn discovery_grows_with_unseen_characters() {
        let mut grow = GrowableWordTokenizer::new(candidates(), MetaTokens::none()).unwrap();
        assert_eq!(grow.vocab_size(), 4);
        let ids = grow.encode("int y;").unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(grow.vocab_size(), 7);
        // seeded atoms take 0..4, new characters follow in encounter order
        assert_eq!(grow.index(" "), Some(4));
        assert_eq!(grow.index("y"), Some(5));
        assert_eq!(grow.index(";"), Some(6));
    }

    #[test]
    fn frozen_rejects_unseen_characters() {
        let tok = WordTokenizer::from_text("intx", candidates(), false, false).unwrap();
        let err = tok.encode("inty").unwrap_err();
        assert!(matches!(err, TokenizerError::OutOfVocabulary(_)));
        // "in" was a candidate but never used by the corpus
        assert!(tok.encode("in").is_err());
    }

    #[test]
    fn meta_tokens_first_then_sorted() {
        let tok = WordTokenizer::from_text("x int [MASK]", candidates(), true, false).unwrap();
        assert_eq!(tok.vocab().index("[START]"), Some(0));
        assert_eq!(tok.vocab().index("[ENDHOLE]"), Some(5));
        let rest: Vec<&str> = tok
            .vocab()
            .entries()
            .into_iter()
            .skip(6)
            .map(|(atom, _)| atom)
            .collect();
        assert_eq!(rest, vec![" ", "int", "x"]);
        let ids = tok.encode("int [MASK]").unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(tok.to_source_code(&ids, false).unwrap(), "int ");
    }

    #[test]
    fn configuration_errors() {
        assert!(matches!(
            WordTokenizer::from_text("x", Vec::<String>::new(), false, false),
            Err(TokenizerError::Configuration(_))
        ));
        assert!(matches!(
            WordTokenizer::from_text("x", candidates(), false, true),
            Err(TokenizerError::Configuration(_))
        ));
    }

    #[test]
    fn persist_roundtrip() {
        let tok = WordTokenizer::from_text("int x = in;", candidates(), true, false).unwrap();
        let back = WordTokenizer::load(&tok.persist().unwrap()).unwrap();
        assert_eq!(back, tok);
        assert_eq!(back.lookup(), tok.lookup());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    const KEYWORDS: [&str; 8] = ["int", "in", "if", "for", "float", "==", "<=", "return"];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_phase_equivalence(text in "[a-z=<; ]{0,60}", mask in any::<bool>()) {
            let mut grow = GrowableWordTokenizer::new(KEYWORDS, MetaTokens::masking(mask)).unwrap();
            let phase1 = grow.atomize(&text).unwrap();
            let frozen = grow.freeze().unwrap();
            prop_assert_eq!(frozen.atomize(&text).unwrap(), phase1);
        }

        #[test]
        fn prop_roundtrip(text in "[a-z=<;\n ]{1,60}") {
            let tok = WordTokenizer::from_text(&text, KEYWORDS, false, false).unwrap();
            let ids = tok.encode(&text).unwrap();
            prop_assert_eq!(tok.decode(&ids, None, false).unwrap(), text);
        }

        #[test]
        fn prop_unique_indices(text in "[a-z ]{1,40}") {
            let tok = WordTokenizer::from_text(&text, KEYWORDS, true, false).unwrap();
            let indices = tok.vocab().indices();
            let mut dedup = indices.clone();
            dedup.dedup();
            prop_assert_eq!(indices.len(), tok.vocab_size());
            prop_assert_eq!(dedup.len(), tok.vocab_size());
        }
    }
}
