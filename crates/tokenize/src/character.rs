//! Character-level tokenizer: one atom per character.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contract::{Tokenizer, TokenizerCore};
use crate::error::Result;
use crate::meta::MetaTokens;
use crate::vocab::{TokenId, Vocabulary};

/// Character tokenizer with a corpus-frequency ordered vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterTokenizer {
    core: TokenizerCore,
}

impl CharacterTokenizer {
    /// Wrap an existing vocabulary. Meta atoms must be part of `vocab`.
    pub fn new(vocab: Vocabulary, meta: MetaTokens) -> Result<Self> {
        Ok(Self {
            core: TokenizerCore::new(vocab, meta)?,
        })
    }

    /// Build the vocabulary from `text`: meta atoms first (when
    /// `mask_tokens`), then characters by descending frequency.
    ///
    /// Ties keep first-occurrence order; callers should not rely on it.
    pub fn from_text(text: &str, mask_tokens: bool) -> Result<Self> {
        let meta = MetaTokens::masking(mask_tokens);

        // char -> (first occurrence, count)
        let mut counts: HashMap<char, (usize, usize)> = HashMap::new();
        for (order, c) in text.chars().enumerate() {
            counts.entry(c).or_insert((order, 0)).1 += 1;
        }
        let mut by_freq: Vec<(char, (usize, usize))> = counts.into_iter().collect();
        by_freq.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then(a.1 .0.cmp(&b.1 .0)));

        let atoms = meta
            .atoms()
            .map(str::to_string)
            .chain(by_freq.into_iter().map(|(c, _)| c.to_string()));
        let vocab = Vocabulary::from_atoms(atoms)?;
        let tokenizer = Self::new(vocab, meta)?;
        tracing::info!(
            vocab_size = tokenizer.vocab_size(),
            mask_tokens,
            "built character tokenizer"
        );
        Ok(tokenizer)
    }

    fn encode_char(&self, c: char) -> Result<TokenId> {
        let mut buf = [0u8; 4];
        self.vocab().encode_atom(c.encode_utf8(&mut buf))
    }

    /// Meta atom written literally at byte offset `pos` of `text`, if any.
    fn meta_at<'t>(&'t self, text: &str, pos: usize) -> Option<&'t str> {
        let rest = text.get(pos..)?;
        self.meta_tokens().atoms().find(|atom| rest.starts_with(atom))
    }
}

impl Tokenizer for CharacterTokenizer {
    fn core(&self) -> &TokenizerCore {
        &self.core
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        if self.meta_tokens().is_empty() {
            return text.chars().map(|c| self.encode_char(c)).collect();
        }
        let mut ids = Vec::with_capacity(text.len());
        let mut chars = text.char_indices();
        while let Some((pos, c)) = chars.next() {
            if c == '[' {
                if let Some(atom) = self.meta_at(text, pos) {
                    ids.push(self.vocab().encode_atom(atom)?);
                    for _ in 1..atom.chars().count() {
                        chars.next();
                    }
                    continue;
                }
            }
            ids.push(self.encode_char(c)?);
        }
        Ok(ids)
    }
}

impl fmt::Display for CharacterTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharacterTokenizer[{} chars]", self.vocab_size())
    }
}
