//! The operations every tokenizer kind shares.
//!
//! A concrete tokenizer owns a [`TokenizerCore`] (frozen vocabulary, meta
//! tokens and the derived set of meta indices) and implements
//! [`Tokenizer::encode`]. Everything else on the read side (atomize, decode,
//! batched decode, source reconstruction, position lookup, persistence) has
//! a default built on those two pieces; kinds override where their decoding
//! differs.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenizerError};
use crate::meta::{MetaRole, MetaTokens};
use crate::persist;
use crate::vocab::{TokenId, Vocabulary};

/// Frozen vocabulary + meta tokens, with meta indices derived once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CoreParts", into = "CoreParts")]
pub struct TokenizerCore {
    vocab: Vocabulary,
    meta: MetaTokens,
    meta_values: BTreeSet<TokenId>,
}

#[derive(Serialize, Deserialize)]
struct CoreParts {
    vocab: Vocabulary,
    meta: MetaTokens,
}

impl TokenizerCore {
    /// Bind `meta` to `vocab`. Every configured meta atom must already be in
    /// the vocabulary.
    pub fn new(vocab: Vocabulary, meta: MetaTokens) -> Result<Self> {
        let mut meta_values = BTreeSet::new();
        for (role, atom) in meta.iter() {
            let index = vocab.index(atom).ok_or_else(|| {
                TokenizerError::Configuration(format!(
                    "{role} meta token {atom:?} missing from vocabulary"
                ))
            })?;
            meta_values.insert(index);
        }
        Ok(Self {
            vocab,
            meta,
            meta_values,
        })
    }

    /// The frozen vocabulary.
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// The meta token record.
    pub fn meta(&self) -> &MetaTokens {
        &self.meta
    }

    /// Indices of all configured meta atoms.
    pub fn meta_values(&self) -> &BTreeSet<TokenId> {
        &self.meta_values
    }

    /// Index of the atom playing `role`, if masking is enabled.
    pub fn meta_index(&self, role: MetaRole) -> Option<TokenId> {
        self.meta.get(role).and_then(|atom| self.vocab.index(atom))
    }
}

impl TryFrom<CoreParts> for TokenizerCore {
    type Error = TokenizerError;

    fn try_from(parts: CoreParts) -> Result<Self> {
        Self::new(parts.vocab, parts.meta)
    }
}

impl From<TokenizerCore> for CoreParts {
    fn from(core: TokenizerCore) -> Self {
        Self {
            vocab: core.vocab,
            meta: core.meta,
        }
    }
}

/// A single encoded sequence or an arbitrarily nested batch of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoded {
    /// One sequence of indices
    Sequence(Vec<TokenId>),
    /// One more level of nesting
    Batch(Vec<Encoded>),
}

impl From<Vec<TokenId>> for Encoded {
    fn from(ids: Vec<TokenId>) -> Self {
        Encoded::Sequence(ids)
    }
}

impl From<Vec<Vec<TokenId>>> for Encoded {
    fn from(batch: Vec<Vec<TokenId>>) -> Self {
        Encoded::Batch(batch.into_iter().map(Encoded::Sequence).collect())
    }
}

/// Decoded text mirroring the shape of an [`Encoded`] input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decoded {
    /// Text of one sequence
    Text(String),
    /// One more level of nesting
    Batch(Vec<Decoded>),
}

/// Tokenizer contract.
pub trait Tokenizer {
    /// Frozen state shared by every kind.
    fn core(&self) -> &TokenizerCore;

    /// Segment `text` and map every atom to its index.
    ///
    /// Fails with [`TokenizerError::OutOfVocabulary`] on the first atom the
    /// frozen vocabulary does not hold.
    fn encode(&self, text: &str) -> Result<Vec<TokenId>>;

    /// The frozen vocabulary.
    fn vocab(&self) -> &Vocabulary {
        self.core().vocab()
    }

    /// Number of atoms in the vocabulary.
    fn vocab_size(&self) -> usize {
        self.vocab().len()
    }

    /// The meta token record (empty when masking is disabled).
    fn meta_tokens(&self) -> &MetaTokens {
        self.core().meta()
    }

    /// Indices of the meta atoms.
    fn meta_token_values(&self) -> &BTreeSet<TokenId> {
        self.core().meta_values()
    }

    /// Split `text` into atoms without keeping the indices.
    fn atomize(&self, text: &str) -> Result<Vec<String>> {
        let vocab = self.vocab();
        self.encode(text)?
            .into_iter()
            .map(|id| vocab.decode_index(id).map(str::to_string))
            .collect()
    }

    /// Decode one sequence. `ignore_index` is dropped from the output.
    /// `pretty` only has an effect for kinds with a source formatter.
    fn decode(&self, ids: &[TokenId], ignore_index: Option<TokenId>, pretty: bool) -> Result<String> {
        let _ = pretty;
        let vocab = self.vocab();
        let mut out = String::new();
        for &id in ids {
            if Some(id) == ignore_index {
                continue;
            }
            out.push_str(vocab.decode_index(id)?);
        }
        Ok(out)
    }

    /// Decode a nested batch, one level at a time.
    fn decode_batch(
        &self,
        encoded: &Encoded,
        ignore_index: Option<TokenId>,
        pretty: bool,
    ) -> Result<Decoded> {
        match encoded {
            Encoded::Sequence(ids) => self.decode(ids, ignore_index, pretty).map(Decoded::Text),
            Encoded::Batch(items) => items
                .iter()
                .map(|item| self.decode_batch(item, ignore_index, pretty))
                .collect::<Result<Vec<_>>>()
                .map(Decoded::Batch),
        }
    }

    /// Decode after removing every meta index.
    fn to_source_code(&self, ids: &[TokenId], pretty: bool) -> Result<String> {
        let meta = self.meta_token_values();
        let code: Vec<TokenId> = ids.iter().copied().filter(|id| !meta.contains(id)).collect();
        self.decode(&code, None, pretty)
    }

    /// Join atoms after removing meta atoms, without going through indices.
    fn atoms_to_source_code(&self, atoms: &[String], pretty: bool) -> Result<String> {
        let _ = pretty;
        let meta = self.meta_tokens();
        Ok(atoms
            .iter()
            .filter(|atom| !meta.contains_atom(atom))
            .map(String::as_str)
            .collect())
    }

    /// Map 1-based `(line, column)` source positions to positions in `ids`.
    ///
    /// The returned iterator is lazy and yields at most one result per
    /// queried position; it stops early when the sequence runs out.
    fn locate_index_for_position<'a>(
        &'a self,
        ids: &'a [TokenId],
        positions: &'a [(usize, usize)],
    ) -> Result<LocatedIndices<'a>> {
        Ok(LocatedIndices::new(self.core(), ids, positions))
    }

    /// Serialize the full tokenizer state into one opaque blob.
    fn persist(&self) -> Result<Vec<u8>>
    where
        Self: Serialize + Sized,
    {
        persist::to_bytes(self)
    }

    /// Rebuild a tokenizer from a blob produced by [`Tokenizer::persist`].
    fn load(bytes: &[u8]) -> Result<Self>
    where
        Self: DeserializeOwned + Sized,
    {
        persist::from_bytes(bytes)
    }
}

/// Lazy walk of a decoded atom stream with a `(line, column)` cursor.
///
/// Produced by [`Tokenizer::locate_index_for_position`]. Each item is the
/// position in the encoded sequence whose atom first moves the cursor past
/// the queried column on the queried line.
#[derive(Debug)]
pub struct LocatedIndices<'a> {
    core: &'a TokenizerCore,
    ids: std::iter::Enumerate<std::slice::Iter<'a, TokenId>>,
    positions: std::slice::Iter<'a, (usize, usize)>,
    target: Option<(usize, usize)>,
    line: usize,
    column: usize,
}

impl<'a> LocatedIndices<'a> {
    fn new(core: &'a TokenizerCore, ids: &'a [TokenId], positions: &'a [(usize, usize)]) -> Self {
        let mut positions = positions.iter();
        let target = positions.next().copied();
        Self {
            core,
            ids: ids.iter().enumerate(),
            positions,
            target,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self, atom: &str) {
        if self.core.meta().contains_atom(atom) {
            return;
        }
        match atom {
            "\n\n" => {
                self.line += 2;
                self.column = 1;
            }
            "\n" => {
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += atom.chars().count(),
        }
    }
}

impl Iterator for LocatedIndices<'_> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let (line, column) = self.target?;
        let core = self.core;
        while let Some((position, &id)) = self.ids.next() {
            let atom = match core.vocab().decode_index(id) {
                Ok(atom) => atom,
                Err(err) => {
                    self.target = None;
                    return Some(Err(err));
                }
            };
            self.advance(atom);
            if self.line == line && self.column > column {
                self.target = self.positions.next().copied();
                return Some(Ok(position));
            }
        }
        self.target = None;
        None
    }
}
