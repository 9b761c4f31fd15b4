//! Build a tokenizer of the configured kind from a corpus.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::{default_workers, GrammarTokenizer};
use crate::character::CharacterTokenizer;
use crate::config::{TokenKind, TokenizerConfig};
use crate::contract::{LocatedIndices, Tokenizer, TokenizerCore};
use crate::error::Result;
use crate::grammar::{CLikeGrammar, Grammar};
use crate::persist;
use crate::vocab::TokenId;
use crate::word::WordTokenizer;

/// A frozen tokenizer of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyTokenizer {
    /// Character-level
    Character(CharacterTokenizer),
    /// Greedy word-level
    Word(WordTokenizer),
    /// Grammar-level
    Grammar(GrammarTokenizer),
}

macro_rules! dispatch {
    ($self:ident, $tok:ident => $body:expr) => {
        match $self {
            AnyTokenizer::Character($tok) => $body,
            AnyTokenizer::Word($tok) => $body,
            AnyTokenizer::Grammar($tok) => $body,
        }
    };
}

impl AnyTokenizer {
    /// Kind of the wrapped tokenizer.
    pub fn kind(&self) -> TokenKind {
        match self {
            AnyTokenizer::Character(_) => TokenKind::Character,
            AnyTokenizer::Word(_) => TokenKind::Word,
            AnyTokenizer::Grammar(_) => TokenKind::Grammar,
        }
    }

    /// Persist to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persist::save(self, path)
    }

    /// Load a tokenizer persisted with [`AnyTokenizer::save`].
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        persist::load(path)
    }
}

impl Tokenizer for AnyTokenizer {
    fn core(&self) -> &TokenizerCore {
        dispatch!(self, tok => tok.core())
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        dispatch!(self, tok => tok.encode(text))
    }

    fn atomize(&self, text: &str) -> Result<Vec<String>> {
        dispatch!(self, tok => tok.atomize(text))
    }

    fn decode(&self, ids: &[TokenId], ignore_index: Option<TokenId>, pretty: bool) -> Result<String> {
        dispatch!(self, tok => tok.decode(ids, ignore_index, pretty))
    }

    fn atoms_to_source_code(&self, atoms: &[String], pretty: bool) -> Result<String> {
        dispatch!(self, tok => tok.atoms_to_source_code(atoms, pretty))
    }

    fn locate_index_for_position<'a>(
        &'a self,
        ids: &'a [TokenId],
        positions: &'a [(usize, usize)],
    ) -> Result<LocatedIndices<'a>> {
        dispatch!(self, tok => tok.locate_index_for_position(ids, positions))
    }
}

impl fmt::Display for AnyTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, tok => fmt::Display::fmt(tok, f))
    }
}

impl From<CharacterTokenizer> for AnyTokenizer {
    fn from(tok: CharacterTokenizer) -> Self {
        AnyTokenizer::Character(tok)
    }
}

impl From<WordTokenizer> for AnyTokenizer {
    fn from(tok: WordTokenizer) -> Self {
        AnyTokenizer::Word(tok)
    }
}

impl From<GrammarTokenizer> for AnyTokenizer {
    fn from(tok: GrammarTokenizer) -> Self {
        AnyTokenizer::Grammar(tok)
    }
}

/// Build the configured tokenizer from `corpus`, using [`CLikeGrammar`] for
/// the grammar kind. `separator` marks document boundaries inside `corpus`.
pub fn from_text(config: &TokenizerConfig, separator: &str, corpus: &str) -> Result<AnyTokenizer> {
    from_text_with_grammar(config, separator, corpus, Arc::new(CLikeGrammar))
}

/// [`from_text`] with an explicit grammar collaborator.
pub fn from_text_with_grammar(
    config: &TokenizerConfig,
    separator: &str,
    corpus: &str,
    grammar: Arc<dyn Grammar>,
) -> Result<AnyTokenizer> {
    config.validate()?;
    match config.token_type {
        TokenKind::Character => {
            if config.token_list.is_some() {
                tracing::warn!("token list is ignored by character tokenization");
            }
            CharacterTokenizer::from_text(corpus, config.mask_tokens).map(Into::into)
        }
        TokenKind::Word => {
            let candidates = config.load_token_list()?.unwrap_or_default();
            WordTokenizer::from_text(
                corpus,
                candidates,
                config.mask_tokens,
                config.wordpiece_tokenization,
            )
            .map(Into::into)
        }
        TokenKind::Grammar => {
            let seeds = config.load_token_list()?.unwrap_or_default();
            GrammarTokenizer::from_text_with(
                corpus,
                &seeds,
                separator,
                config.mask_tokens,
                grammar,
                default_workers(),
            )
            .map(Into::into)
        }
    }
}

/// Encode every document of `corpus`, skipping the ones that hit an
/// out-of-vocabulary atom. Returns the encoded documents and the number of
/// skipped ones.
pub fn encode_documents<'c, T: Tokenizer + ?Sized>(
    tokenizer: &T,
    documents: impl IntoIterator<Item = &'c str>,
) -> (Vec<Vec<TokenId>>, usize) {
    let mut encoded = Vec::new();
    let mut skipped = 0;
    for document in documents {
        match tokenizer.encode(document) {
            Ok(ids) => encoded.push(ids),
            Err(err) => {
                tracing::debug!(%err, "skipping document");
                skipped += 1;
            }
        }
    }
    (encoded, skipped)
}
