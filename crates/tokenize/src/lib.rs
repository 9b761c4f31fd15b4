#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
#![deny(missing_docs, unused_must_use)]

//! Source code tokenizers: character, greedy word and grammar level.
//!
//! Every kind is built from a corpus, freezes its vocabulary, and then
//! encodes and decodes deterministically. Contract: a frozen tokenizer maps
//! identical input to identical output, and a persisted tokenizer reloads
//! into an equal one.

pub mod ast;
pub mod character;
pub mod config;
pub mod contract;
pub mod error;
pub mod factory;
pub mod grammar;
pub mod meta;
pub mod persist;
pub mod vocab;
pub mod word;

pub use ast::{default_workers, discover_delimiters, GrammarTokenizer};
pub use character::CharacterTokenizer;
pub use config::{TokenKind, TokenizerConfig};
pub use contract::{Decoded, Encoded, LocatedIndices, Tokenizer, TokenizerCore};
pub use error::{Result, TokenizerError};
pub use factory::{from_text, from_text_with_grammar, AnyTokenizer};
pub use grammar::{
    char_based_key, clean_key, CLikeGrammar, CommandFormatter, DelimiterMap, Grammar,
    SourceFormatter, CHAR_BASED_SUFFIX,
};
pub use meta::{MetaRole, MetaTokens};
pub use vocab::{GrowableVocabulary, TokenId, Vocabulary};
pub use word::{segment, GrowableWordTokenizer, LookupTable, WordTokenizer};
