//! Tokenizer configuration types.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenizerError};

/// Tokenizer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// One atom per character
    Character,
    /// Greedy multi-character atoms from a candidate list
    Word,
    /// Grammar-derived atoms
    #[serde(alias = "ast")]
    Grammar,
}

impl FromStr for TokenKind {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "character" | "char" => Ok(TokenKind::Character),
            "word" => Ok(TokenKind::Word),
            "grammar" | "ast" => Ok(TokenKind::Grammar),
            other => Err(TokenizerError::Configuration(format!(
                "unknown token type {other:?}"
            ))),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::Character => "character",
            TokenKind::Word => "word",
            TokenKind::Grammar => "grammar",
        })
    }
}

fn default_language() -> String {
    "opencl".to_string()
}

/// Tokenizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Tokenizer kind
    pub token_type: TokenKind,
    /// JSON file `{ "<language>": { "tokens": [...] } }` with candidate atoms
    #[serde(default)]
    pub token_list: Option<PathBuf>,
    /// Fold the meta tokens into the vocabulary
    #[serde(default)]
    pub mask_tokens: bool,
    /// Sub-word piece tokenization (unsupported; rejected by `validate`)
    #[serde(default)]
    pub wordpiece_tokenization: bool,
    /// Key selecting the token list inside the JSON file
    #[serde(default = "default_language")]
    pub language: String,
}

impl TokenizerConfig {
    fn of(token_type: TokenKind) -> Self {
        Self {
            token_type,
            token_list: None,
            mask_tokens: false,
            wordpiece_tokenization: false,
            language: default_language(),
        }
    }

    /// Character-level config
    pub fn character() -> Self {
        Self::of(TokenKind::Character)
    }

    /// Word-level config reading candidates from `token_list`
    pub fn word(token_list: impl Into<PathBuf>) -> Self {
        Self::of(TokenKind::Word).with_token_list(token_list)
    }

    /// Grammar-level config
    pub fn grammar() -> Self {
        Self::of(TokenKind::Grammar)
    }

    /// Set the token list path
    pub fn with_token_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_list = Some(path.into());
        self
    }

    /// Enable meta tokens
    pub fn with_mask_tokens(mut self, mask_tokens: bool) -> Self {
        self.mask_tokens = mask_tokens;
        self
    }

    /// Request sub-word piece tokenization
    pub fn with_wordpiece(mut self, wordpiece: bool) -> Self {
        self.wordpiece_tokenization = wordpiece;
        self
    }

    /// Set the token list language key
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Parse a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TokenizerError::Configuration(e.to_string()))
    }

    /// Read a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Reject configurations that cannot build a tokenizer.
    pub fn validate(&self) -> Result<()> {
        if self.wordpiece_tokenization {
            return Err(TokenizerError::Configuration(
                "sub-word piece tokenization is not supported".to_string(),
            ));
        }
        if self.token_type == TokenKind::Word && self.token_list.is_none() {
            return Err(TokenizerError::Configuration(
                "word tokenizer needs a token list".to_string(),
            ));
        }
        Ok(())
    }

    /// Candidate atoms from the configured token list, if any.
    pub fn load_token_list(&self) -> Result<Option<BTreeSet<String>>> {
        self.token_list
            .as_ref()
            .map(|path| read_token_list(path, &self.language))
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct LanguageTokens {
    tokens: Vec<String>,
}

/// Read the `tokens` array stored under `language` in a token list file.
pub fn read_token_list(path: impl AsRef<Path>, language: &str) -> Result<BTreeSet<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    parse_token_list(&text, language)
        .map_err(|e| TokenizerError::Configuration(format!("{}: {e}", path.display())))
}

/// Parse token list JSON text.
pub fn parse_token_list(json: &str, language: &str) -> Result<BTreeSet<String>> {
    let mut lists: HashMap<String, LanguageTokens> =
        serde_json::from_str(json).map_err(|e| TokenizerError::Serialization(e.to_string()))?;
    let entry = lists.remove(language).ok_or_else(|| {
        TokenizerError::Configuration(format!("no token list for language {language:?}"))
    })?;
    Ok(entry.tokens.into_iter().collect())
}
