//! Grammar-level tokenizer.
//!
//! Segmentation is delegated to a [`Grammar`]; this type owns the vocabulary
//! of atom keys and the literal rendering of each key. Keys may carry the
//! `-char-based` suffix to tell a literal character apart from a word atom
//! with the same text, so decoding goes through `decoder_with_delim`, not
//! the plain decoder.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::contract::{LocatedIndices, Tokenizer, TokenizerCore};
use crate::error::{Result, TokenizerError};
use crate::grammar::{clean_key, CLikeGrammar, DelimiterMap, Grammar, SourceFormatter};
use crate::meta::MetaTokens;
use crate::vocab::{TokenId, Vocabulary};

/// Worker count used when none is given: the available processing units.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Run `grammar.extract` over every chunk on a dedicated pool of `workers`
/// threads and union the partial maps.
///
/// The first failing chunk aborts the pass; no partial vocabulary is kept.
/// When two chunks disagree on the delimiter of a key, the first chunk (in
/// corpus order) wins.
pub fn discover_delimiters(
    chunks: &[&str],
    seeds: &BTreeSet<String>,
    grammar: &dyn Grammar,
    workers: usize,
) -> Result<DelimiterMap> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| TokenizerError::Discovery(e.to_string()))?;
    tracing::debug!(chunks = chunks.len(), workers, "starting grammar discovery");

    let partials: Vec<DelimiterMap> = pool.install(|| {
        chunks
            .par_iter()
            .enumerate()
            .map(|(i, chunk)| {
                grammar
                    .extract(chunk, seeds)
                    .map_err(|e| TokenizerError::Discovery(format!("chunk {i}: {e}")))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut merged = DelimiterMap::new();
    for partial in partials {
        for (key, delimiter) in partial {
            match merged.get(&key) {
                None => {
                    merged.insert(key, delimiter);
                }
                Some(existing) if *existing != delimiter => {
                    tracing::warn!(
                        key = %key,
                        kept = %existing,
                        dropped = %delimiter,
                        "conflicting delimiters for atom"
                    );
                }
                Some(_) => {}
            }
        }
    }
    tracing::debug!(atoms = merged.len(), "grammar discovery merged");
    Ok(merged)
}

/// Grammar-level tokenizer with a dual decode table.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "GrammarParts", into = "GrammarParts")]
pub struct GrammarTokenizer {
    core: TokenizerCore,
    delimiters: DelimiterMap,
    decoder_with_delim: HashMap<TokenId, String>,
    grammar: Arc<dyn Grammar>,
    formatter: Option<Arc<dyn SourceFormatter>>,
}

#[derive(Serialize, Deserialize)]
struct GrammarParts {
    core: TokenizerCore,
    delimiters: DelimiterMap,
}

impl TryFrom<GrammarParts> for GrammarTokenizer {
    type Error = TokenizerError;

    fn try_from(parts: GrammarParts) -> Result<Self> {
        Self::with_core(parts.core, parts.delimiters)
    }
}

impl From<GrammarTokenizer> for GrammarParts {
    fn from(tok: GrammarTokenizer) -> Self {
        Self {
            core: tok.core,
            delimiters: tok.delimiters,
        }
    }
}

impl GrammarTokenizer {
    /// Build from a vocabulary of atom keys and their delimiters.
    ///
    /// Every delimiter key must be in `vocab`. Atoms without a delimiter
    /// entry render as their cleaned key.
    pub fn new(vocab: Vocabulary, meta: MetaTokens, delimiters: DelimiterMap) -> Result<Self> {
        Self::with_core(TokenizerCore::new(vocab, meta)?, delimiters)
    }

    fn with_core(core: TokenizerCore, delimiters: DelimiterMap) -> Result<Self> {
        if let Some(key) = delimiters.keys().find(|key| !core.vocab().contains(key)) {
            return Err(TokenizerError::OutOfVocabulary(key.clone()));
        }
        let decoder_with_delim = core
            .vocab()
            .entries()
            .into_iter()
            .map(|(key, index)| {
                let delimiter = delimiters.get(key).map_or("", String::as_str);
                (index, format!("{}{delimiter}", clean_key(key)))
            })
            .collect();
        Ok(Self {
            core,
            delimiters,
            decoder_with_delim,
            grammar: Arc::new(CLikeGrammar),
            formatter: None,
        })
    }

    /// Discover the vocabulary of `text` with the built-in [`CLikeGrammar`].
    pub fn from_text(
        text: &str,
        seeds: &BTreeSet<String>,
        separator: &str,
        mask_tokens: bool,
    ) -> Result<Self> {
        Self::from_text_with(
            text,
            seeds,
            separator,
            mask_tokens,
            Arc::new(CLikeGrammar),
            default_workers(),
        )
    }

    /// Split `text` on `separator`, discover atoms chunk by chunk in
    /// parallel with `grammar`, then fold in meta atoms and freeze.
    ///
    /// Indices: meta atoms first in declaration order, then atom keys sorted.
    pub fn from_text_with(
        text: &str,
        seeds: &BTreeSet<String>,
        separator: &str,
        mask_tokens: bool,
        grammar: Arc<dyn Grammar>,
        workers: usize,
    ) -> Result<Self> {
        if separator.is_empty() {
            return Err(TokenizerError::Configuration(
                "content file separator must be non-empty".to_string(),
            ));
        }
        let chunks: Vec<&str> = text.split(separator).collect();
        let mut delimiters = discover_delimiters(&chunks, seeds, grammar.as_ref(), workers)?;

        let meta = MetaTokens::masking(mask_tokens);
        for atom in meta.atoms() {
            delimiters.insert(atom.to_string(), String::new());
        }
        let atoms: Vec<String> = meta
            .atoms()
            .map(str::to_string)
            .chain(
                delimiters
                    .keys()
                    .filter(|key| !meta.contains_atom(key))
                    .cloned(),
            )
            .collect();

        let vocab = Vocabulary::from_atoms(atoms)?;
        let tokenizer = Self::new(vocab, meta, delimiters)?.with_grammar(grammar);
        tracing::info!(
            vocab_size = tokenizer.vocab_size(),
            chunks = chunks.len(),
            mask_tokens,
            "built grammar tokenizer"
        );
        Ok(tokenizer)
    }

    /// Replace the segmentation collaborator.
    pub fn with_grammar(mut self, grammar: Arc<dyn Grammar>) -> Self {
        self.grammar = grammar;
        self
    }

    /// Attach a formatter for pretty decoding.
    pub fn with_formatter(mut self, formatter: Arc<dyn SourceFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Atom key → delimiter table.
    pub fn delimiters(&self) -> &DelimiterMap {
        &self.delimiters
    }

    /// Literal rendering of `index`.
    pub fn rendering(&self, index: TokenId) -> Result<&str> {
        self.decoder_with_delim
            .get(&index)
            .map(String::as_str)
            .ok_or(TokenizerError::DecodeKeyMissing(index))
    }

    fn format(&self, text: &str) -> Result<String> {
        self.formatter
            .as_ref()
            .ok_or(TokenizerError::Unsupported(
                "pretty decoding needs a source formatter",
            ))?
            .format(text)
    }
}

impl Tokenizer for GrammarTokenizer {
    fn core(&self) -> &TokenizerCore {
        &self.core
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        self.grammar
            .atomize(text, self.vocab())?
            .iter()
            .map(|key| self.vocab().encode_atom(key))
            .collect()
    }

    fn atomize(&self, text: &str) -> Result<Vec<String>> {
        let keys = self.grammar.atomize(text, self.vocab())?;
        if let Some(key) = keys.iter().find(|key| !self.vocab().contains(key)) {
            return Err(TokenizerError::OutOfVocabulary(key.clone()));
        }
        Ok(keys)
    }

    fn decode(&self, ids: &[TokenId], ignore_index: Option<TokenId>, pretty: bool) -> Result<String> {
        if pretty {
            let raw = ids
                .iter()
                .filter(|&&id| Some(id) != ignore_index)
                .map(|&id| self.rendering(id))
                .collect::<Result<String>>()?;
            return self.format(&raw);
        }

        let vocab = self.vocab();
        let exponent = [vocab.index("e-char-based"), vocab.index("E-char-based")];
        let sign = [vocab.index("+"), vocab.index("-")];
        let mut out = String::new();
        for (pos, &id) in ids.iter().enumerate() {
            if Some(id) == ignore_index {
                continue;
            }
            out.push_str(self.rendering(id)?);
            // keep "1e -5" from reading back as one literal
            if exponent.contains(&Some(id))
                && ids.get(pos + 1).is_some_and(|&next| sign.contains(&Some(next)))
            {
                out.push(' ');
            }
        }
        Ok(out)
    }

    fn atoms_to_source_code(&self, atoms: &[String], pretty: bool) -> Result<String> {
        let meta = self.meta_tokens();
        let mut code = String::new();
        for atom in atoms.iter().filter(|atom| !meta.contains_atom(atom)) {
            code.push_str(self.rendering(self.vocab().encode_atom(atom)?)?);
        }
        if pretty {
            self.format(&code)
        } else {
            Ok(code)
        }
    }

    fn locate_index_for_position<'a>(
        &'a self,
        _ids: &'a [TokenId],
        _positions: &'a [(usize, usize)],
    ) -> Result<LocatedIndices<'a>> {
        Err(TokenizerError::Unsupported(
            "position lookup is not available for grammar tokenizers",
        ))
    }
}

impl PartialEq for GrammarTokenizer {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core && self.delimiters == other.delimiters
    }
}

impl fmt::Debug for GrammarTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarTokenizer")
            .field("core", &self.core)
            .field("delimiters", &self.delimiters)
            .field("formatter", &self.formatter.is_some())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for GrammarTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GrammarTokenizer[{} tokens]", self.vocab_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaRole;

    const SEP: &str = "\n// ----\n";

    fn corpus() -> String {
        [
            "kernel void A(global float* a) {\n  a[0] = 1.5e-3f;\n}\n",
            "int f(int x) {\n\n  return x<<2;\n}",
            "char *s = \"a\\\"b\";",
        ]
        .join(SEP)
    }

    fn seeds() -> BTreeSet<String> {
        ["kernel", "void", "<<"].iter().map(|s| s.to_string()).collect()
    }

    fn dual(delims: &[(&str, &str)]) -> GrammarTokenizer {
        let vocab = Vocabulary::from_atoms(delims.iter().map(|(k, _)| *k)).unwrap();
        let delimiters = delims
            .iter()
            .map(|(k, d)| (k.to_string(), d.to_string()))
            .collect();
        GrammarTokenizer::new(vocab, MetaTokens::none(), delimiters).unwrap()
    }

    #[test]
    fn chunks_roundtrip_byte_for_byte() {
        let text = corpus();
        let tok = GrammarTokenizer::from_text_with(
            &text,
            &seeds(),
            SEP,
            true,
            Arc::new(CLikeGrammar),
            2,
        )
        .unwrap();
        for chunk in text.split(SEP) {
            let ids = tok.encode(chunk).unwrap();
            assert_eq!(tok.decode(&ids, None, false).unwrap(), chunk);
        }
    }

    #[test]
    fn meta_atoms_first_and_rendered_literally() {
        let tok = GrammarTokenizer::from_text("int x;", &BTreeSet::new(), SEP, true).unwrap();
        for (i, role) in MetaRole::ALL.iter().enumerate() {
            assert_eq!(tok.core().meta_index(*role), Some(i as TokenId));
            assert_eq!(tok.delimiters().get(role.default_atom()).map(String::as_str), Some(""));
        }
        let mut ids = vec![0];
        ids.extend(tok.encode("int x;").unwrap());
        ids.push(1);
        assert_eq!(tok.decode(&ids, None, false).unwrap(), "[START]int x;[END]");
        assert_eq!(tok.to_source_code(&ids, false).unwrap(), "int x;");
    }

    #[test]
    fn rendering_strips_suffix_and_appends_delimiter() {
        let tok = dual(&[("0-char-based", ""), ("int", " "), ("\\\\-char-based", "")]);
        let zero = tok.vocab().index("0-char-based").unwrap();
        let int = tok.vocab().index("int").unwrap();
        let slash = tok.vocab().index("\\\\-char-based").unwrap();
        assert_eq!(tok.rendering(zero).unwrap(), "0");
        assert_eq!(tok.rendering(int).unwrap(), "int ");
        assert_eq!(tok.rendering(slash).unwrap(), "\\");
        assert_eq!(tok.decode(&[int, zero], None, false).unwrap(), "int 0");
    }

    #[test]
    fn exponent_followed_by_sign_gets_a_space() {
        let tok = dual(&[("1-char-based", ""), ("e-char-based", ""), ("-", ""), ("+", ""), ("x", "")]);
        let id = |k: &str| tok.vocab().index(k).unwrap();
        let ids = [id("1-char-based"), id("e-char-based"), id("-"), id("x")];
        assert_eq!(tok.decode(&ids, None, false).unwrap(), "1e -x");
        let ids = [id("e-char-based"), id("x")];
        assert_eq!(tok.decode(&ids, None, false).unwrap(), "ex");
        let ids = [id("e-char-based")];
        assert_eq!(tok.decode(&ids, None, false).unwrap(), "e");
    }

    #[test]
    fn pretty_decode_goes_through_formatter() {
        let tok = dual(&[("int", ""), (" ", ""), ("x", "")]);
        let ids = tok.encode("int x").unwrap();
        assert!(matches!(
            tok.decode(&ids, None, true),
            Err(TokenizerError::Unsupported(_))
        ));
        let upper = |text: &str| -> Result<String> { Ok(text.to_uppercase()) };
        let tok = tok.with_formatter(Arc::new(upper));
        assert_eq!(tok.decode(&ids, None, true).unwrap(), "INT X");
        let atoms = tok.atomize("int x").unwrap();
        assert_eq!(tok.atoms_to_source_code(&atoms, true).unwrap(), "INT X");
    }

    #[test]
    fn oov_atom_is_an_error() {
        let tok = GrammarTokenizer::from_text("int x;", &BTreeSet::new(), SEP, false).unwrap();
        assert!(matches!(tok.encode("int y;"), Err(TokenizerError::OutOfVocabulary(_))));
        assert!(matches!(tok.atomize("int y;"), Err(TokenizerError::OutOfVocabulary(_))));
        assert!(matches!(tok.encode("float x;"), Err(TokenizerError::OutOfVocabulary(_))));
    }

    #[test]
    fn locate_is_unsupported() {
        let tok = GrammarTokenizer::from_text("x", &BTreeSet::new(), SEP, false).unwrap();
        assert!(matches!(
            tok.locate_index_for_position(&[0], &[(1, 1)]),
            Err(TokenizerError::Unsupported(_))
        ));
    }

    #[test]
    fn delimiter_keys_must_be_in_vocab() {
        let vocab = Vocabulary::from_atoms(["a"]).unwrap();
        let delimiters: DelimiterMap = [("b".to_string(), String::new())].into();
        assert!(GrammarTokenizer::new(vocab, MetaTokens::none(), delimiters).is_err());
    }

    #[test]
    fn persist_reattaches_builtin_grammar() {
        let text = corpus();
        let tok = GrammarTokenizer::from_text(&text, &seeds(), SEP, true).unwrap();
        let back = GrammarTokenizer::load(&tok.persist().unwrap()).unwrap();
        assert_eq!(back, tok);
        let chunk = text.split(SEP).next().unwrap();
        assert_eq!(back.encode(chunk).unwrap(), tok.encode(chunk).unwrap());
        assert_eq!(back.to_string(), tok.to_string());
    }

    #[derive(Debug)]
    struct Failing;

    impl Grammar for Failing {
        fn extract(&self, chunk: &str, _seeds: &BTreeSet<String>) -> Result<DelimiterMap> {
            if chunk.contains("bad") {
                return Err(TokenizerError::Configuration("unparsable chunk".to_string()));
            }
            Ok(DelimiterMap::new())
        }

        fn atomize(&self, _text: &str, _vocab: &Vocabulary) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn worker_failure_aborts_discovery() {
        let chunks = ["ok", "bad", "ok"];
        let err = discover_delimiters(&chunks, &BTreeSet::new(), &Failing, 3).unwrap_err();
        assert!(matches!(err, TokenizerError::Discovery(ref msg) if msg.contains("chunk 1")));
        assert!(GrammarTokenizer::from_text_with("a|bad", &BTreeSet::new(), "|", false, Arc::new(Failing), 2).is_err());
    }

    #[test]
    fn conflicting_delimiters_keep_first_chunk() {
        #[derive(Debug)]
        struct ByChunk;
        impl Grammar for ByChunk {
            fn extract(&self, chunk: &str, _seeds: &BTreeSet<String>) -> Result<DelimiterMap> {
                Ok([("x".to_string(), chunk.to_string())].into())
            }
            fn atomize(&self, _text: &str, _vocab: &Vocabulary) -> Result<Vec<String>> {
                Ok(Vec::new())
            }
        }
        let merged = discover_delimiters(&[" ", "\n"], &BTreeSet::new(), &ByChunk, 2).unwrap();
        assert_eq!(merged.get("x").map(String::as_str), Some(" "));
    }

    #[test]
    fn empty_separator_is_rejected() {
        assert!(matches!(
            GrammarTokenizer::from_text("x", &BTreeSet::new(), "", false),
            Err(TokenizerError::Configuration(_))
        ));
    }
}
