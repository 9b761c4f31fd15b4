//! Grammar collaborators used by [`crate::GrammarTokenizer`].
//!
//! The tokenizer itself never parses source. It asks a [`Grammar`] for the
//! atoms of a discovery chunk and for the segmentation of text to encode,
//! and a [`SourceFormatter`] for pretty decoding. [`CLikeGrammar`] is the
//! built-in grammar for C-family sources; [`CommandFormatter`] pipes text
//! through an external formatter such as `clang-format`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{Result, TokenizerError};
use crate::vocab::Vocabulary;

/// Suffix marking an atom key that stands for one literal character.
pub const CHAR_BASED_SUFFIX: &str = "-char-based";

/// Atom key → literal delimiter emitted after the atom's rendering.
pub type DelimiterMap = BTreeMap<String, String>;

/// Grammar-aware atom discovery and segmentation.
pub trait Grammar: Send + Sync {
    /// Atoms of one discovery chunk with their delimiters.
    fn extract(&self, chunk: &str, seeds: &BTreeSet<String>) -> Result<DelimiterMap>;

    /// Split `text` into atom keys, given the finalized vocabulary.
    fn atomize(&self, text: &str, vocab: &Vocabulary) -> Result<Vec<String>>;
}

/// Source code formatter used for pretty decoding.
pub trait SourceFormatter: Send + Sync {
    /// Reformat `text`.
    fn format(&self, text: &str) -> Result<String>;
}

impl<F> SourceFormatter for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn format(&self, text: &str) -> Result<String> {
        self(text)
    }
}

/// Key of the char-based atom for `c`. Backslashes are escaped in keys.
pub fn char_based_key(c: char) -> String {
    if c == '\\' {
        format!("\\\\{CHAR_BASED_SUFFIX}")
    } else {
        format!("{c}{CHAR_BASED_SUFFIX}")
    }
}

/// Literal text of an atom key: char-based suffix stripped, backslashes unescaped.
pub fn clean_key(key: &str) -> String {
    match key.strip_suffix(CHAR_BASED_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.replace("\\\\", "\\"),
        _ => key.to_string(),
    }
}

const OPERATORS: [&str; 23] = [
    ">>=", "<<=", "...", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "##",
];

fn is_operator(atom: &str) -> bool {
    atom.chars().count() > 1 && atom.chars().all(|c| c.is_ascii_punctuation())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    /// Literal atom: whitespace, operator, punctuation.
    Word(String),
    /// Identifier or keyword.
    Identifier(String),
    /// One character of a numeric, string or char literal.
    Literal(char),
}

/// Built-in grammar for C-family source.
///
/// Identifiers and keywords are word atoms, numeric and quoted literals are
/// split into char-based atoms, operators match longest-first, and every
/// whitespace character is an atom of its own (`"\n\n"` pairs into one).
/// Delimiters are always empty, so each chunk decodes back byte-for-byte.
#[derive(Debug, Clone, Default)]
pub struct CLikeGrammar;

impl CLikeGrammar {
    fn operators<'a>(extra: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut ops: BTreeSet<String> = OPERATORS.iter().map(|op| op.to_string()).collect();
        ops.extend(extra.filter(|atom| is_operator(atom)).map(str::to_string));
        let mut ops: Vec<String> = ops.into_iter().collect();
        ops.sort_by_key(|op| std::cmp::Reverse(op.chars().count()));
        ops
    }

    fn lex(text: &str, operators: &[String]) -> Vec<Lexeme> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = Vec::new();
        let mut i = 0;
        while let Some(&c) = chars.get(i) {
            let next = chars.get(i + 1).copied();
            if c == '\n' {
                if next == Some('\n') {
                    out.push(Lexeme::Word("\n\n".to_string()));
                    i += 2;
                } else {
                    out.push(Lexeme::Word("\n".to_string()));
                    i += 1;
                }
            } else if c.is_whitespace() {
                out.push(Lexeme::Word(c.to_string()));
                i += 1;
            } else if c.is_ascii_alphabetic() || c == '_' {
                let mut j = i + 1;
                while chars.get(j).is_some_and(|d| d.is_ascii_alphanumeric() || *d == '_') {
                    j += 1;
                }
                out.push(Lexeme::Identifier(chars.get(i..j).unwrap_or_default().iter().collect()));
                i = j;
            } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|d| d.is_ascii_digit())) {
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        Some(d) if d.is_ascii_alphanumeric() || *d == '_' || *d == '.' => j += 1,
                        Some('+' | '-') if matches!(chars.get(j - 1), Some('e' | 'E' | 'p' | 'P')) => {
                            j += 1
                        }
                        _ => break,
                    }
                }
                out.extend(chars.get(i..j).unwrap_or_default().iter().map(|&d| Lexeme::Literal(d)));
                i = j;
            } else if c == '"' || c == '\'' {
                out.push(Lexeme::Literal(c));
                i += 1;
                while let Some(&d) = chars.get(i) {
                    if d == '\n' {
                        break;
                    }
                    out.push(Lexeme::Literal(d));
                    i += 1;
                    if d == c {
                        break;
                    }
                    if d == '\\' {
                        if let Some(&escaped) = chars.get(i).filter(|&&e| e != '\n') {
                            out.push(Lexeme::Literal(escaped));
                            i += 1;
                        }
                    }
                }
            } else {
                let op = operators.iter().find(|op| {
                    op.chars()
                        .enumerate()
                        .all(|(k, oc)| chars.get(i + k) == Some(&oc))
                });
                match op {
                    Some(op) => {
                        out.push(Lexeme::Word(op.clone()));
                        i += op.chars().count();
                    }
                    None => {
                        out.push(Lexeme::Word(c.to_string()));
                        i += 1;
                    }
                }
            }
        }
        out
    }
}

impl Grammar for CLikeGrammar {
    fn extract(&self, chunk: &str, seeds: &BTreeSet<String>) -> Result<DelimiterMap> {
        let operators = Self::operators(seeds.iter().map(String::as_str));
        Ok(Self::lex(chunk, &operators)
            .into_iter()
            .map(|lexeme| match lexeme {
                Lexeme::Word(key) | Lexeme::Identifier(key) => (key, String::new()),
                Lexeme::Literal(c) => (char_based_key(c), String::new()),
            })
            .collect())
    }

    fn atomize(&self, text: &str, vocab: &Vocabulary) -> Result<Vec<String>> {
        let atoms = vocab.atoms();
        let operators = Self::operators(atoms.into_iter());
        let mut keys = Vec::new();
        for lexeme in Self::lex(text, &operators) {
            match lexeme {
                Lexeme::Word(key) => keys.push(key),
                Lexeme::Literal(c) => keys.push(char_based_key(c)),
                // unseen identifiers fall back to their characters
                Lexeme::Identifier(word) if !vocab.contains(&word) => {
                    keys.extend(word.chars().map(char_based_key))
                }
                Lexeme::Identifier(word) => keys.push(word),
            }
        }
        Ok(keys)
    }
}

/// Runs an external formatter program over stdin/stdout.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    program: String,
    args: Vec<String>,
}

impl Default for CommandFormatter {
    fn default() -> Self {
        Self::new("clang-format")
    }
}

impl CommandFormatter {
    /// Formatter invoking `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a command-line argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl SourceFormatter for CommandFormatter {
    fn format(&self, text: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TokenizerError::Format(format!("{}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TokenizerError::Format("formatter stdin unavailable".to_string()))?;
        let input = text.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        writer
            .join()
            .map_err(|_| TokenizerError::Format("formatter writer thread panicked".to_string()))??;

        if !output.status.success() {
            return Err(TokenizerError::Format(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| TokenizerError::Format(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(map: &DelimiterMap) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn char_based_keys_roundtrip_through_clean() {
        assert_eq!(char_based_key('0'), "0-char-based");
        assert_eq!(clean_key("0-char-based"), "0");
        assert_eq!(clean_key("--char-based"), "-");
        assert_eq!(char_based_key('\\'), "\\\\-char-based");
        assert_eq!(clean_key(&char_based_key('\\')), "\\");
        assert_eq!(clean_key("int"), "int");
        assert_eq!(clean_key("-char-based"), "-char-based");
    }

    #[test]
    fn extract_splits_words_literals_and_operators() {
        let map = CLikeGrammar
            .extract("x += 1.5e-3;\n\n", &BTreeSet::new())
            .unwrap();
        assert_eq!(
            keys(&map),
            vec![
                "\n\n", " ", "+=", "--char-based", ".-char-based", "1-char-based",
                "3-char-based", "5-char-based", ";", "e-char-based", "x",
            ]
        );
        assert!(map.values().all(String::is_empty));
    }

    #[test]
    fn extract_uses_punctuation_seeds_as_operators() {
        let seeds: BTreeSet<String> = ["<=>".to_string(), "kernel".to_string()].into();
        let map = CLikeGrammar.extract("a<=>b", &seeds).unwrap();
        assert!(map.contains_key("<=>"));
        assert!(!map.contains_key("kernel"));
    }

    #[test]
    fn string_literals_are_char_based() {
        let map = CLikeGrammar
            .extract("s = \"a\\\"b\";", &BTreeSet::new())
            .unwrap();
        assert!(map.contains_key("\"-char-based"));
        assert!(map.contains_key("\\\\-char-based"));
        assert!(map.contains_key("a-char-based"));
        assert!(!map.contains_key("a"));
    }

    #[test]
    fn atomize_falls_back_to_chars_for_unseen_identifiers() {
        let vocab = Vocabulary::from_atoms([
            "int", " ", "a-char-based", "b-char-based", ";", "=", "1-char-based",
        ])
        .unwrap();
        let atoms = CLikeGrammar.atomize("int ab = 1;", &vocab).unwrap();
        assert_eq!(
            atoms,
            vec!["int", " ", "a-char-based", "b-char-based", " ", "=", " ", "1-char-based", ";"]
        );
    }

    #[test]
    fn closure_formatter() {
        let upper = |text: &str| -> Result<String> { Ok(text.to_uppercase()) };
        assert_eq!(upper.format("int x").unwrap(), "INT X");
    }

    #[test]
    fn missing_formatter_program_is_a_format_error() {
        let fmt = CommandFormatter::new("definitely-not-a-formatter-binary");
        assert!(matches!(fmt.format("x"), Err(TokenizerError::Format(_))));
    }
}
