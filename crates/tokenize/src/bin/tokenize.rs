#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tokenize::{
    from_text, AnyTokenizer, CommandFormatter, MetaRole, TokenId, TokenKind, Tokenizer,
    TokenizerConfig,
};

#[derive(Parser)]
#[command(name = "tokenize", version, about = "Build, apply and inspect source code tokenizers")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a tokenizer from a corpus file and persist it
    Build {
        /// JSON tokenizer config; overrides --kind/--token-list/--mask-tokens
        #[arg(long)]
        config: Option<PathBuf>,
        /// Tokenizer kind: character, word, grammar (or ast)
        #[arg(long, default_value = "character")]
        kind: TokenKind,
        /// Token list JSON file
        #[arg(long)]
        token_list: Option<PathBuf>,
        /// Include meta tokens in the vocabulary
        #[arg(long)]
        mask_tokens: bool,
        /// Corpus text file
        #[arg(long)]
        corpus: PathBuf,
        /// Boundary between documents in the corpus
        #[arg(long, default_value = "\n\n")]
        separator: String,
        /// Output path for the persisted tokenizer
        #[arg(long)]
        out: PathBuf,
    },
    /// Encode text with a persisted tokenizer
    Encode {
        /// Persisted tokenizer
        #[arg(long)]
        tokenizer: PathBuf,
        /// Print atoms instead of indices
        #[arg(long)]
        atoms: bool,
        /// Text to encode
        text: String,
    },
    /// Decode indices with a persisted tokenizer
    Decode {
        /// Persisted tokenizer
        #[arg(long)]
        tokenizer: PathBuf,
        /// Index dropped from the output
        #[arg(long)]
        ignore_index: Option<TokenId>,
        /// Strip meta tokens
        #[arg(long)]
        source_code: bool,
        /// Pipe the output through clang-format (grammar tokenizers only)
        #[arg(long)]
        pretty: bool,
        /// Indices to decode
        ids: Vec<TokenId>,
    },
    /// Describe a persisted tokenizer
    Info {
        /// Persisted tokenizer
        #[arg(long)]
        tokenizer: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &PathBuf, pretty: bool) -> tokenize::Result<AnyTokenizer> {
    let tokenizer = AnyTokenizer::load_file(path)?;
    Ok(match tokenizer {
        AnyTokenizer::Grammar(tok) if pretty => {
            AnyTokenizer::Grammar(tok.with_formatter(Arc::new(CommandFormatter::default())))
        }
        other => other,
    })
}

fn run(command: Command) -> tokenize::Result<()> {
    match command {
        Command::Build {
            config,
            kind,
            token_list,
            mask_tokens,
            corpus,
            separator,
            out,
        } => {
            let config = match config {
                Some(path) => TokenizerConfig::from_json_file(path)?,
                None => TokenizerConfig {
                    token_type: kind,
                    token_list,
                    mask_tokens,
                    ..TokenizerConfig::character()
                },
            };
            let text = std::fs::read_to_string(&corpus)?;
            let tokenizer = from_text(&config, &separator, &text)?;
            tokenizer.save(&out)?;
            tracing::info!(path = %out.display(), "saved {tokenizer}");
        }
        Command::Encode {
            tokenizer,
            atoms,
            text,
        } => {
            let tokenizer = load(&tokenizer, false)?;
            if atoms {
                println!("{:?}", tokenizer.atomize(&text)?);
            } else {
                let ids: Vec<String> = tokenizer
                    .encode(&text)?
                    .iter()
                    .map(TokenId::to_string)
                    .collect();
                println!("{}", ids.join(" "));
            }
        }
        Command::Decode {
            tokenizer,
            ignore_index,
            source_code,
            pretty,
            ids,
        } => {
            let tokenizer = load(&tokenizer, pretty)?;
            let text = if source_code {
                tokenizer.to_source_code(&ids, pretty)?
            } else {
                tokenizer.decode(&ids, ignore_index, pretty)?
            };
            print!("{text}");
        }
        Command::Info { tokenizer } => {
            let tokenizer = load(&tokenizer, false)?;
            println!("{tokenizer}");
            println!("kind: {}", tokenizer.kind());
            println!("vocab size: {}", tokenizer.vocab_size());
            for role in MetaRole::ALL {
                if let Some(index) = tokenizer.core().meta_index(role) {
                    println!("{role}: {index}");
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
