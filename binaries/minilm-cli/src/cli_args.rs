use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Load a MiniLM checkpoint and a WordPiece vocabulary, then embed text,
/// tokenize it, find the nearest of a set of candidates, or inspect the
/// checkpoint's tensor table.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed one string and print its 384-dim vector.
    Embed(Embed),
    /// Tokenize one string and print the resulting token IDs.
    Tokenize(Tokenize),
    /// Embed a query and a list of candidates, and print the candidate
    /// closest to the query by cosine similarity.
    Nearest(Nearest),
    /// Print the tensor table of a checkpoint file, without loading a
    /// vocabulary or binding a model.
    Inspect(Inspect),
}

/// Arguments shared by every subcommand that needs a loaded model.
#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Path to a TBF1 checkpoint file.
    #[arg(long)]
    pub model: PathBuf,
    /// Path to a WordPiece vocabulary file (one token per line).
    #[arg(long)]
    pub vocab: PathBuf,
}

#[derive(Args, Debug)]
pub struct Embed {
    #[command(flatten)]
    pub model: ModelArgs,
    /// Text to embed.
    pub text: String,
}

#[derive(Args, Debug)]
pub struct Tokenize {
    #[command(flatten)]
    pub model: ModelArgs,
    /// Text to tokenize.
    pub text: String,
}

#[derive(Args, Debug)]
pub struct Nearest {
    #[command(flatten)]
    pub model: ModelArgs,
    /// The query string.
    pub query: String,
    /// Candidate strings to rank by similarity to the query. At least one
    /// is required.
    #[arg(long = "candidate", required = true)]
    pub candidates: Vec<String>,
}

#[derive(Args, Debug)]
pub struct Inspect {
    /// Path to a TBF1 checkpoint file.
    pub model: PathBuf,
}
