use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, DEFAULT_API_KEY_ENV};

/// Semantic search over a directory of PDF, DOCX and TXT files.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// YAML config file; flags below override its values
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Directory with the documents to index
    #[clap(long)]
    pub corpus_dir: Option<PathBuf>,

    /// Where to write the vector index
    #[clap(long)]
    pub index_path: Option<PathBuf>,

    /// Number of nearest paragraphs to show
    #[clap(short)]
    pub k: Option<usize>,

    /// Query text. Prompted for interactively when omitted
    #[clap(short, long)]
    pub query: Option<String>,

    /// Paragraphs per embedding request
    #[clap(long)]
    pub batch_size: Option<usize>,

    /// Concurrent embedding requests: "auto" or a positive integer
    #[clap(long)]
    pub parallelism: Option<String>,

    /// Retries for transient embedding failures
    #[clap(long)]
    pub max_retries: Option<u32>,

    /// Environment variable holding the API key
    #[clap(long, default_value = DEFAULT_API_KEY_ENV)]
    pub api_key_env: String,

    /// Don't draw the embedding progress bar
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Log debug output
    #[clap(short, long, default_value = "false")]
    pub verbose: bool,
}

impl Args {
    /// Apply flag values on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.corpus_dir {
            config.corpus_dir = dir.clone();
        }
        if let Some(path) = &self.index_path {
            config.index_path = path.clone();
        }
        if let Some(k) = self.k {
            config.k = k;
        }
        if let Some(batch_size) = self.batch_size {
            config.embedding.batch_size = batch_size;
        }
        if let Some(parallelism) = &self.parallelism {
            config.embedding.parallelism = parallelism.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
    }
}
