//! Corpus search pipeline.
//!
//! Runs one pass over a corpus directory:
//! - Extracts paragraphs from every supported file
//! - Embeds them in batches and builds a flat index
//! - Persists the index and answers a single query

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::config::{Config, ConfigError};
use crate::extract::{ExtractError, ExtractorRegistry};
use crate::semantic::embeddings::{EmbeddingClient, EmbeddingError};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Corpus directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Failed to list corpus directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No paragraphs could be extracted from {}", .0.display())]
    EmptyCorpus(PathBuf),

    #[error("Query is empty")]
    EmptyQuery,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Embedding count mismatch: expected {expected}, got {got}")]
    MisalignedEmbeddings { expected: usize, got: usize },

    #[error("Failed to start embedding workers: {0}")]
    ThreadPool(String),
}

/// A retrievable unit of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub text: String,
    /// File the paragraph was extracted from
    pub source: PathBuf,
}

/// A file left out of the corpus.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: ExtractError,
}

/// Paragraphs of every extracted file, in file-then-paragraph order.
#[derive(Debug, Default)]
pub struct Corpus {
    pub paragraphs: Vec<Paragraph>,
    pub skipped: Vec<SkippedFile>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Corpus position of the paragraph
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
    pub paragraph: Paragraph,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct SearchReport {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub index_path: PathBuf,
    pub paragraph_count: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Run parameters, resolved from `Config`.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub corpus_dir: PathBuf,
    pub index_path: PathBuf,
    pub k: usize,
    pub batch_size: usize,
    /// Concurrent embed requests
    pub workers: usize,
    pub show_progress: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            corpus_dir: config.corpus_dir.clone(),
            index_path: config.index_path.clone(),
            k: config.k,
            batch_size: config.embedding.batch_size,
            workers: config.embedding.worker_count()?,
            show_progress: false,
        })
    }
}

pub struct SearchPipeline<E> {
    options: PipelineOptions,
    registry: ExtractorRegistry,
    embedder: E,
}

impl<E: EmbeddingClient> SearchPipeline<E> {
    pub fn new(options: PipelineOptions, registry: ExtractorRegistry, embedder: E) -> Self {
        Self {
            options,
            registry,
            embedder,
        }
    }

    /// Run every stage for `query`.
    ///
    /// Only per-file extraction failures are tolerated; anything else ends
    /// the run without results.
    pub fn run(&self, query: &str) -> Result<SearchReport, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let corpus = self.load_corpus()?;
        let vectors = self.embed_corpus(&corpus)?;
        let index = self.build_index(&vectors)?;
        self.save_index(&index)?;

        let hits = self.search(&index, &corpus, query)?;

        Ok(SearchReport {
            query: query.to_string(),
            hits,
            index_path: self.options.index_path.clone(),
            paragraph_count: corpus.len(),
            skipped: corpus.skipped,
        })
    }

    /// Extract paragraphs from every file in the corpus directory.
    pub fn load_corpus(&self) -> Result<Corpus, PipelineError> {
        let dir = &self.options.corpus_dir;
        if !dir.is_dir() {
            return Err(PipelineError::DirectoryNotFound(dir.clone()));
        }

        log::debug!(
            "Reading {} (extensions: {})",
            dir.display(),
            self.registry.extensions().join(", ")
        );

        let mut corpus = Corpus::default();
        let mut extracted_files = 0usize;

        for path in list_files(dir)? {
            match self.registry.extract(&path) {
                Ok(paragraphs) => {
                    log::debug!("{}: {} paragraphs", path.display(), paragraphs.len());
                    extracted_files += 1;
                    corpus
                        .paragraphs
                        .extend(paragraphs.into_iter().map(|text| Paragraph {
                            text,
                            source: path.clone(),
                        }));
                }
                Err(error) => {
                    log::warn!("Skipping {}", error);
                    corpus.skipped.push(SkippedFile { path, error });
                }
            }
        }

        if corpus.is_empty() {
            return Err(PipelineError::EmptyCorpus(dir.clone()));
        }

        log::info!(
            "Extracted {} paragraphs from {} files ({} skipped)",
            corpus.len(),
            extracted_files,
            corpus.skipped.len()
        );

        Ok(corpus)
    }

    /// Embed the corpus, one vector per paragraph in corpus order.
    pub fn embed_corpus(&self, corpus: &Corpus) -> Result<Vec<Vec<f32>>, PipelineError> {
        let texts: Vec<&str> = corpus.paragraphs.iter().map(|p| p.text.as_str()).collect();
        let batch_size = self
            .options
            .batch_size
            .min(self.embedder.max_batch_size())
            .max(1);
        let batches: Vec<&[&str]> = texts.chunks(batch_size).collect();
        let workers = self.options.workers.max(1).min(batches.len().max(1));

        log::info!(
            "Embedding {} paragraphs in {} batches with '{}' ({} workers)",
            texts.len(),
            batches.len(),
            self.embedder.model_name(),
            workers
        );

        let progress = self.progress_bar(texts.len());

        let embed_batch = |batch: &&[&str]| -> Result<Vec<Vec<f32>>, PipelineError> {
            let vectors = self.embedder.embed(batch)?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::MisalignedEmbeddings {
                    expected: batch.len(),
                    got: vectors.len(),
                });
            }
            progress.inc(batch.len() as u64);
            Ok(vectors)
        };

        let embedded: Vec<Vec<Vec<f32>>> = if workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;
            pool.install(|| {
                batches
                    .par_iter()
                    .map(embed_batch)
                    .collect::<Result<Vec<_>, PipelineError>>()
            })?
        } else {
            batches
                .iter()
                .map(embed_batch)
                .collect::<Result<Vec<_>, PipelineError>>()?
        };

        progress.finish_and_clear();

        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        if vectors.len() != corpus.len() {
            return Err(PipelineError::MisalignedEmbeddings {
                expected: corpus.len(),
                got: vectors.len(),
            });
        }

        Ok(vectors)
    }

    /// Build an index sized by the first vector.
    pub fn build_index(&self, vectors: &[Vec<f32>]) -> Result<VectorIndex, PipelineError> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut index = VectorIndex::create(dimension)?;
        index.add(vectors)?;
        Ok(index)
    }

    pub fn save_index(&self, index: &VectorIndex) -> Result<(), PipelineError> {
        let storage = VectorStorage::new(self.options.index_path.clone());
        storage.save(index, &self.embedder.model_id())?;
        log::info!(
            "Saved index with {} vectors to {}",
            index.len(),
            storage.path().display()
        );
        Ok(())
    }

    /// Embed `query` and return the nearest paragraphs, closest first.
    pub fn search(
        &self,
        index: &VectorIndex,
        corpus: &Corpus,
        query: &str,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let query_vector = self
            .embedder
            .embed(&[query])?
            .into_iter()
            .next()
            .ok_or(PipelineError::MisalignedEmbeddings {
                expected: 1,
                got: 0,
            })?;

        index
            .search(&[query_vector], self.options.k)?
            .into_iter()
            .flatten()
            .map(|neighbor| {
                let paragraph = corpus.paragraphs.get(neighbor.position).ok_or(
                    PipelineError::MisalignedEmbeddings {
                        expected: index.len(),
                        got: corpus.len(),
                    },
                )?;
                Ok(SearchHit {
                    position: neighbor.position,
                    distance: neighbor.distance,
                    paragraph: paragraph.clone(),
                })
            })
            .collect()
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("embedding {bar:40} {pos}/{len} paragraphs ({eta})")
        {
            bar.set_style(style);
        }
        bar
    }
}

/// Regular files of `dir`, sorted by file name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let read_err = |source| PipelineError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() {
            files.push(path);
        } else {
            log::debug!("Ignoring non-file entry {}", path.display());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
