use crate::config::Config;
use crate::embedder::{Embedder, embed_in_batches};
use crate::indexer::ParserError;
use crate::indexer::chunker::Chunker;
use crate::indexer::enricher::MetadataEnricher;
use crate::indexer::segmenter::{Segmenter, StructuralUnit};
use crate::store::{IndexError, VectorIndex};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

/// Totals for one directory scan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files_parsed: usize,
    pub files_failed: usize,
    pub dirs_skipped: usize,
    pub units: usize,
    pub chunks: usize,
}

pub struct Indexer<'a, E: Embedder + ?Sized> {
    index: &'a mut VectorIndex,
    embedder: &'a E,
    segmenter: Segmenter,
    enricher: MetadataEnricher,
    chunker: Chunker,
    batch_size: usize,
    skip_dirs: Arc<Vec<String>>,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(
        index: &'a mut VectorIndex,
        embedder: &'a E,
        config: &Config,
    ) -> Result<Self, ParserError> {
        Ok(Self {
            index,
            embedder,
            segmenter: Segmenter::new()?,
            enricher: MetadataEnricher::new()?,
            chunker: Chunker::new(config.chunk_size, config.chunk_overlap)
                .with_content(config.store_content),
            batch_size: config.embedding.batch_size,
            skip_dirs: Arc::new(config.skip_dirs.clone()),
        })
    }

    /// Checks if a file extension is supported
    fn is_supported_extension(ext: &str) -> bool {
        ext == "py"
    }

    /// Index every Python file under `dir`.
    ///
    /// Directories named in `skip_dirs` are pruned wherever they appear below
    /// `dir`. A file that cannot be read or stored is logged and counted in
    /// [`IndexReport::files_failed`]; the scan carries on with its siblings.
    pub fn index_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<IndexReport> {
        let dir = dir.as_ref();
        anyhow::ensure!(dir.is_dir(), "{} is not a directory", dir.display());
        info!("Indexing Python files under {}", dir.display());

        let skipped = Arc::new(AtomicUsize::new(0));
        let walker = {
            let skip_dirs = Arc::clone(&self.skip_dirs);
            let skipped = Arc::clone(&skipped);
            WalkBuilder::new(dir)
                .standard_filters(false)
                .sort_by_file_name(|a, b| a.cmp(b))
                .filter_entry(move |entry| {
                    let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                    if !is_dir || entry.depth() == 0 {
                        return true;
                    }
                    let name = entry.file_name().to_string_lossy();
                    if skip_dirs.iter().any(|s| *s == name) {
                        debug!("Skipping directory {}", entry.path().display());
                        skipped.fetch_add(1, Ordering::Relaxed);
                        return false;
                    }
                    true
                })
                .build()
        };

        let mut report = IndexReport::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to walk entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if !Self::is_supported_extension(ext) {
                continue;
            }

            match self.index_file(path) {
                Ok((units, chunks)) => {
                    report.files_parsed += 1;
                    report.units += units;
                    report.chunks += chunks;
                }
                Err(e) => {
                    error!("Failed to index {}: {e:#}", path.display());
                    report.files_failed += 1;
                }
            }
        }
        report.dirs_skipped = skipped.load(Ordering::Relaxed);

        info!(
            "Indexed {} files ({} failed, {} directories skipped): {} units, {} chunks",
            report.files_parsed,
            report.files_failed,
            report.dirs_skipped,
            report.units,
            report.chunks
        );
        Ok(report)
    }

    /// Segment, enrich, chunk, embed and store one file. Returns the number of
    /// units and chunks it produced.
    pub fn index_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(usize, usize)> {
        let path = path.as_ref();
        let units = self.segmenter.parse_file(path)?;
        let unit_count = units.len();
        let chunks = self
            .index_units(units)
            .with_context(|| format!("storing chunks of {}", path.display()))?;
        Ok((unit_count, chunks))
    }

    /// Drive already-segmented units into the index; returns the chunk count.
    pub fn index_units(&mut self, units: Vec<StructuralUnit>) -> Result<usize, IndexError> {
        let enriched = self.enricher.enrich_all(units);
        let chunks = self.chunker.chunk_all(&enriched);
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embed_in_batches(self.embedder, &texts, self.batch_size);
        self.index
            .add(&chunks, &vectors, self.embedder.dimensions())?;
        Ok(chunks.len())
    }
}
