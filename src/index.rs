//! On-disk vector index: chunk metadata plus row-aligned embedding vectors.
//!
//! The offline index build writes two JSONL files: `meta.jsonl` with one
//! chunk record per line (`text`, `source`, `page`) and `vectors.jsonl` with
//! one embedding per line, row-aligned with the metadata. Vectors are
//! L2-normalized on load so inner product equals cosine similarity, and the
//! whole index is held in memory for brute-force search.
//!
//! Loading happens lazily on first use and runs on the blocking thread pool,
//! so a cold `/ask` cannot stall health probes sharing the async runtime.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::config::IndexConfig;
use crate::error::AppError;

/// One indexed document chunk, as written by the index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub text: String,
    pub source: String,
    pub page: u32,
}

/// In-memory flat inner-product index.
#[derive(Debug)]
pub struct VectorIndex {
    meta: Vec<ChunkMeta>,
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

impl VectorIndex {
    /// Load and validate the index from its two JSONL files.
    pub fn load(meta_path: &Path, vectors_path: &Path) -> Result<Self, AppError> {
        let meta = read_meta(meta_path)?;
        let mut vectors = read_vectors(vectors_path)?;

        if meta.len() != vectors.len() {
            return Err(AppError::Index(format!(
                "row count mismatch: {} metadata records vs {} vectors",
                meta.len(),
                vectors.len()
            )));
        }
        if meta.is_empty() {
            return Err(AppError::Index("index is empty".to_string()));
        }

        let dim = vectors[0].len();
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(AppError::Index(format!(
                "vector at row {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dim
            )));
        }

        for v in &mut vectors {
            normalize(v);
        }

        Ok(Self { meta, vectors, dim })
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn meta(&self, row: usize) -> &ChunkMeta {
        &self.meta[row]
    }

    pub fn vector(&self, row: usize) -> &[f32] {
        &self.vectors[row]
    }

    /// Brute-force inner-product search, best matches first.
    ///
    /// The query must be normalized by the caller; scores are then cosine
    /// similarities in [-1, 1].
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, AppError> {
        if query.len() != self.dim {
            return Err(AppError::Retrieval(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(row, v)| (row, dot(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Inner product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn read_meta(path: &Path) -> Result<Vec<ChunkMeta>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Index(format!("cannot open {}: {}", path.display(), e)))?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ChunkMeta = serde_json::from_str(&line).map_err(|e| {
            AppError::Index(format!("bad metadata record at line {}: {}", n + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

fn read_vectors(path: &Path) -> Result<Vec<Vec<f32>>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Index(format!("cannot open {}: {}", path.display(), e)))?;
    let mut vectors = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let vector: Vec<f32> = serde_json::from_str(&line)
            .map_err(|e| AppError::Index(format!("bad vector at line {}: {}", n + 1, e)))?;
        vectors.push(vector);
    }
    Ok(vectors)
}

/// Lazily loaded, shared handle to the vector index.
///
/// The index may not exist yet when the process starts (it is built by a
/// separate offline step), so the files are only read on first use. Readiness
/// checks look at file presence without forcing a load.
#[derive(Clone)]
pub struct IndexHandle {
    config: Arc<IndexConfig>,
    cell: Arc<OnceCell<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config: Arc::new(config),
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Whether both index files exist on disk. Cheap; used by readiness.
    pub fn files_present(&self) -> bool {
        self.config.meta_path().is_file() && self.config.vectors_path().is_file()
    }

    /// Get the loaded index, loading it off the async runtime on first call.
    pub async fn get(&self) -> Result<Arc<VectorIndex>, AppError> {
        let index = self
            .cell
            .get_or_try_init(|| async {
                let meta_path = self.config.meta_path();
                let vectors_path = self.config.vectors_path();
                let loaded = tokio::task::spawn_blocking(move || {
                    VectorIndex::load(&meta_path, &vectors_path)
                })
                .await
                .map_err(|e| AppError::Internal(format!("index load task failed: {e}")))??;

                tracing::info!(
                    chunks = loaded.len(),
                    dim = loaded.dim(),
                    "Loaded vector index"
                );
                Ok::<_, AppError>(Arc::new(loaded))
            })
            .await?;
        Ok(index.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_index(dir: &TempDir, meta: &[&str], vectors: &[&str]) -> (std::path::PathBuf, std::path::PathBuf) {
        let meta_path = dir.path().join("meta.jsonl");
        let vectors_path = dir.path().join("vectors.jsonl");
        let mut f = File::create(&meta_path).unwrap();
        for line in meta {
            writeln!(f, "{line}").unwrap();
        }
        let mut f = File::create(&vectors_path).unwrap();
        for line in vectors {
            writeln!(f, "{line}").unwrap();
        }
        (meta_path, vectors_path)
    }

    fn meta_line(source: &str, page: u32) -> String {
        format!(r#"{{"text":"chunk from {source}","source":"{source}","page":{page}}}"#)
    }

    #[test]
    fn test_load_and_search_orders_by_similarity() {
        let dir = TempDir::new().unwrap();
        let meta = [
            meta_line("a.pdf", 1),
            meta_line("b.pdf", 2),
            meta_line("c.pdf", 3),
        ];
        let meta_refs: Vec<&str> = meta.iter().map(String::as_str).collect();
        let (mp, vp) = write_index(
            &dir,
            &meta_refs,
            &["[1.0, 0.0]", "[0.0, 1.0]", "[0.7, 0.7]"],
        );

        let index = VectorIndex::load(&mp, &vp).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dim(), 2);

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_load_rejects_row_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let meta = [meta_line("a.pdf", 1), meta_line("b.pdf", 1)];
        let meta_refs: Vec<&str> = meta.iter().map(String::as_str).collect();
        let (mp, vp) = write_index(&dir, &meta_refs, &["[1.0, 0.0]"]);

        let err = VectorIndex::load(&mp, &vp).unwrap_err();
        assert!(format!("{err}").contains("row count mismatch"));
    }

    #[test]
    fn test_load_rejects_ragged_dimensions() {
        let dir = TempDir::new().unwrap();
        let meta = [meta_line("a.pdf", 1), meta_line("b.pdf", 1)];
        let meta_refs: Vec<&str> = meta.iter().map(String::as_str).collect();
        let (mp, vp) = write_index(&dir, &meta_refs, &["[1.0, 0.0]", "[1.0, 0.0, 0.0]"]);

        assert!(VectorIndex::load(&mp, &vp).is_err());
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let dir = TempDir::new().unwrap();
        let meta = [meta_line("a.pdf", 1)];
        let meta_refs: Vec<&str> = meta.iter().map(String::as_str).collect();
        let (mp, vp) = write_index(&dir, &meta_refs, &["[1.0, 0.0]"]);

        let index = VectorIndex::load(&mp, &vp).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_normalize_handles_zero_vector() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);

        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_handle_reports_missing_files() {
        let dir = TempDir::new().unwrap();
        let handle = IndexHandle::new(IndexConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            meta_file: "meta.jsonl".to_string(),
            vectors_file: "vectors.jsonl".to_string(),
        });
        assert!(!handle.files_present());
        assert!(handle.get().await.is_err());
    }
}
