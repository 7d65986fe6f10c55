use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions picked up when scanning a sample directory
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["wav", "flac", "aif", "aiff"];

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("could not read sample directory {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("no samples in {}", .0.display())]
    Empty(PathBuf),
    #[error("sample {0} does not exist")]
    NotFound(String),
}

/// Known samples, keyed by file name without extension.
///
/// Backed by a `BTreeMap` so listings come out sorted and stable for the
/// lifetime of the server.
#[derive(Debug, Clone, Default)]
pub struct SamplePool {
    pool: BTreeMap<String, PathBuf>,
}

impl SamplePool {
    /// Scan the top level of `dir` for supported audio files.
    pub fn scan(dir: &Path) -> Result<Self, SampleError> {
        let unreadable = |source| SampleError::Unreadable {
            path: dir.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(dir).map_err(unreadable)?;
        if !metadata.is_dir() {
            return Err(SampleError::NotADirectory(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(unreadable)? {
            let path = entry.map_err(unreadable)?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        // on a name collision the first path in sorted order wins
        paths.sort();

        let mut pool = BTreeMap::new();
        for path in paths {
            if let Some(name) = sample_name(&path) {
                pool.entry(name).or_insert(path);
            }
        }
        if pool.is_empty() {
            return Err(SampleError::Empty(dir.to_path_buf()));
        }

        tracing::info!(count = pool.len(), dir = %dir.display(), "loaded samples");
        Ok(Self { pool })
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Sample names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.pool.keys().cloned().collect()
    }

    pub fn resolve(&self, name: &str) -> Result<&Path, SampleError> {
        self.pool
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| SampleError::NotFound(name.to_string()))
    }
}

impl FromIterator<(String, PathBuf)> for SamplePool {
    fn from_iter<I: IntoIterator<Item = (String, PathBuf)>>(iter: I) -> Self {
        Self {
            pool: iter.into_iter().collect(),
        }
    }
}

/// Base name without extension, if the extension is supported.
fn sample_name(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !SUPPORTED_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}
