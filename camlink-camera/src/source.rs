//! File-backed [`FrameSource`].
//!
//! Source `i` (1-based) is the `i`-th usable configured path. A regular
//! file is served as-is on every capture; a directory serves its `.jpg` /
//! `.jpeg` files in name order, one per capture, wrapping around.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use camlink_core::{CamError, FrameSource, Selection};

/// One configured capture source.
#[derive(Debug)]
enum Source {
    File(PathBuf),
    Sequence {
        frames: Vec<PathBuf>,
        next: AtomicUsize,
    },
}

impl Source {
    fn next_path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Sequence { frames, next } => {
                let i = next.fetch_add(1, Ordering::Relaxed) % frames.len();
                &frames[i]
            }
        }
    }
}

/// Serves frames from files on disk.
#[derive(Debug)]
pub struct FileFrameSource {
    sources: Vec<Source>,
}

impl FileFrameSource {
    /// Probe `paths` and keep the usable ones, up to [`Selection::MAX`].
    ///
    /// Fails with [`CamError::NoSources`] when none is usable.
    pub async fn open(paths: &[PathBuf]) -> Result<Self, CamError> {
        let mut sources = Vec::new();
        for path in paths {
            if sources.len() == usize::from(Selection::MAX) {
                warn!(
                    "ignoring {}: at most {} sources",
                    path.display(),
                    Selection::MAX
                );
                continue;
            }
            match probe(path).await {
                Ok(source) => {
                    info!("source {}: {}", sources.len() + 1, path.display());
                    sources.push(source);
                }
                Err(e) => warn!("skipping source {}: {e}", path.display()),
            }
        }

        if sources.is_empty() {
            return Err(CamError::NoSources);
        }
        Ok(Self { sources })
    }

    /// Number of usable sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

async fn probe(path: &Path) -> Result<Source, CamError> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.is_file() {
        return Ok(Source::File(path.to_path_buf()));
    }
    if !meta.is_dir() {
        return Err(CamError::Other("not a file or directory".into()));
    }

    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let candidate = entry.path();
        if is_jpeg(&candidate) && entry.file_type().await?.is_file() {
            frames.push(candidate);
        }
    }
    if frames.is_empty() {
        return Err(CamError::Other(
            "directory holds no .jpg/.jpeg files".into(),
        ));
    }
    frames.sort();
    debug!("{}: {} frames", path.display(), frames.len());
    Ok(Source::Sequence {
        frames,
        next: AtomicUsize::new(0),
    })
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
        })
}

#[async_trait]
impl FrameSource for FileFrameSource {
    fn sources(&self) -> Vec<Selection> {
        (1..=self.sources.len())
            .filter_map(|i| u8::try_from(i).ok())
            .filter_map(|i| Selection::new(i).ok())
            .collect()
    }

    async fn capture_and_encode(&self, index: Selection) -> Option<Bytes> {
        let source = self.sources.get(usize::from(index.get()) - 1)?;
        let path = source.next_path();
        match tokio::fs::read(path).await {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) => {
                warn!("capture from {} failed: {e}", path.display());
                None
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(i: u8) -> Selection {
        Selection::new(i).unwrap()
    }

    #[tokio::test]
    async fn files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let still = dir.path().join("still.jpg");
        std::fs::write(&still, b"still").unwrap();

        let seq = dir.path().join("seq");
        std::fs::create_dir(&seq).unwrap();
        std::fs::write(seq.join("b.jpeg"), b"two").unwrap();
        std::fs::write(seq.join("a.JPG"), b"one").unwrap();
        std::fs::write(seq.join("notes.txt"), b"skip me").unwrap();

        let source = FileFrameSource::open(&[still, seq]).await.unwrap();
        assert_eq!(source.sources(), vec![sel(1), sel(2)]);

        assert_eq!(source.capture_and_encode(sel(1)).await.unwrap(), "still");
        assert_eq!(source.capture_and_encode(sel(1)).await.unwrap(), "still");

        assert_eq!(source.capture_and_encode(sel(2)).await.unwrap(), "one");
        assert_eq!(source.capture_and_encode(sel(2)).await.unwrap(), "two");
        assert_eq!(source.capture_and_encode(sel(2)).await.unwrap(), "one");

        assert!(source.capture_and_encode(sel(3)).await.is_none());
    }

    #[tokio::test]
    async fn unusable_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        let good = dir.path().join("cam.jpg");
        std::fs::write(&good, b"ok").unwrap();

        let source = FileFrameSource::open(&[dir.path().join("missing.jpg"), empty, good])
            .await
            .unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.capture_and_encode(sel(1)).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn no_usable_path_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileFrameSource::open(&[dir.path().join("nope")])
            .await
            .unwrap_err();
        assert!(matches!(err, CamError::NoSources));

        let err = FileFrameSource::open(&[]).await.unwrap_err();
        assert!(matches!(err, CamError::NoSources));
    }

    #[tokio::test]
    async fn removed_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.jpg");
        std::fs::write(&path, b"x").unwrap();
        let source = FileFrameSource::open(&[path.clone()]).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(source.capture_and_encode(sel(1)).await.is_none());
    }
}
