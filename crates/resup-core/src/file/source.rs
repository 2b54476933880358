//! Source file metadata and the lazily opened shared read handle.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::chunk::ChunkRange;

/// What the wire protocol needs to know about a registered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub identifier: String,
    /// Path as given at registration; sent as the relative path.
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

/// Owns the read handle for one file. Chunks only hold a `Weak` to it and
/// read through explicit offsets, so concurrent reads never share a cursor.
#[derive(Debug)]
pub(crate) struct FileSource {
    meta: FileMeta,
    handle: OnceCell<Arc<File>>,
}

impl FileSource {
    pub fn new(meta: FileMeta) -> Self {
        Self {
            meta,
            handle: OnceCell::new(),
        }
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    /// Opened on first use; later callers reuse the same handle.
    async fn handle(&self) -> io::Result<Arc<File>> {
        self.handle
            .get_or_try_init(|| async {
                let path = self.meta.path.clone();
                let file = tokio::task::spawn_blocking(move || File::open(path))
                    .await
                    .map_err(io::Error::other)??;
                Ok::<_, io::Error>(Arc::new(file))
            })
            .await
            .cloned()
    }

    /// Read exactly the bytes of `range`.
    pub async fn read_range(&self, range: ChunkRange) -> io::Result<Vec<u8>> {
        let file = self.handle().await?;
        tokio::task::spawn_blocking(move || read_at(&file, range))
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(unix)]
fn read_at(file: &File, range: ChunkRange) -> io::Result<Vec<u8>> {
    use std::os::unix::fs::FileExt;
    let mut buf = vec![0u8; range.len() as usize];
    file.read_exact_at(&mut buf, range.start)?;
    Ok(buf)
}

#[cfg(not(unix))]
fn read_at(file: &File, range: ChunkRange) -> io::Result<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};
    let mut buf = vec![0u8; range.len() as usize];
    let mut f = file;
    f.seek(SeekFrom::Start(range.start))?;
    f.read_exact(&mut buf)?;
    Ok(buf)
}
