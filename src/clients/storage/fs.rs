//! Directory-backed object store for local runs.
//!
//! Objects live at `<root>/<bucket>/<key>`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::clients::storage::{ObjectReader, ObjectStore};
use crate::clients::ClientError;

#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
    closed: AtomicBool,
}

impl FileObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            closed: AtomicBool::new(false),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ClientError> {
        for part in [bucket, key] {
            let escapes = Path::new(part)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
            if part.is_empty() || escapes {
                return Err(ClientError::InvalidRequest(format!("invalid object path '{part}'")));
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn open_reader(&self, bucket: &str, key: &str) -> Result<ObjectReader, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let path = self.object_path(bucket, key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ClientError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        Ok(ObjectReader::new(file).with_size(Some(size)))
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
