use log::debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("message {0} no longer exists")]
    NotFound(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Destination of the published summary.
#[async_trait::async_trait]
pub trait MessageChannel: Send + Sync {
    /// Posts a new message and returns its id.
    async fn send(&self, content: &str) -> Result<u64, ChannelError>;

    async fn edit(&self, id: u64, content: &str) -> Result<(), ChannelError>;
}

/// Keeps every message as a markdown file in one directory.
pub struct FileChannel {
    dir: PathBuf,
}

impl FileChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn message_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{}.md", id))
    }
}

#[async_trait::async_trait]
impl MessageChannel for FileChannel {
    async fn send(&self, content: &str) -> Result<u64, ChannelError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut id = chrono::Utc::now().timestamp_millis().max(0) as u64;
        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.message_path(id))
                .await;
            match created {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.flush().await?;
                    debug!("created message {} in {}", id, self.dir.display());
                    return Ok(id);
                }
                // 同一毫秒内已有消息
                Err(err) if err.kind() == ErrorKind::AlreadyExists => id += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn edit(&self, id: u64, content: &str) -> Result<(), ChannelError> {
        let path = self.message_path(id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(ChannelError::NotFound(id));
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn send_then_edit() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(dir.path().join("status"));

        let id = channel.send("first").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(channel.message_path(id)).unwrap(),
            "first"
        );

        channel.edit(id, "second").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(channel.message_path(id)).unwrap(),
            "second"
        );
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(dir.path());
        let a = channel.send("a").await.unwrap();
        let b = channel.send("b").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn editing_missing_message_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(dir.path());
        assert!(matches!(
            channel.edit(42, "x").await,
            Err(ChannelError::NotFound(42))
        ));
    }
}
