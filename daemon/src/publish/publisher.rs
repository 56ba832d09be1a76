use crate::publish::channel::{ChannelError, MessageChannel};
use crate::publish::config::PublisherConfig;
use crate::publish::FileChannel;
use crate::storage::{FileIoWithBackup, JsonFile};
use anyhow::Context;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted between runs so the same message keeps being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishState {
    pub message_id: Option<u64>,
}

impl FileIoWithBackup for PublishState {}

impl JsonFile for PublishState {}

/// Pushes the summary to a channel whenever it changed since the last push.
pub struct Publisher {
    channel: Box<dyn MessageChannel>,
    state_file: PathBuf,
    show_updated_at: bool,
    message_id: Option<u64>,
    previous: Option<String>,
}

impl Publisher {
    pub fn new(
        channel: Box<dyn MessageChannel>,
        state_file: impl Into<PathBuf>,
        show_updated_at: bool,
    ) -> Self {
        let state_file = state_file.into();
        let message_id = match PublishState::load(&state_file) {
            Ok(state) => state.message_id,
            Err(err) if is_not_found(&err) => None,
            Err(err) => {
                warn!("{:#}, a new message will be created", err);
                None
            }
        };
        Self {
            channel,
            state_file,
            show_updated_at,
            message_id,
            previous: None,
        }
    }

    pub fn from_config(config: &PublisherConfig) -> Self {
        Self::new(
            Box::new(FileChannel::new(&config.channel_dir)),
            &config.state_file,
            config.show_updated_at,
        )
    }

    pub fn message_id(&self) -> Option<u64> {
        self.message_id
    }

    /// Returns `Ok(true)` when something was pushed.
    pub async fn publish(&mut self, summary: &str) -> anyhow::Result<bool> {
        if self.previous.as_deref() == Some(summary) {
            return Ok(false);
        }

        let content = self.decorate(summary);
        let edited = match self.message_id {
            Some(id) => match self.channel.edit(id, &content).await {
                Ok(()) => true,
                Err(ChannelError::NotFound(id)) => {
                    info!("message {} is gone, sending a new one", id);
                    false
                }
                Err(err) => return Err(err).context("failed to edit status message"),
            },
            None => false,
        };

        if edited {
            info!("status message updated");
        } else {
            let id = self
                .channel
                .send(&content)
                .await
                .context("failed to send status message")?;
            self.message_id = Some(id);
            PublishState {
                message_id: Some(id),
            }
            .save(&self.state_file)?;
            info!("status message {} created", id);
        }

        self.previous = Some(summary.to_owned());
        Ok(true)
    }

    fn decorate(&self, summary: &str) -> String {
        if self.show_updated_at {
            format!(
                "{}\n\n最後更新: <t:{}:R>",
                summary,
                chrono::Utc::now().timestamp()
            )
        } else {
            summary.to_owned()
        }
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|err| err.kind() == std::io::ErrorKind::NotFound)
}
