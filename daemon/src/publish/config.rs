use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub enabled: bool,
    /// 每条消息保存为 `<channel_dir>/<id>.md`
    pub channel_dir: PathBuf,
    pub state_file: PathBuf,
    pub show_updated_at: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_dir: PathBuf::from("status"),
            state_file: PathBuf::from("message_id.json"),
            show_updated_at: true,
        }
    }
}
