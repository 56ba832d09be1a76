use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub trait FileIoWithBackup {
    /// Writes the given content to a file and creates a backup of the file before writing.
    fn write_with_backup<P: AsRef<Path>>(path: P, content: &str) -> Result<(), std::io::Error> {
        let path = path.as_ref();

        if path.exists() {
            std::fs::copy(path, path.with_extension("bak"))?;
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
    }
}

/// JSON document persisted next to the daemon (config, publisher state).
pub trait JsonFile: FileIoWithBackup + Serialize + DeserializeOwned + Sized {
    fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        Self::write_with_backup(path, &content)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Loads `path`, or writes and returns `default()` when the file is absent.
    fn load_or_default<P: AsRef<Path>, F: FnOnce() -> Self>(
        path: P,
        default: F,
    ) -> anyhow::Result<Self> {
        match std::fs::metadata(path.as_ref()) {
            Ok(metadata) if metadata.is_file() => Self::load(path),
            _ => {
                let value = default();
                value.save(path)?;
                Ok(value)
            }
        }
    }
}
