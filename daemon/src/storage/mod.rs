pub mod file;

pub use file::{FileIoWithBackup, JsonFile};
