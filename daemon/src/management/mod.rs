pub mod comm;
pub mod config;
pub mod inst_config;
pub mod instance;
pub mod manager;
pub mod minecraft;
pub mod summary;
