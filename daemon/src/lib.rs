pub mod app;
pub mod config;
pub mod drivers;
pub mod management;
pub mod publish;
pub mod storage;

#[cfg(test)]
mod testing;
