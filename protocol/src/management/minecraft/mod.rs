mod player;
pub mod rcon;

pub use player::*;
