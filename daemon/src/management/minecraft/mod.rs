mod rcon_client;

pub use rcon_client::*;
