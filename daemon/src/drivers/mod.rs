mod driver;
mod fleet;
mod graceful_shutdown;

pub use driver::Driver;
pub use fleet::FleetDriver;
pub use graceful_shutdown::GracefulShutdown;
