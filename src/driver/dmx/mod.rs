pub mod prelude;
pub mod universe;
pub mod dmx_bus;
pub mod dmx_thread;
