pub mod telnet;
pub mod dmx;
pub mod http;
