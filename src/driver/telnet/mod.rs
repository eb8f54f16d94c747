pub mod protocol;
pub mod telnet_client;
