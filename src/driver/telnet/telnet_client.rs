//! persistent telnet session client for the video codec
//! design
//! - the device gives no framing guarantee, reads accumulate into a buffer and
//!   search for the expected marker
//! - the transport takes one command at a time, the session lock is held for
//!   the whole request/response exchange
//! - a broken session is torn down and rebuilt on the next call, callers only
//!   ever observe None, never a connection error

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::protocol::{self, COMMAND_PROMPT, LOGIN_PROMPT, PASSWORD_PROMPT};
use crate::common::error::DriverError;
use crate::{debug, info, warn};

const LOG_TAG: &str = "telnet_client";

// whole login sequence must finish inside this window
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
// one command round trip
const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);
// socket level poll granularity inside the marker reads
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetSessionStateEnum {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

struct TelnetSession {
    stream: Option<TcpStream>,
    state: TelnetSessionStateEnum,
}

pub struct TelnetClient {
    host: String,
    port: u16,
    username: String,
    password: String,
    session: Mutex<TelnetSession>,
}

impl TelnetClient {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        TelnetClient {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            session: Mutex::new(TelnetSession {
                stream: None,
                state: TelnetSessionStateEnum::Disconnected,
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.session.lock().unwrap().state == TelnetSessionStateEnum::Ready
    }

    /// open and authenticate the session
    pub fn connect(&self) -> Result<(), DriverError> {
        let mut session = self.session.lock().unwrap();
        self.connect_session(&mut session)
    }

    /// drop the transport, the next command will reconnect
    pub fn disconnect(&self) {
        let mut session = self.session.lock().unwrap();
        self.teardown(&mut session);
    }

    /// run one command against the device
    /// returns the parsed value, "OK" for a bare success, None when the device
    /// is unreachable or answered with an error
    pub fn send_command(&self, cmd: &str) -> Option<String> {
        let mut session = self.session.lock().unwrap();

        if session.state != TelnetSessionStateEnum::Ready {
            if let Err(e) = self.connect_session(&mut session) {
                warn!(LOG_TAG, "device {}:{} not reachable, msg: {}", self.host, self.port, e);
                return None;
            }
        }

        match self.exchange(&mut session, cmd) {
            Ok(raw) => protocol::parse_response(&raw),
            Err(e) => {
                // stale session, rebuild once and retry before giving up
                debug!(LOG_TAG, "command {:?} failed on live session, msg: {}", cmd, e);
                self.teardown(&mut session);
                if let Err(e) = self.connect_session(&mut session) {
                    warn!(LOG_TAG, "reconnect to {}:{} failed, msg: {}", self.host, self.port, e);
                    return None;
                }
                match self.exchange(&mut session, cmd) {
                    Ok(raw) => protocol::parse_response(&raw),
                    Err(e) => {
                        warn!(LOG_TAG, "command {:?} failed after reconnect, msg: {}", cmd, e);
                        self.teardown(&mut session);
                        None
                    }
                }
            }
        }
    }

    /// one shot command for a device restart
    /// the connection is expected to drop before a response arrives, so the
    /// write alone counts as success and the session always ends disconnected
    pub fn send_reboot(&self, cmd: &str) -> bool {
        let mut session = self.session.lock().unwrap();

        if session.state != TelnetSessionStateEnum::Ready {
            if let Err(e) = self.connect_session(&mut session) {
                warn!(LOG_TAG, "device {}:{} not reachable for reboot, msg: {}", self.host, self.port, e);
                return false;
            }
        }

        let written = match session.stream.as_mut() {
            Some(stream) => write_line(stream, cmd).is_ok(),
            None => false,
        };
        if written {
            // drain whatever the device manages to send while going down
            if let Some(stream) = session.stream.as_mut() {
                let _ = read_response_line(stream);
            }
            info!(LOG_TAG, "reboot issued to {}:{}", self.host, self.port);
        }
        self.teardown(&mut session);
        written
    }

    fn connect_session(&self, session: &mut TelnetSession) -> Result<(), DriverError> {
        self.teardown(session);
        session.state = TelnetSessionStateEnum::Connecting;
        let deadline = Instant::now() + CONNECT_TIMEOUT;

        let mut stream = match self.open_stream() {
            Ok(stream) => stream,
            Err(e) => {
                session.state = TelnetSessionStateEnum::Disconnected;
                return Err(e);
            }
        };

        session.state = TelnetSessionStateEnum::Authenticating;
        if let Err(e) = self.authenticate(&mut stream, deadline) {
            session.state = TelnetSessionStateEnum::Disconnected;
            return Err(e);
        }

        session.stream = Some(stream);
        session.state = TelnetSessionStateEnum::Ready;
        info!(LOG_TAG, "session ready, device: {}:{}", self.host, self.port);
        Ok(())
    }

    fn open_stream(&self) -> Result<TcpStream, DriverError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| DriverError(format!("telnet client: cannot resolve {}:{}, msg: {}", self.host, self.port, e)))?
            .next()
            .ok_or_else(|| DriverError(format!("telnet client: no address for {}:{}", self.host, self.port)))?;

        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| DriverError(format!("telnet client: connect to {}:{} failed, msg: {}", self.host, self.port, e)))?;
        stream
            .set_read_timeout(Some(READ_POLL_TIMEOUT))
            .map_err(|e| DriverError(format!("telnet client: cannot set read timeout, msg: {}", e)))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// interactive login: login: -> username -> Password: -> password -> prompt
    fn authenticate(&self, stream: &mut TcpStream, deadline: Instant) -> Result<(), DriverError> {
        read_until_marker(stream, LOGIN_PROMPT, deadline)?;
        write_line(stream, &self.username)?;
        read_until_marker(stream, PASSWORD_PROMPT, deadline)?;
        write_line(stream, &self.password)?;
        let prompt = COMMAND_PROMPT.to_string();
        read_until_marker(stream, &prompt, deadline)?;
        Ok(())
    }

    fn exchange(&self, session: &mut TelnetSession, cmd: &str) -> Result<String, DriverError> {
        let stream = session
            .stream
            .as_mut()
            .ok_or_else(|| DriverError("telnet client: no live stream".to_string()))?;
        write_line(stream, cmd)?;
        read_response_line(stream)
    }

    fn teardown(&self, session: &mut TelnetSession) {
        if let Some(stream) = session.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        session.state = TelnetSessionStateEnum::Disconnected;
    }
}

fn write_line(stream: &mut TcpStream, line: &str) -> Result<(), DriverError> {
    stream
        .write_all(format!("{}\n", line).as_bytes())
        .map_err(|e| DriverError(format!("telnet client: write failed, msg: {}", e)))?;
    stream
        .flush()
        .map_err(|e| DriverError(format!("telnet client: flush failed, msg: {}", e)))
}

/// accumulate input until the marker shows up anywhere in the buffer
fn read_until_marker(stream: &mut TcpStream, marker: &str, deadline: Instant) -> Result<String, DriverError> {
    let mut buffer = String::new();
    let mut chunk = [0u8; 256];
    loop {
        if buffer.contains(marker) {
            return Ok(buffer);
        }
        if Instant::now() >= deadline {
            return Err(DriverError(format!("telnet client: timed out waiting for {:?}", marker)));
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Err(DriverError("telnet client: connection closed by peer".to_string())),
            Ok(n) => buffer.push_str(&String::from_utf8_lossy(&chunk[..n])),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(DriverError(format!("telnet client: read failed, msg: {}", e))),
        }
    }
}

/// one response line, complete at a newline or at the prompt character
fn read_response_line(stream: &mut TcpStream) -> Result<String, DriverError> {
    let deadline = Instant::now() + COMMAND_TIMEOUT;
    let mut buffer = String::new();
    let mut chunk = [0u8; 256];
    loop {
        if buffer.contains('\n') || buffer.contains(COMMAND_PROMPT) {
            return Ok(buffer);
        }
        if Instant::now() >= deadline {
            return Err(DriverError("telnet client: timed out waiting for response".to_string()));
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Err(DriverError("telnet client: connection closed by peer".to_string())),
            Ok(n) => buffer.push_str(&String::from_utf8_lossy(&chunk[..n])),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(DriverError(format!("telnet client: read failed, msg: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    /// run the interactive login against one accepted connection
    fn serve_login(stream: &mut TcpStream) -> BufReader<TcpStream> {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        stream.write_all(b"login: ").unwrap();
        reader.read_line(&mut line).unwrap();
        stream.write_all(b"Password: ").unwrap();
        line.clear();
        reader.read_line(&mut line).unwrap();
        stream.write_all(b"> ").unwrap();
        reader
    }

    /// answer commands until the client hangs up
    fn serve_commands(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>) {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let reply = match line.trim() {
                "Audio get volume" => "+OK {\"value\":42}\r\n> ",
                "DEVICE get version" => "+OK {\"value\":\"ce 9.15.3\"}\r\n> ",
                "Audio set mute on" => "+OK\r\n> ",
                "DEVICE frobnicate" => "-ERR unknown command\r\n> ",
                _ => "+OK\r\n> ",
            };
            stream.write_all(reply.as_bytes()).unwrap();
        }
    }

    fn spawn_codec(listener: TcpListener) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = serve_login(&mut stream);
            serve_commands(&mut stream, &mut reader);
        })
    }

    #[test]
    fn test_command_round_trip() {
        let _ = init_logger();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = spawn_codec(listener);

        let client = TelnetClient::new("127.0.0.1", port, "admin", "secret");
        assert_eq!(client.send_command("Audio get volume"), Some("42".to_string()));
        assert_eq!(client.send_command("DEVICE get version"), Some("ce 9.15.3".to_string()));
        assert_eq!(client.send_command("Audio set mute on"), Some("OK".to_string()));
        // a device error is a None result, the session stays up
        assert_eq!(client.send_command("DEVICE frobnicate"), None);
        assert!(client.is_ready());

        client.disconnect();
        assert!(!client.is_ready());
        handle.join().unwrap();
    }

    #[test]
    fn test_reconnect_after_socket_drop() {
        let _ = init_logger();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            // first session authenticates, then the socket is dropped hard
            let (mut stream, _) = listener.accept().unwrap();
            let _reader = serve_login(&mut stream);
            drop(stream);
            // second session works normally
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = serve_login(&mut stream);
            serve_commands(&mut stream, &mut reader);
        });

        let client = TelnetClient::new("127.0.0.1", port, "admin", "secret");
        client.connect().unwrap();
        assert!(client.is_ready());
        thread::sleep(Duration::from_millis(100));

        // the dead session is rebuilt inside the same call
        assert_eq!(client.send_command("Audio get volume"), Some("42".to_string()));

        client.disconnect();
        handle.join().unwrap();
    }

    #[test]
    fn test_unreachable_device_returns_none() {
        let _ = init_logger();
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = TelnetClient::new("127.0.0.1", port, "admin", "secret");
        assert_eq!(client.send_command("DEVICE get version"), None);
        assert!(!client.is_ready());
    }

    #[test]
    fn test_reboot_always_disconnects() {
        let _ = init_logger();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = serve_login(&mut stream);
            // read the reboot command, then go down without answering
            let mut line = String::new();
            let _ = reader.read_line(&mut line);
            drop(stream);
        });

        let client = TelnetClient::new("127.0.0.1", port, "admin", "secret");
        client.connect().unwrap();
        assert!(client.send_reboot("DEVICE reboot"));
        assert!(!client.is_ready());
        handle.join().unwrap();
    }
}
