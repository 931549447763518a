//! Blocking client for the control port
//!
//! Every call is a fresh connection: connect, send one line, read one
//! reply line, close. There is no pooling and no retry; callers keep their
//! own cached value when a call fails.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::ControlError;

/// Default limit for connecting and for waiting on a reply
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ControlClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// One round trip; returns the first reply line without its line ending
    ///
    /// An empty reply is an error.
    pub fn send_line(&self, line: &str) -> Result<String, ControlError> {
        let mut stream = self.connect()?;

        let mut msg = String::with_capacity(line.len() + 1);
        msg.push_str(line);
        msg.push('\n');
        stream
            .write_all(msg.as_bytes())
            .map_err(|e| ControlError::SendFailed(e.to_string()))?;

        // Newline- or EOF-terminated; bytes that are not UTF-8 are kept as U+FFFD
        let mut raw = Vec::new();
        BufReader::new(&stream)
            .read_until(b'\n', &mut raw)
            .map_err(|e| ControlError::ReceiveFailed(e.to_string()))?;

        let reply = String::from_utf8_lossy(&raw);
        let reply = reply.trim_end_matches('\n').trim_end_matches('\r');
        if reply.is_empty() {
            return Err(ControlError::EmptyReply);
        }
        Ok(reply.to_string())
    }

    /// Send `F <hz>`
    ///
    /// Any non-empty reply counts as success, not only `OK <hz>`.
    pub fn set_hardware_frequency(&self, hz: i64) -> Result<(), ControlError> {
        let reply = self.send_line(&format!("F {hz}"))?;
        tracing::debug!(hz, %reply, "hardware frequency set");
        Ok(())
    }

    /// Send `f` and parse the number in the reply
    pub fn hardware_frequency(&self) -> Result<i64, ControlError> {
        let reply = self.send_line("f")?;
        parse_leading_int(&reply).ok_or(ControlError::MalformedReply(reply))
    }

    /// Send `t`; `true` means transmitting
    pub fn ptt(&self) -> Result<bool, ControlError> {
        let reply = self.send_line("t")?;
        match reply.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(ControlError::MalformedReply(reply)),
        }
    }

    /// Send `T <0|1>`; requires an `OK` reply
    pub fn set_ptt(&self, tx: bool) -> Result<(), ControlError> {
        let reply = self.send_line(if tx { "T 1" } else { "T 0" })?;
        if reply.starts_with("OK") {
            Ok(())
        } else {
            Err(ControlError::MalformedReply(reply))
        }
    }

    fn connect(&self) -> Result<TcpStream, ControlError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ControlError::Resolve(format!("{}: {}", self.host, e)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
                        .map_err(|e| ControlError::ConnectionFailed(e.to_string()))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => ControlError::ConnectionFailed(format!("{}:{}: {}", self.host, self.port, e)),
            None => ControlError::Resolve(format!("{}: no addresses", self.host)),
        })
    }
}

/// Integer at the start of `s`, after optional whitespace and sign
fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}
