//! Line protocol of the control port
//!
//! One ASCII command per line:
//!
//! | Line      | Reply                                    |
//! |-----------|------------------------------------------|
//! | `f`       | `<hz>`                                   |
//! | `F <hz>`  | `OK <hz>`, `ERR missing`, `ERR range`    |
//! | `t`       | `0` or `1`                               |
//! | `T <0|1>` | `OK <0|1>`, `ERR arg`                    |
//! | other     | `ERR unknown`                            |

use std::fmt;

use crate::constants::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};

/// A well-formed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetFrequency,
    SetFrequency(u32),
    GetPtt,
    SetPtt(bool),
}

/// Why a line was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// `F` without an argument
    Missing,
    /// Frequency outside the tunable range
    Range,
    /// `T` argument other than `0` or `1`
    Arg,
    Unknown,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Missing => "missing",
            Rejection::Range => "range",
            Rejection::Arg => "arg",
            Rejection::Unknown => "unknown",
        }
    }
}

/// Server answer to one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Frequency(u32),
    Ptt(bool),
    FrequencySet(u32),
    PttSet(bool),
    Error(Rejection),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Frequency(hz) => write!(f, "{hz}"),
            Reply::Ptt(tx) => write!(f, "{}", u8::from(*tx)),
            Reply::FrequencySet(hz) => write!(f, "OK {hz}"),
            Reply::PttSet(tx) => write!(f, "OK {}", u8::from(*tx)),
            Reply::Error(reason) => write!(f, "ERR {}", reason.as_str()),
        }
    }
}

impl Reply {
    /// Wire form including the terminating newline
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

/// Parse one received line
///
/// Returns `None` for a blank line, which gets no reply at all.
pub fn parse_line(line: &str) -> Option<Result<Command, Rejection>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    let parsed = match line {
        "f" => Ok(Command::GetFrequency),
        "t" => Ok(Command::GetPtt),
        _ if line.starts_with('F') => parse_set_frequency(argument(&line[1..])),
        _ if line.starts_with('T') => parse_set_ptt(argument(&line[1..])),
        _ => Err(Rejection::Unknown),
    };
    Some(parsed)
}

/// Skip the blanks between verb and argument; `F14234000` is accepted too
fn argument(rest: &str) -> &str {
    rest.trim_start_matches([' ', '\t'])
}

fn parse_set_frequency(arg: &str) -> Result<Command, Rejection> {
    if arg.is_empty() {
        return Err(Rejection::Missing);
    }

    // Leading digits only; anything without digits reads as zero
    let hz = leading_digits(arg);
    if hz < MIN_FREQUENCY_HZ as u64 || hz > MAX_FREQUENCY_HZ as u64 {
        return Err(Rejection::Range);
    }
    Ok(Command::SetFrequency(hz as u32))
}

fn parse_set_ptt(arg: &str) -> Result<Command, Rejection> {
    match arg.trim_end() {
        "0" => Ok(Command::SetPtt(false)),
        "1" => Ok(Command::SetPtt(true)),
        _ => Err(Rejection::Arg),
    }
}

fn leading_digits(s: &str) -> u64 {
    s.bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, d| {
            acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
        })
}
