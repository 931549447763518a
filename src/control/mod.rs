//! Tuning and PTT control over the loopback text protocol

pub mod client;
pub mod driver;
pub mod protocol;
pub mod server;
pub mod state;

pub use client::ControlClient;
pub use driver::{RadioDriver, SimulatedDriver};
pub use protocol::{parse_line, Command, Rejection, Reply};
pub use server::ControlServer;
pub use state::{RadioController, RadioState};
