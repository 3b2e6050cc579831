pub mod cli;
pub mod client;
pub mod command;
pub mod protocol;
pub mod record;

pub use cli::{Command, prompt};
pub use client::{ClientConfig, ClientError, PotholeClient};
pub use command::{CommandError, CommandKind, Request};
pub use record::PotholeRecord;
