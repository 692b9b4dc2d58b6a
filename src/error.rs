use std::{
  error::Error,
  fmt::{Debug, Display},
  process::{ExitCode, Termination},
};

use flexi_logger::FlexiLoggerError;
use nix::{errno::Errno, libc::STDOUT_FILENO, unistd::isatty};

pub enum SandboxError {
  Spawn(String),
  Cgroup(String),
  Isolate(String),
  Exec(String),
  Nix(Errno),
  Fs(String),
  Record(String),
  Logger(FlexiLoggerError),
}

pub enum SandboxExit {
  Ok,
  Err(SandboxError),
}

impl SandboxError {
  pub fn spawn<MS: Into<String>>(msg: MS) -> SandboxError {
    SandboxError::Spawn(msg.into())
  }

  pub fn cgroup<MS: Into<String>>(msg: MS) -> SandboxError {
    SandboxError::Cgroup(msg.into())
  }

  pub fn isolate<MS: Into<String>>(msg: MS) -> SandboxError {
    SandboxError::Isolate(msg.into())
  }

  pub fn exec<MS: Into<String>>(msg: MS) -> SandboxError {
    SandboxError::Exec(msg.into())
  }

  pub fn record<MS: Into<String>>(msg: MS) -> SandboxError {
    SandboxError::Record(msg.into())
  }
}

impl Debug for SandboxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for SandboxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      SandboxError::Spawn(msg) => f.write_fmt(format_args!("Snowbox Spawn Error: {}", msg)),
      SandboxError::Cgroup(msg) => f.write_fmt(format_args!("Snowbox Cgroup Error: {}", msg)),
      SandboxError::Isolate(msg) => f.write_fmt(format_args!("Snowbox Isolate Error: {}", msg)),
      SandboxError::Exec(msg) => f.write_fmt(format_args!("Snowbox Exec Error: {}", msg)),
      SandboxError::Nix(errno) => f.write_fmt(format_args!("Snowbox Nix Error: {}", errno)),
      SandboxError::Fs(msg) => f.write_fmt(format_args!("Snowbox File System Error: {}", msg)),
      SandboxError::Record(msg) => f.write_fmt(format_args!("Snowbox Record Error: {}", msg)),
      SandboxError::Logger(err) => f.write_fmt(format_args!("Snowbox Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for SandboxError {
  fn from(errno: Errno) -> Self {
    SandboxError::Nix(errno)
  }
}

impl From<std::io::Error> for SandboxError {
  fn from(err: std::io::Error) -> Self {
    SandboxError::Fs(err.to_string())
  }
}

impl From<FlexiLoggerError> for SandboxError {
  fn from(err: FlexiLoggerError) -> Self {
    SandboxError::Logger(err)
  }
}

impl From<serde_json::Error> for SandboxError {
  fn from(err: serde_json::Error) -> Self {
    SandboxError::Record(err.to_string())
  }
}

impl Error for SandboxError {}

impl Termination for SandboxExit {
  fn report(self) -> ExitCode {
    match self {
      SandboxExit::Ok => ExitCode::SUCCESS.report(),
      SandboxExit::Err(err) => {
        let text = format!("{}", err);
        let text = match text.split_once(": ") {
          Some((prefix, message)) => {
            let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
            if is_tty {
              format!("\x1b[1m\x1b[91m{}\x1b[39m\x1b[22m  {}", prefix, message)
            } else {
              format!(
                "{{\n  \"ok\": false,\n  \"type\": \"{}\",\n  \"message\": \"{}\"\n}}",
                prefix, message
              )
            }
          }
          None => {
            format!("{}", err)
          }
        };
        eprintln!("{}", text);
        ExitCode::FAILURE.report()
      }
    }
  }
}
