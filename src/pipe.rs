use std::os::unix::prelude::RawFd;

use nix::{
  errno::Errno,
  fcntl::OFlag,
  unistd::{self, close, pipe2},
};

use crate::error::SandboxError;

/// A pipe crossing the isolation boundary.
///
/// Two are used per run: one carries the single serialized result
/// record from the supervisor back to the launcher, the other carries
/// the one-byte readiness signal telling the supervisor that resource
/// limits are attached.
pub struct SandboxPipe(RawFd, RawFd);

pub struct PipeReader(RawFd);

pub struct PipeWriter(RawFd);

impl SandboxPipe {
  pub fn new() -> Result<Self, SandboxError> {
    let result = pipe2(OFlag::O_CLOEXEC)?;
    Ok(SandboxPipe(result.0, result.1))
  }

  pub fn split(self) -> (PipeReader, PipeWriter) {
    (PipeReader(self.0), PipeWriter(self.1))
  }
}

impl PipeReader {
  /// Adopt an inherited descriptor on the other side of a boundary
  pub(crate) fn from_raw(fd: RawFd) -> Self {
    PipeReader(fd)
  }

  pub fn raw(&self) -> RawFd {
    self.0
  }

  /// Read until the write side is fully closed.
  pub fn read_to_string(&self) -> Result<String, SandboxError> {
    let mut text = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
      match unistd::read(self.0, &mut buf) {
        Ok(0) => break,
        Ok(size) => text.extend_from_slice(&buf[..size]),
        Err(Errno::EINTR) => continue,
        Err(errno) => return Err(errno.into()),
      }
    }
    Ok(String::from_utf8_lossy(&text).into_owned())
  }

  /// Block for the readiness byte. Returns false when the write side
  /// closed without sending it.
  pub fn read_byte(&self) -> Result<bool, SandboxError> {
    let mut buf = [0u8; 1];
    loop {
      match unistd::read(self.0, &mut buf) {
        Ok(0) => return Ok(false),
        Ok(_) => return Ok(true),
        Err(Errno::EINTR) => continue,
        Err(errno) => return Err(errno.into()),
      }
    }
  }
}

impl Drop for PipeReader {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl PipeWriter {
  pub fn raw(&self) -> RawFd {
    self.0
  }

  pub fn write_byte(&self) -> Result<(), SandboxError> {
    let buf = [1u8; 1];
    loop {
      match unistd::write(self.0, &buf) {
        Ok(_) => return Ok(()),
        Err(Errno::EINTR) => continue,
        Err(errno) => return Err(errno.into()),
      }
    }
  }
}

impl Drop for PipeWriter {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}
