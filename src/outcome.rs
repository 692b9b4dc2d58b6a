use nix::libc::STDOUT_FILENO;
use nix::sys::signal::Signal;
use nix::unistd::isatty;
use serde::{Deserialize, Serialize};

pub const STATUS_ACCEPTED: i32 = 0;
pub const STATUS_RUNTIME_ERROR: i32 = 1;
pub const STATUS_TIME_LIMIT: i32 = 2;
pub const STATUS_MEMORY_LIMIT: i32 = 3;

/// Exit status the memory controller's OOM kill surfaces when the
/// shell-style 128+signal convention is in play.
const OOM_EXIT_STATUS: i32 = 137;

/// Termination facts observed by the supervisor for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
  status: Option<i32>,
  signal: Option<i32>,
  timed_out: bool,
  /// Wall clock time (unit: ms)
  time: u64,
  /// Peak resident set size (unit: KB)
  memory: u64,
  stdout: String,
  stderr: String,
}

/// Classified result of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Accepted { time: u64, memory: u64, output: String },
  RuntimeError { detail: String },
  TimeLimitExceeded,
  MemoryLimitExceeded,
}

/// The one record written across the isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
  pub status: i32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub time: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub memory: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<String>,
}

impl ExecutionReport {
  /// A measured zero rounds up to 1 ms so an instant-looking figure is
  /// never reported for a program that actually ran.
  pub fn new(
    status: Option<i32>,
    signal: Option<i32>,
    timed_out: bool,
    time: u64,
    memory: u64,
  ) -> Self {
    ExecutionReport {
      status,
      signal,
      timed_out,
      time: time.max(1),
      memory,
      stdout: String::new(),
      stderr: String::new(),
    }
  }

  pub fn set_stdout<S: Into<String>>(mut self, text: S) -> Self {
    self.stdout = text.into();
    self
  }

  pub fn set_stderr<S: Into<String>>(mut self, text: S) -> Self {
    self.stderr = text.into();
    self
  }

  pub fn status(&self) -> &Option<i32> {
    &self.status
  }

  pub fn signal(&self) -> &Option<i32> {
    &self.signal
  }

  pub fn timed_out(&self) -> bool {
    self.timed_out
  }

  pub fn time_ms(&self) -> u64 {
    self.time
  }

  pub fn memory_kb(&self) -> u64 {
    self.memory
  }

  pub fn stdout(&self) -> &str {
    &self.stdout
  }

  pub fn stderr(&self) -> &str {
    &self.stderr
  }
}

/// Map termination facts to exactly one outcome.
///
/// Checked in order: a timer-caused kill wins, then the memory
/// controller's kill convention, then any abnormal termination or
/// error output, and only a clean run is accepted. The timer flag
/// counts only when the wait actually observed a signal death, so a
/// timer firing microseconds after a natural exit cannot flip the
/// category.
pub fn classify(report: &ExecutionReport) -> Outcome {
  if report.timed_out && report.signal.is_some() {
    return Outcome::TimeLimitExceeded;
  }

  let sigkill = Signal::SIGKILL as i32;
  if report.signal == Some(sigkill) || report.status == Some(OOM_EXIT_STATUS) {
    return Outcome::MemoryLimitExceeded;
  }

  if let Some(signal) = report.signal {
    return Outcome::RuntimeError {
      detail: format!("terminated by signal {}", signal),
    };
  }
  match report.status {
    Some(0) => {}
    Some(code) => {
      return Outcome::RuntimeError {
        detail: format!("exited with code {}", code),
      };
    }
    None => {
      return Outcome::RuntimeError {
        detail: "terminated abnormally".to_string(),
      };
    }
  }
  if !report.stderr.trim().is_empty() {
    return Outcome::RuntimeError {
      detail: "produced error output".to_string(),
    };
  }

  Outcome::Accepted {
    time: report.time,
    memory: report.memory,
    output: report.stdout.trim().to_string(),
  }
}

impl Outcome {
  pub fn status(&self) -> i32 {
    match self {
      Outcome::Accepted { .. } => STATUS_ACCEPTED,
      Outcome::RuntimeError { .. } => STATUS_RUNTIME_ERROR,
      Outcome::TimeLimitExceeded => STATUS_TIME_LIMIT,
      Outcome::MemoryLimitExceeded => STATUS_MEMORY_LIMIT,
    }
  }

  pub fn into_record(self) -> ResultRecord {
    let status = self.status();
    match self {
      Outcome::Accepted { time, memory, output } => ResultRecord {
        status,
        error: None,
        time: Some(time),
        memory: Some(memory),
        output: if output.is_empty() { None } else { Some(output) },
      },
      Outcome::RuntimeError { detail } => ResultRecord {
        status,
        error: Some(detail),
        time: None,
        memory: None,
        output: None,
      },
      Outcome::TimeLimitExceeded => ResultRecord {
        status,
        error: Some("Time Limit Exceeded".to_string()),
        time: None,
        memory: None,
        output: None,
      },
      Outcome::MemoryLimitExceeded => ResultRecord {
        status,
        error: Some("Memory Limit Exceeded".to_string()),
        time: None,
        memory: None,
        output: None,
      },
    }
  }
}

impl ResultRecord {
  pub fn runtime_error<MS: Into<String>>(detail: MS) -> Self {
    Outcome::RuntimeError {
      detail: detail.into(),
    }
    .into_record()
  }

  pub fn summary(&self) -> String {
    match self.status {
      STATUS_ACCEPTED => format!(
        "Accepted  time {} ms  memory {} KB",
        self.time.unwrap_or(0),
        self.memory.unwrap_or(0)
      ),
      STATUS_RUNTIME_ERROR => format!(
        "Runtime Error  ({})",
        self.error.as_deref().unwrap_or("unknown")
      ),
      STATUS_TIME_LIMIT => "Time Limit Exceeded".to_string(),
      STATUS_MEMORY_LIMIT => "Memory Limit Exceeded".to_string(),
      status => format!("Unknown Status {}", status),
    }
  }

  /// Report usage: human line on a terminal, the raw record otherwise
  pub fn report(&self) {
    let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
    if is_tty {
      println!("{}", self.summary());
    } else if let Ok(text) = serde_json::to_string(self) {
      println!("{}", text);
    }
  }
}
