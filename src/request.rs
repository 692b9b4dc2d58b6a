use std::env;
use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;

/// What to execute inside the sandbox root.
///
/// The language tags resolve to the fixed layout the prepared root is
/// expected to carry: a `cpp` submission is the compiled `/solution`
/// binary, a `java` submission is a `Solution` class started with a
/// heap ceiling matching the memory limit. Anything else is taken as a
/// program path plus caller arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  Cpp,
  Java,
  Command(PathBuf),
}

impl Target {
  pub fn parse(text: &str) -> Target {
    match text {
      "cpp" => Target::Cpp,
      "java" => Target::Java,
      _ => Target::Command(PathBuf::from(text)),
    }
  }
}

/// Immutable input to one sandbox run.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
  target: Target,
  arguments: Vec<String>,
  /// Prepared root filesystem tree
  root: PathBuf,
  /// Wall clock limit (unit: ms)
  time_limit: u64,
  /// Memory ceiling (unit: KB)
  memory_limit: u64,
  /// Max number of processes in the sandbox
  process_limit: u64,
  stdin: Option<PathBuf>,
  stdout: Option<PathBuf>,
  stderr: Option<PathBuf>,
  env: Vec<(String, String)>,
  hostname: String,
  cgroup: String,
}

impl ExecutionRequest {
  pub fn new<P: AsRef<Path>>(target: Target, root: P) -> Self {
    let root = root.as_ref();
    let root = root
      .absolutize()
      .map(|p| p.into_owned())
      .unwrap_or_else(|_| root.to_path_buf());
    let cgroup = env::var("SNOWBOX_CGROUP").unwrap_or("snowbox".to_string());

    ExecutionRequest {
      target,
      arguments: vec![],
      root,
      time_limit: 2000,
      memory_limit: 262144,
      process_limit: 64,
      stdin: None,
      stdout: None,
      stderr: None,
      env: vec![
        (
          "PATH".to_string(),
          "/usr/local/bin:/usr/bin:/bin".to_string(),
        ),
        ("PS1".to_string(), "[snowbox] # ".to_string()),
      ],
      hostname: "snowbox".to_string(),
      cgroup,
    }
  }

  /// Set arguments passed to an explicit program target
  pub fn arguments<AS: Into<String>>(mut self, arguments: Vec<AS>) -> Self {
    self.arguments = arguments.into_iter().map(|a| a.into()).collect();
    self
  }

  /// Set wall clock limit (unit: ms)
  pub fn time_limit(mut self, value: u64) -> Self {
    self.time_limit = value;
    self
  }

  /// Set memory ceiling (unit: KB)
  pub fn memory_limit(mut self, value: u64) -> Self {
    self.memory_limit = value;
    self
  }

  /// Set the max number of processes
  pub fn process_limit(mut self, value: u64) -> Self {
    self.process_limit = value;
    self
  }

  /// Set stdin redirection or not
  pub fn set_stdin(mut self, path: Option<PathBuf>) -> Self {
    self.stdin = path;
    self
  }

  /// Set stdout redirection or not
  pub fn set_stdout(mut self, path: Option<PathBuf>) -> Self {
    self.stdout = path;
    self
  }

  /// Set stderr redirection or not
  pub fn set_stderr(mut self, path: Option<PathBuf>) -> Self {
    self.stderr = path;
    self
  }

  /// Pass env
  pub fn env<KS: Into<String>, VS: Into<String>>(mut self, key: KS, value: VS) -> Self {
    self.env.push((key.into(), value.into()));
    self
  }

  /// Set the cgroup base name
  pub fn cgroup<NS: Into<String>>(mut self, name: NS) -> Self {
    self.cgroup = name.into();
    self
  }

  pub fn target(&self) -> &Target {
    &self.target
  }

  pub fn root(&self) -> &PathBuf {
    &self.root
  }

  pub fn time_limit_ms(&self) -> u64 {
    self.time_limit
  }

  pub fn memory_limit_kb(&self) -> u64 {
    self.memory_limit
  }

  pub fn processes(&self) -> u64 {
    self.process_limit
  }

  pub fn stdin(&self) -> &Option<PathBuf> {
    &self.stdin
  }

  pub fn stdout(&self) -> &Option<PathBuf> {
    &self.stdout
  }

  pub fn stderr(&self) -> &Option<PathBuf> {
    &self.stderr
  }

  pub fn envs(&self) -> &Vec<(String, String)> {
    &self.env
  }

  pub fn hostname(&self) -> &str {
    &self.hostname
  }

  pub fn cgroup_base(&self) -> &str {
    &self.cgroup
  }

  /// Resolve the target into the command executed inside the new root.
  pub fn command(&self) -> (String, Vec<String>) {
    match &self.target {
      Target::Cpp => ("/solution".to_string(), vec![]),
      Target::Java => (
        "java".to_string(),
        vec![
          format!("-Xmx{}k", self.memory_limit),
          "Solution".to_string(),
        ],
      ),
      Target::Command(program) => (
        program.to_string_lossy().to_string(),
        self.arguments.clone(),
      ),
    }
  }
}
