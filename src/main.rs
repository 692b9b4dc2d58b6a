use std::env;
use std::path::PathBuf;

use clap::Parser;
use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger};
use log::{info, Record};

use snowbox::{launch, ExecutionRequest, SandboxError, SandboxExit, Target};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[arg(long, default_value = "/tmp/snow", help = "Prepared sandbox root")]
  basedir: PathBuf,

  #[arg(short, long, default_value_t = 2000, help = "Wall clock limit (ms)")]
  time: u64,

  #[arg(short, long, default_value_t = 262144, help = "Memory ceiling (KB)")]
  memory: u64,

  #[arg(long, default_value_t = 64, help = "Max number of processes")]
  process: u64,

  #[arg(long, help = "Redirect program stdin from a file")]
  stdin: Option<PathBuf>,

  #[arg(long, help = "Copy captured stdout to a file")]
  stdout: Option<PathBuf>,

  #[arg(long, help = "Copy captured stderr to a file")]
  stderr: Option<PathBuf>,

  #[arg(long, default_value_t = false)]
  verbose: bool,

  #[arg(help = "Target: cpp, java, or a program path")]
  target: String,

  #[arg(help = "Arguments", trailing_var_arg = true, allow_hyphen_values = true)]
  arguments: Vec<String>,
}

impl Cli {
  fn resolve(self) -> ExecutionRequest {
    ExecutionRequest::new(Target::parse(&self.target), &self.basedir)
      .arguments(self.arguments)
      .time_limit(self.time)
      .memory_limit(self.memory)
      .process_limit(self.process)
      .set_stdin(self.stdin)
      .set_stdout(self.stdout)
      .set_stderr(self.stderr)
  }
}

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Spawned isolated child process #1234.```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

fn main() -> SandboxExit {
  match run() {
    Ok(_) => SandboxExit::Ok,
    Err(err) => SandboxExit::Err(err),
  }
}

fn run() -> Result<(), SandboxError> {
  let cli = Cli::parse();
  let log_spec = if cli.verbose {
    "snowbox=debug"
  } else {
    "snowbox=info"
  };

  Logger::try_with_str(log_spec)?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
        .basename("snowbox")
        .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
        .suppress_timestamp(),
    )
    .append()
    .duplicate_to_stderr(Duplicate::Warn)
    .format_for_files(default_format)
    .start()?;

  info!("Start running snowbox");

  let request = cli.resolve();
  let record = launch(&request)?;
  record.report();

  info!("Running snowbox finished");

  Ok(())
}
