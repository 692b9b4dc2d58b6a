pub use cgroup::{CgroupConfig, SandboxCgroup, SandboxUsage};
pub use error::{SandboxError, SandboxExit};
pub use isolate::NamespaceConfig;
pub use launcher::launch;
pub use outcome::{
  classify, ExecutionReport, Outcome, ResultRecord, STATUS_ACCEPTED, STATUS_MEMORY_LIMIT,
  STATUS_RUNTIME_ERROR, STATUS_TIME_LIMIT,
};
pub use request::{ExecutionRequest, Target};

mod cgroup;
mod error;
mod isolate;
mod launcher;
mod outcome;
mod pipe;
mod request;
mod supervisor;
