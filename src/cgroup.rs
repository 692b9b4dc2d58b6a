use cgroups_rs::cgroup_builder::CgroupBuilder;
use cgroups_rs::cpu::CpuController;
use cgroups_rs::cpuacct::CpuAcctController;
use cgroups_rs::memory::MemController;
use cgroups_rs::pid::PidController;
use cgroups_rs::{Cgroup, CgroupPid, Controller, MaxValue};
use log::{debug, error, warn};
use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeVal;
use nix::unistd::Pid;

use crate::error::SandboxError;
use crate::request::ExecutionRequest;

/// Resource limits for one run, keyed by a unique run identifier so
/// concurrent sandboxes never share controller directories.
#[derive(Debug, Clone)]
pub struct CgroupConfig {
  base: String,
  /// Memory ceiling (unit: KB)
  memory_limit: u64,
  /// Max number of processes in the group
  process_limit: u64,
  /// CPU bandwidth per period (unit: us)
  cpu_quota: i64,
  /// Kernel memory ceiling (unit: bytes)
  kernel_memory: i64,
}

pub struct SandboxCgroup {
  name: String,
  cgroup: Option<Cgroup>,
  enable_cpuacct: bool,
  enable_memory: bool,
}

#[derive(Debug)]
pub struct SandboxUsage {
  time: u64,
  time_user: u64,
  time_sys: u64,
  memory_swap: u64,
}

impl CgroupConfig {
  pub fn new(request: &ExecutionRequest) -> Self {
    CgroupConfig {
      base: request.cgroup_base().to_string(),
      memory_limit: request.memory_limit_kb(),
      process_limit: request.processes(),
      cpu_quota: 10000,
      kernel_memory: 64 * 1024 * 1024,
    }
  }

  /// Controller directory name for one run, unique per child PID
  fn name(&self, child: Pid) -> String {
    format!("{}/{}.{}", self.base, self.base, child.as_raw())
  }
}

impl SandboxCgroup {
  /// Create the controller directories, write every limit, then attach
  /// the child. The PID is written last so the process is never
  /// briefly unconstrained; any failure aborts the run before
  /// untrusted code may execute.
  pub fn new(config: &CgroupConfig, child: Pid) -> Result<Self, SandboxError> {
    debug!("Init cgroup {}", config.base);

    let hierarchy = cgroups_rs::hierarchies::auto();

    let enable_cpu = hierarchy
      .subsystems()
      .iter()
      .any(|subsystem| subsystem.controller_name() == "cpu");
    let enable_cpuacct = hierarchy
      .subsystems()
      .iter()
      .any(|subsystem| subsystem.controller_name() == "cpuacct");
    let enable_memory = hierarchy
      .subsystems()
      .iter()
      .any(|subsystem| subsystem.controller_name() == "memory");
    let enable_pids = hierarchy
      .subsystems()
      .iter()
      .any(|subsystem| subsystem.controller_name() == "pids");

    if !enable_cpuacct {
      warn!("cgroup cpuacct is not supported, falling back to rusage accounting");
    }
    if !enable_memory {
      return Err(SandboxError::cgroup("memory controller is not mounted"));
    }
    if !enable_pids {
      return Err(SandboxError::cgroup("pids controller is not mounted"));
    }

    let cgroup_name = config.name(child);
    let builder = CgroupBuilder::new(cgroup_name.as_str());
    let builder = if enable_cpu {
      builder.cpu().quota(config.cpu_quota).done()
    } else {
      builder
    };
    let builder = builder
      .pid()
      .maximum_number_of_processes(MaxValue::Value(config.process_limit as i64))
      .done();

    let mut supported_controller = vec![];
    if enable_cpu {
      supported_controller.push("cpu".to_string());
    }
    if enable_cpuacct {
      supported_controller.push("cpuacct".to_string());
    }
    supported_controller.push("memory".to_string());
    supported_controller.push("pids".to_string());
    let builder = builder.set_specified_controllers(supported_controller);

    let cgroup = builder
      .build(hierarchy)
      .map_err(|err| SandboxError::cgroup(format!("build {} fails: {}", cgroup_name, err)))?;

    let memory: &MemController = cgroup
      .controller_of()
      .ok_or_else(|| SandboxError::cgroup("memory controller is missing"))?;
    // One page of slack above the configured ceiling
    let memory_limit = config.memory_limit as i64 * 1024 + 4 * 1024;
    apply_memory_limit(memory, memory_limit, config.kernel_memory)?;
    memory
      .reset_max_usage()
      .map_err(|err| SandboxError::cgroup(format!("reset max usage fails: {}", err)))?;

    // Attach the child last, after every limit is in place
    let task = CgroupPid::from(child.as_raw() as u64);

    if enable_cpu {
      let cpu: &CpuController = cgroup
        .controller_of()
        .ok_or_else(|| SandboxError::cgroup("cpu controller is missing"))?;
      cpu
        .add_task(&task)
        .map_err(|err| SandboxError::cgroup(format!("attach to cpu fails: {}", err)))?;
    }
    if enable_cpuacct {
      let cpuacct: &CpuAcctController = cgroup
        .controller_of()
        .ok_or_else(|| SandboxError::cgroup("cpuacct controller is missing"))?;
      if let Err(err) = cpuacct.reset() {
        warn!("Reset cpuacct fails: {}", err);
      }
      cpuacct
        .add_task(&task)
        .map_err(|err| SandboxError::cgroup(format!("attach to cpuacct fails: {}", err)))?;
    }
    memory
      .add_task(&task)
      .map_err(|err| SandboxError::cgroup(format!("attach to memory fails: {}", err)))?;
    let pid: &PidController = cgroup
      .controller_of()
      .ok_or_else(|| SandboxError::cgroup("pids controller is missing"))?;
    pid
      .add_task(&task)
      .map_err(|err| SandboxError::cgroup(format!("attach to pids fails: {}", err)))?;

    debug!("Attached process #{}. to cgroup {}", child, cgroup_name);

    Ok(SandboxCgroup {
      name: cgroup_name,
      cgroup: Some(cgroup),
      enable_cpuacct,
      enable_memory: true,
    })
  }

  pub fn usage(&self) -> SandboxUsage {
    let mut rusage = None;

    let is_cgroup = self.cgroup.is_some();
    let (time, time_user, time_sys) = if is_cgroup && self.enable_cpuacct {
      let cgroup = self.cgroup.as_ref().unwrap();
      let cpuacct: Option<&CpuAcctController> = cgroup.controller_of();
      match cpuacct {
        Some(cpuacct) => {
          let acct = cpuacct.cpuacct();
          debug!("usage: {}", acct.usage);
          debug!("usage_sys: {}", acct.usage_sys);
          debug!("usage_user: {}", acct.usage_user);
          (
            acct.usage / 1000000,
            acct.usage_user / 1000000,
            acct.usage_sys / 1000000,
          )
        }
        None => fallback_times(&mut rusage),
      }
    } else {
      fallback_times(&mut rusage)
    };

    let memory_swap = if is_cgroup && self.enable_memory {
      let cgroup = self.cgroup.as_ref().unwrap();
      let memory: Option<&MemController> = cgroup.controller_of();
      match memory {
        Some(memory) => {
          let memswap = memory.memswap();
          debug!("memswap.max_usage_in_bytes: {}", memswap.max_usage_in_bytes);
          memswap.max_usage_in_bytes / 1024
        }
        None => fallback_memory(&mut rusage),
      }
    } else {
      fallback_memory(&mut rusage)
    };

    SandboxUsage {
      time,
      time_user,
      time_sys,
      memory_swap,
    }
  }
}

/// The memsw file rejects a value above the plain memory limit's
/// current setting and vice versa, so the write order depends on
/// whether the ceiling is being lowered or raised.
fn apply_memory_limit(
  memory: &MemController,
  limit: i64,
  kernel_limit: i64,
) -> Result<(), SandboxError> {
  let current = memory.memory_stat().limit_in_bytes;
  debug!("memory.limit_in_bytes: {} -> {}", current, limit);

  if limit <= current {
    memory
      .set_limit(limit)
      .map_err(|err| SandboxError::cgroup(format!("set memory limit fails: {}", err)))?;
    memory
      .set_memswap_limit(limit)
      .map_err(|err| SandboxError::cgroup(format!("set memsw limit fails: {}", err)))?;
  } else {
    memory
      .set_memswap_limit(limit)
      .map_err(|err| SandboxError::cgroup(format!("set memsw limit fails: {}", err)))?;
    memory
      .set_limit(limit)
      .map_err(|err| SandboxError::cgroup(format!("set memory limit fails: {}", err)))?;
  }
  memory
    .set_soft_limit(limit)
    .map_err(|err| SandboxError::cgroup(format!("set soft limit fails: {}", err)))?;
  if let Err(err) = memory.set_kmem_limit(kernel_limit) {
    // Not every kernel carries the v1 kmem knob
    warn!("Set kernel memory limit fails: {}", err);
  }

  Ok(())
}

fn fallback_times(rusage: &mut Option<nix::sys::resource::Usage>) -> (u64, u64, u64) {
  match getrusage(UsageWho::RUSAGE_CHILDREN) {
    Ok(usage) => {
      *rusage = Some(usage);
      let time_user = usage.user_time();
      let time_sys = usage.system_time();
      (
        milliseconds(time_user + time_sys),
        milliseconds(time_user),
        milliseconds(time_sys),
      )
    }
    Err(err) => {
      error!("getrusage fails: {}", err);
      (0, 0, 0)
    }
  }
}

fn fallback_memory(rusage: &mut Option<nix::sys::resource::Usage>) -> u64 {
  let usage = match rusage {
    Some(usage) => Some(*usage),
    None => getrusage(UsageWho::RUSAGE_CHILDREN).ok(),
  };
  match usage {
    Some(usage) => usage.max_rss() as u64,
    None => 0,
  }
}

impl Drop for SandboxCgroup {
  fn drop(&mut self) {
    if let Some(cgroup) = &self.cgroup {
      debug!("Delete created cgroup {}", self.name);
      if let Err(err) = cgroup.delete() {
        error!("Delete cgroup {} fails: {}", self.name, err);
      }
    }
  }
}

impl SandboxUsage {
  pub fn time(&self) -> u64 {
    self.time
  }

  pub fn time_user(&self) -> u64 {
    self.time_user
  }

  pub fn time_sys(&self) -> u64 {
    self.time_sys
  }

  pub fn memory_swap(&self) -> u64 {
    self.memory_swap
  }
}

fn milliseconds(val: TimeVal) -> u64 {
  (val.tv_sec() * 1000 + val.tv_usec() / 1000) as u64
}
