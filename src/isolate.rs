use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::CloneFlags;
use nix::unistd::{chdir, pivot_root, sethostname, Gid, Uid};

use crate::error::SandboxError;
use crate::request::ExecutionRequest;

/// Staging directory holding the previous root during the switch
const OLD_ROOT: &str = ".old-root";

/// Kernel namespaces and user mapping for one sandboxed child.
///
/// The host uid/gid are captured at construction time, in the launcher,
/// because inside the new user namespace they are no longer observable.
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
  root: PathBuf,
  hostname: String,
  host_uid: Uid,
  host_gid: Gid,
}

impl NamespaceConfig {
  pub fn new(request: &ExecutionRequest) -> Self {
    NamespaceConfig {
      root: request.root().clone(),
      hostname: request.hostname().to_string(),
      host_uid: Uid::current(),
      host_gid: Gid::current(),
    }
  }

  /// The namespace set the child is created into
  pub fn clone_flags(&self) -> CloneFlags {
    CloneFlags::CLONE_NEWNS
      | CloneFlags::CLONE_NEWPID
      | CloneFlags::CLONE_NEWNET
      | CloneFlags::CLONE_NEWUTS
      | CloneFlags::CLONE_NEWIPC
      | CloneFlags::CLONE_NEWUSER
  }

  /// Single-entry map of container uid/gid 0 onto the caller's real
  /// ids, written by the child itself before touching the filesystem.
  pub fn apply_user_mapping(&self) -> Result<(), SandboxError> {
    debug!(
      "Map container uid/gid 0 -> {}/{}",
      self.host_uid, self.host_gid
    );

    // setgroups must be denied before an unprivileged gid_map write
    fs::write("/proc/self/setgroups", "deny")
      .map_err(|err| SandboxError::isolate(format!("deny setgroups fails: {}", err)))?;
    fs::write("/proc/self/uid_map", format!("0 {} 1", self.host_uid))
      .map_err(|err| SandboxError::isolate(format!("write uid_map fails: {}", err)))?;
    fs::write("/proc/self/gid_map", format!("0 {} 1", self.host_gid))
      .map_err(|err| SandboxError::isolate(format!("write gid_map fails: {}", err)))?;

    Ok(())
  }

  /// Switch into the prepared root.
  ///
  /// The sequence is order sensitive: private mount propagation first,
  /// then the recursive self bind that makes the root a mount point,
  /// then the pivot with the previous root parked in a staging
  /// directory that is detached and removed, and only then the fresh
  /// proc mount and hostname. Afterwards no host path is reachable.
  pub fn enter(&self) -> Result<(), SandboxError> {
    info!("Mount new root: {}", self.root.to_string_lossy());

    mount::<PathBuf, PathBuf, PathBuf, PathBuf>(
      None,
      &PathBuf::from("/"),
      None,
      MsFlags::MS_REC | MsFlags::MS_PRIVATE,
      None,
    )
    .map_err(|err| SandboxError::isolate(format!("make mounts private fails: {}", err)))?;

    mount::<PathBuf, PathBuf, PathBuf, PathBuf>(
      Some(&self.root),
      &self.root,
      None,
      MsFlags::MS_BIND | MsFlags::MS_REC,
      None,
    )
    .map_err(|err| SandboxError::isolate(format!("bind new root fails: {}", err)))?;

    let old_root = self.root.join(OLD_ROOT);
    fs::create_dir_all(&old_root)
      .map_err(|err| SandboxError::isolate(format!("create staging dir fails: {}", err)))?;

    pivot_root(&self.root, &old_root)
      .map_err(|err| SandboxError::isolate(format!("pivot root fails: {}", err)))?;

    chdir("/").map_err(|err| SandboxError::isolate(format!("chdir fails: {}", err)))?;

    let old_root = PathBuf::from("/").join(OLD_ROOT);
    umount2(&old_root, MntFlags::MNT_DETACH)
      .map_err(|err| SandboxError::isolate(format!("detach old root fails: {}", err)))?;
    fs::remove_dir(&old_root)
      .map_err(|err| SandboxError::isolate(format!("remove staging dir fails: {}", err)))?;

    // The untrusted program must only see its own process tree
    fs::create_dir_all("/proc")
      .map_err(|err| SandboxError::isolate(format!("create /proc fails: {}", err)))?;
    mount::<str, str, str, str>(
      Some("proc"),
      "/proc",
      Some("proc"),
      MsFlags::empty(),
      None,
    )
    .map_err(|err| SandboxError::isolate(format!("mount proc fails: {}", err)))?;

    sethostname(&self.hostname)
      .map_err(|err| SandboxError::isolate(format!("set hostname fails: {}", err)))?;

    debug!("Entered isolated root ok");

    Ok(())
  }
}
