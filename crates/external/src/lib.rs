//! A collection of external commands used by reparted.
//!
//! Every tool is reached through the [`Runner`] trait, so that the disk layout
//! parser and the resize executor never care how a binary is located or spawned.

extern crate libc;
#[macro_use]
extern crate log;
extern crate proc_mounts;
extern crate sys_mount;

pub mod block;
pub mod mounts;
pub mod parted;

pub use self::{block::*, mounts::*, parted::*};

use std::{
    io,
    path::Path,
    process::{Command, Stdio},
};

/// Decides whether a finished command counts as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Only a zero exit status is a success.
    RequireSuccess,
    /// A non-zero exit status is still a success if the command printed anything.
    ///
    /// parted and several resize tools exit non-zero on benign warnings while
    /// still producing the report that was asked for.
    OutputImpliesSuccess,
}

impl Default for ExitPolicy {
    fn default() -> Self { ExitPolicy::OutputImpliesSuccess }
}

impl ExitPolicy {
    /// Applies the policy to an exit status and the combined output of a command.
    pub fn accepts(self, success: bool, output: &str) -> bool {
        match self {
            ExitPolicy::RequireSuccess => success,
            ExitPolicy::OutputImpliesSuccess => success || !output.trim().is_empty(),
        }
    }
}

/// Splits a space-delimited argument string. Repeated spaces do not yield empty arguments.
pub fn split_args(args: &str) -> Vec<&str> { args.split(' ').filter(|a| !a.is_empty()).collect() }

/// Executes `cmd` with a space-delimited argument string, returning stdout and stderr combined.
pub fn exec_output(cmd: &str, args: &str, policy: ExitPolicy) -> io::Result<String> {
    let args = split_args(args);
    info!("executing {} with {:?}", cmd, args);

    let output = Command::new(cmd)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|why| {
            io::Error::new(why.kind(), format!("failed to spawn {}: {}", cmd, why))
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    let success = output.status.success();
    if policy.accepts(success, &combined) {
        if !success {
            warn!(
                "{} exited with {}, accepting its output: {}",
                cmd,
                output.status,
                combined.trim_end()
            );
        }

        Ok(combined)
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "{} failed with status: {}",
                cmd,
                match output.status.code() {
                    Some(code) => code.to_string(),
                    None => "unknown".into(),
                }
            ),
        ))
    }
}

/// The process and mount boundary that every external action goes through.
pub trait Runner {
    /// Runs `program` with a space-delimited argument string and returns its combined output.
    fn run(&self, program: &str, args: &str) -> io::Result<String>;

    /// Unmounts every mount whose source is `device`. A device that is not mounted is not
    /// an error.
    fn unmount(&self, device: &Path) -> io::Result<()>;
}

/// Runs commands on the host system.
#[derive(Debug, Default, Clone, Copy)]
pub struct System {
    pub policy: ExitPolicy,
}

impl System {
    pub fn new(policy: ExitPolicy) -> Self { System { policy } }
}

impl Runner for System {
    fn run(&self, program: &str, args: &str) -> io::Result<String> {
        exec_output(program, args, self.policy)
    }

    fn unmount(&self, device: &Path) -> io::Result<()> { unmount_device(device) }
}
