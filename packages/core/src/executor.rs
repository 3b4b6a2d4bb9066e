//! Command execution abstraction with privilege escalation support.
//!
//! Every state-changing action in this library is routed through the
//! [`Executor`] trait so that elevation policy stays in one place and so the
//! lifecycle layer can be exercised against a fake. Two implementations are
//! provided: [`SystemExecutor`] runs real commands (wrapping them with `sudo`
//! when the process is not already root), and [`SimulatedExecutor`] logs the
//! intended action, records it, and reports success without touching the
//! system.

use std::process::Command;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::{Error, IoResultExt, Result};

/// Privilege escalation method for commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    #[default]
    None,
    /// Wrap commands with `sudo`.
    Sudo,
}

/// A single recorded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Renders a program and its arguments as a single display string.
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Capability interface for running system commands.
pub trait Executor {
    /// Runs a command and returns its captured stdout.
    ///
    /// A non-zero exit code is reported as [`Error::CommandFailed`] carrying
    /// the command line and captured stderr.
    fn execute(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Runs a command, returning whether it exited successfully.
    ///
    /// Spawn failures are swallowed and reported as `false`.
    fn run(&self, program: &str, args: &[&str]) -> bool;

    /// True when commands are logged instead of performed.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Executor that runs real commands, escalating privileges when needed.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    escalation: PrivilegeEscalation,
}

impl SystemExecutor {
    /// Creates an executor with no privilege escalation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor that wraps commands with `sudo`.
    pub fn with_sudo() -> Self {
        Self {
            escalation: PrivilegeEscalation::Sudo,
        }
    }

    /// Picks an escalation method from the effective uid: root runs
    /// directly, everyone else goes through `sudo`.
    pub fn detect() -> Self {
        if nix::unistd::geteuid().is_root() {
            Self::new()
        } else {
            Self::with_sudo()
        }
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<std::process::Output> {
        match self.escalation {
            PrivilegeEscalation::None => Command::new(program)
                .args(args)
                .output()
                .command_context(program),
            PrivilegeEscalation::Sudo => {
                let mut wrapped = vec![program];
                wrapped.extend(args);
                Command::new("sudo")
                    .args(&wrapped)
                    .output()
                    .command_context(format!("sudo {}", program))
            }
        }
    }
}

impl Executor for SystemExecutor {
    fn execute(&self, program: &str, args: &[&str]) -> Result<String> {
        debug!(command = %command_line(program, args), "executing");
        let output = self.spawn(program, args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(Error::CommandFailed {
                command: command_line(program, args),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run(&self, program: &str, args: &[&str]) -> bool {
        match self.spawn(program, args) {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!(command = %command_line(program, args), error = %e, "spawn failed");
                false
            }
        }
    }
}

/// Executor for contexts without privileged access: every command is logged
/// and recorded, nothing is performed, and success is always reported.
///
/// Callers cannot distinguish simulated success from real success through the
/// operation results; check [`Executor::is_simulated`] when that matters.
#[derive(Debug, Default)]
pub struct SimulatedExecutor {
    log: Mutex<Vec<Invocation>>,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every invocation recorded so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.lock().expect("invocation log poisoned").clone()
    }

    fn record(&self, program: &str, args: &[&str]) {
        info!(command = %command_line(program, args), "simulated");
        self.log
            .lock()
            .expect("invocation log poisoned")
            .push(Invocation::new(program, args));
    }
}

impl Executor for SimulatedExecutor {
    fn execute(&self, program: &str, args: &[&str]) -> Result<String> {
        self.record(program, args);
        Ok(String::new())
    }

    fn run(&self, program: &str, args: &[&str]) -> bool {
        self.record(program, args);
        true
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, program: &str, args: &[&str]) -> Result<String> {
        (**self).execute(program, args)
    }

    fn run(&self, program: &str, args: &[&str]) -> bool {
        (**self).run(program, args)
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_executor_runs_directly() {
        let exec = SystemExecutor::new();
        assert_eq!(exec.escalation(), PrivilegeEscalation::None);
    }

    #[test]
    fn test_sudo_executor() {
        let exec = SystemExecutor::with_sudo();
        assert_eq!(exec.escalation(), PrivilegeEscalation::Sudo);
    }

    #[test]
    fn test_simulated_executor_records_and_succeeds() {
        let exec = SimulatedExecutor::new();

        assert!(exec.is_simulated());
        assert_eq!(exec.execute("mkfs.ext4", &["-F", "/dev/sdz"]).unwrap(), "");
        assert!(exec.run("mkdir", &["-p", "/mnt/storage-1"]));

        let log = exec.invocations();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].program, "mkfs.ext4");
        assert_eq!(log[0].args, vec!["-F", "/dev/sdz"]);
        assert_eq!(log[1].program, "mkdir");
    }

    #[test]
    fn test_command_line_rendering() {
        assert_eq!(command_line("umount", &[]), "umount");
        assert_eq!(
            command_line("mount", &["/dev/sdb1", "/mnt/storage-1"]),
            "mount /dev/sdb1 /mnt/storage-1"
        );
    }
}
