//! Scoped ownership of a `git` subprocess and everything it forks.
//!
//! [`ProcessGroup::spawn`] starts the child as the leader of a new process
//! group with stdin piped and both stdout and stderr writing into one shared
//! pipe.  Dropping the guard sends `SIGKILL` to the whole group, so a request
//! handler cannot leave a `git` process (or any of its helpers) behind no
//! matter how it exits.

use std::io;
use std::os::fd::OwnedFd;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

/// A running subprocess that owns its process group.
#[derive(Debug)]
pub struct ProcessGroup {
    child: Child,
    pgid: libc::pid_t,
    stdin: Option<ChildStdin>,
    output: Option<pipe::Receiver>,
}

impl ProcessGroup {
    /// Spawn `cmd` in a fresh process group.
    ///
    /// Any stdio configuration already on `cmd` is replaced.  The command is
    /// consumed so that the parent's copies of the pipe's write end are
    /// closed as soon as the child is running; otherwise reads from
    /// [`ProcessGroup::take_output`] would never see EOF.
    pub fn spawn(mut cmd: Command) -> Result<Self> {
        let (reader, writer) = io::pipe().context("failed to create output pipe")?;
        let stderr = writer
            .try_clone()
            .context("failed to duplicate output pipe for stderr")?;

        cmd.stdin(Stdio::piped())
            .stdout(writer)
            .stderr(stderr)
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd.spawn().context("failed to spawn process")?;
        drop(cmd);

        let pid = child.id().context("spawned process has no pid")?;
        let pgid = libc::pid_t::try_from(pid).context("pid out of range")?;

        let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
            .context("failed to register output pipe")?;
        let stdin = child.stdin.take();

        debug!(pgid, "spawned process group");

        Ok(Self {
            child,
            pgid,
            stdin,
            output: Some(output),
        })
    }

    /// Process group id (equal to the leader's pid).
    pub fn pgid(&self) -> libc::pid_t {
        self.pgid
    }

    /// Take the child's stdin.  Dropping it closes the pipe.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Take the merged stdout/stderr stream.
    pub fn take_output(&mut self) -> Option<pipe::Receiver> {
        self.output.take()
    }

    /// Wait for the group leader to exit.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.stdin.take();
        self.child.wait().await
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        // SAFETY: killpg has no memory-safety preconditions; `pgid` is the
        // group this guard created.
        let rc = unsafe { libc::killpg(self.pgid, libc::SIGKILL) };
        if rc == 0 {
            debug!(pgid = self.pgid, "process group killed");
            return;
        }
        let err = io::Error::last_os_error();
        // ESRCH: every member already exited.  EPERM shows up on some
        // platforms when only zombies remain.
        match err.raw_os_error() {
            Some(libc::ESRCH) | Some(libc::EPERM) => {}
            _ => warn!(pgid = self.pgid, error = %err, "failed to kill process group"),
        }
    }
}
