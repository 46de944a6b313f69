/// OS process helpers shared by the invoker and the supervisor
///
/// Thin wrappers over `kill(2)`/`killpg(2)` that refuse non-positive pids, which
/// would otherwise address whole process groups or every process we may signal.

use std::io;
use std::process::Stdio;
use tokio::process::Command;

/// Send SIGINT to a single process
pub fn send_interrupt(pid: i64) -> io::Result<()> {
    signal_process(pid, Signal::Interrupt)
}

/// Forcibly kill every process in the group led by `pgid`
pub fn kill_group(pgid: i64) -> io::Result<()> {
    signal_process(pgid, Signal::KillGroup)
}

/// Whether a process with this pid currently exists (zombies included)
pub fn process_exists(pid: i64) -> bool {
    signal_process(pid, Signal::Probe).is_ok()
}

/// Build a command that runs `script` through the platform shell
pub fn shell_command(script: &str) -> Command {
    #[cfg(unix)]
    let mut command = {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    };
    #[cfg(not(unix))]
    let mut command = {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(script);
        command
    };

    command.stdin(Stdio::null());
    command
}

/// Detach `command` from the caller's process group so terminal signals aimed
/// at the caller do not reach it, and so the group can be killed as a unit
pub fn detach(command: &mut Command) {
    #[cfg(unix)]
    command.process_group(0);
    #[cfg(not(unix))]
    let _ = command;
}

/// Run `command` as a daemon: leader of a new session, with no controlling
/// terminal, so neither the caller exiting nor a terminal hangup reaches it
pub fn daemonize(command: &mut Command) {
    #[cfg(unix)]
    // SAFETY: setsid is async-signal-safe and touches no memory of the parent.
    // The forked child is never a group leader, so it cannot fail with EPERM.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    #[cfg(not(unix))]
    let _ = command;
}

/// Quote `value` for inclusion in a POSIX shell command line
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Interrupt,
    KillGroup,
    Probe,
}

#[cfg(unix)]
fn signal_process(pid: i64, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid)))?;

    // SAFETY: kill/killpg take plain integers and have no memory-safety
    // preconditions; pid is positive so exactly one process or group is addressed.
    let rc = unsafe {
        match signal {
            Signal::Interrupt => libc::kill(pid, libc::SIGINT),
            Signal::KillGroup => libc::killpg(pid, libc::SIGKILL),
            Signal::Probe => libc::kill(pid, 0),
        }
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn signal_process(pid: i64, signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot deliver {:?} to {} on this platform", signal, pid),
    ))
}
