//! Ownership of one external game-engine process.
//!
//! [`EngineProcess`] spawns the engine with piped stdin/stdout, writes action lines and
//! reads protocol lines. Reads are bounded by a wall-clock deadline: stdout is drained by
//! a dedicated reader thread into a channel, so a hung engine surfaces as
//! [`ProcessError::Timeout`] instead of blocking the calling worker forever.
//!
//! The process is killed when the handle is dropped. Callers never wait for a clean exit
//! after the terminal record; the engine is killed regardless.
//!
//! On Unix the engine is started as the leader of its own process group and killing it
//! signals the whole group. Engines started through a launcher script therefore die with
//! the script, and the stdout pipe closes so the reader thread ends.

use std::{
    fmt,
    io::{self, BufRead as _, BufReader, BufWriter, Write as _},
    path::PathBuf,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Instant,
};

use log::{debug, trace, warn};

use crate::protocol::{LineDecoder, Record};

/// A fully resolved engine command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ProcessError {
    #[display("failed to start engine `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    #[display("engine pipe error: {_0}")]
    Io(io::Error),
    #[display("engine did not answer before the episode deadline")]
    Timeout,
    #[display("engine closed its pipes before the episode ended")]
    Closed,
}

impl ProcessError {
    /// Returns `true` if the engine misbehaved (hung or died) rather than being
    /// unavailable altogether.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessError::Timeout | ProcessError::Closed)
    }
}

/// A running game-engine process.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    lines: mpsc::Receiver<io::Result<String>>,
    killed: bool,
}

impl EngineProcess {
    /// Spawns the engine and starts draining its stdout.
    pub fn spawn(command: &EngineCommand) -> Result<Self, ProcessError> {
        let spawn_error = |source| ProcessError::Spawn {
            program: command.program.clone(),
            source,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            cmd.process_group(0);
        }
        let mut child = cmd.spawn().map_err(spawn_error)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            kill_and_reap(&mut child);
            return Err(spawn_error(io::Error::other("engine pipes were not captured")));
        };

        let pid = child.id();
        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name(format!("engine-{pid}-stdout"))
            .spawn(move || forward_lines(stdout, &tx));
        // The reader thread is detached: it ends once the pipe closes.
        if let Err(source) = reader {
            kill_and_reap(&mut child);
            return Err(spawn_error(source));
        }

        debug!("spawned engine (pid {pid}): {command}");
        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            lines: rx,
            killed: false,
        })
    }

    /// Returns the OS process id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Writes one line (a newline is appended) and flushes it.
    pub fn write_line(&mut self, line: &str) -> Result<(), ProcessError> {
        trace!("engine {} <- {line}", self.id());
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|()| self.stdin.write_all(b"\n"))
            .and_then(|()| self.stdin.flush())
            .map_err(|e| match e.kind() {
                io::ErrorKind::BrokenPipe => ProcessError::Closed,
                _ => ProcessError::Io(e),
            })
    }

    /// Reads the next raw line, waiting at most until `deadline`.
    pub fn read_line(&mut self, deadline: Instant) -> Result<String, ProcessError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => {
                trace!("engine {} -> {line}", self.id());
                Ok(line)
            }
            Ok(Err(e)) => Err(ProcessError::Io(e)),
            Err(RecvTimeoutError::Timeout) => Err(ProcessError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ProcessError::Closed),
        }
    }

    /// Reads lines until one decodes as a [`Record`], skipping console noise.
    pub fn read_record(
        &mut self,
        decoder: &LineDecoder,
        deadline: Instant,
    ) -> Result<Record, ProcessError> {
        loop {
            let line = self.read_line(deadline)?;
            match decoder.decode(&line) {
                Some(record) => return Ok(record),
                None => debug!("engine {}: skipping noise: {line}", self.id()),
            }
        }
    }

    /// Kills the engine and reaps it. Calling this more than once is a no-op.
    pub fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        debug!("killing engine (pid {})", self.id());
        kill_and_reap(&mut self.child);
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

fn kill_and_reap(child: &mut Child) {
    kill_group(child);
    match child.kill() {
        Ok(()) => {
            if let Err(e) = child.wait() {
                warn!("failed to reap engine (pid {}): {e}", child.id());
            }
        }
        // Already exited: reap without blocking.
        Err(_) => {
            let _ = child.try_wait();
        }
    }
}

/// Kills every process in the engine's group. The group id is the child's pid, which
/// stays reserved until the child is reaped.
#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::{
        errno::Errno,
        sys::signal::{self, Signal},
        unistd::Pid,
    };

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    match signal::killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("failed to kill engine process group {pgid}: {e}"),
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn forward_lines(stdout: ChildStdout, tx: &mpsc::Sender<io::Result<String>>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_owned();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sh(script: &str) -> EngineCommand {
        EngineCommand {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), script.to_owned()],
            current_dir: None,
        }
    }

    fn deadline(millis: u64) -> Instant {
        Instant::now() + Duration::from_millis(millis)
    }

    #[test]
    fn test_echo_roundtrip() {
        let mut process = EngineProcess::spawn(&sh("read line; echo \"got $line\"")).unwrap();
        process.write_line("1 2 3").unwrap();
        assert_eq!(process.read_line(deadline(5_000)).unwrap(), "got 1 2 3");
    }

    #[test]
    fn test_read_record_skips_noise() {
        let script = r#"echo "booting engine"; echo "not json {"; echo '{"state": [1], "current_phase": 0}'"#;
        let mut process = EngineProcess::spawn(&sh(script)).unwrap();
        let record = process
            .read_record(&LineDecoder::default(), deadline(5_000))
            .unwrap();
        assert!(record.is_observation());
    }

    #[test]
    fn test_read_times_out_on_silent_engine() {
        let mut process = EngineProcess::spawn(&sh("exec sleep 30")).unwrap();
        let started = Instant::now();
        let err = process.read_line(deadline(200)).unwrap_err();
        assert!(matches!(err, ProcessError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(10));
        process.kill();
    }

    #[test]
    fn test_closed_when_engine_exits() {
        let mut process = EngineProcess::spawn(&sh("exit 0")).unwrap();
        let err = process.read_line(deadline(5_000)).unwrap_err();
        assert!(matches!(err, ProcessError::Closed));
        assert!(err.is_transient());
    }

    #[test]
    fn test_spawn_missing_program() {
        let command = EngineCommand {
            program: "/nonexistent/evoplay-engine".to_owned(),
            args: vec![],
            current_dir: None,
        };
        let err = EngineProcess::spawn(&command).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut process = EngineProcess::spawn(&sh("exec sleep 30")).unwrap();
        process.kill();
        process.kill();
    }

    #[test]
    fn test_kill_reaches_background_children() {
        let mut process = EngineProcess::spawn(&sh("sleep 300 & echo $!; wait")).unwrap();
        let pid = process.read_line(deadline(5_000)).unwrap();
        process.kill();
        // The pipe only closes once the background sleep is gone too.
        let err = process.read_line(deadline(5_000)).unwrap_err();
        assert!(matches!(err, ProcessError::Closed), "pid {pid} outlived the kill");
    }

    #[test]
    fn test_command_display() {
        let command = EngineCommand {
            program: "torcs".to_owned(),
            args: vec!["3001".to_owned(), "race.xml".to_owned()],
            current_dir: None,
        };
        assert_eq!(command.to_string(), "torcs 3001 race.xml");
    }
}
