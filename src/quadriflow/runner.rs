use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const RELAY_GRACE: Duration = Duration::from_millis(250);

/// How an external process run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process ran and terminated. `code` is `None` when it was killed by a signal.
    Exited { code: Option<i32> },
    /// The process outlived the configured timeout and was killed
    TimedOut { after: Duration },
    /// The process could not be started
    LaunchFailed { kind: io::ErrorKind, message: String },
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Exited { code: Some(0) })
    }

    fn launch_failed(error: &io::Error) -> Self {
        ExitOutcome::LaunchFailed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        ExitOutcome::Exited {
            code: status.code(),
        }
    }
}

/// Runs an argument vector (program first) to completion
pub trait ProcessRunner {
    fn run(&self, argv: &[OsString]) -> ExitOutcome;
}

/// Runs processes on the host OS, blocking until they finish.
///
/// The child's stdout and stderr are relayed line by line to the log under
/// the `quadmsh::tool` target.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[OsString]) -> ExitOutcome {
        let Some((program, args)) = argv.split_first() else {
            return ExitOutcome::LaunchFailed {
                kind: io::ErrorKind::InvalidInput,
                message: "empty argument vector".to_string(),
            };
        };

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ExitOutcome::launch_failed(&e),
        };

        debug!(pid = child.id(), "Remesher started");

        let relays: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|s| relay(s, "stdout")),
            child.stderr.take().map(|s| relay(s, "stderr")),
        ]
        .into_iter()
        .flatten()
        .collect();

        let outcome = match self.timeout {
            None => child.wait().map(ExitOutcome::from).inspect_err(|_| {
                let _ = child.kill();
            }),
            Some(limit) => wait_with_timeout(&mut child, limit),
        };

        // A grandchild may still hold the pipes open once the child is gone.
        // After a timeout or a lost child, don't wait on it.
        let bounded = matches!(outcome, Ok(ExitOutcome::TimedOut { .. }) | Err(_));
        join_relays(relays, bounded.then_some(RELAY_GRACE));

        outcome.unwrap_or_else(|e| {
            warn!("Lost track of remesher process: {}", e);
            ExitOutcome::launch_failed(&e)
        })
    }
}

fn wait_with_timeout(child: &mut Child, limit: Duration) -> io::Result<ExitOutcome> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.into()),
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
        if Instant::now() >= deadline {
            warn!(timeout = ?limit, "Remesher timed out, killing it");
            // Fails only if the child exited in the meantime; wait() reaps it either way
            let _ = child.kill();
            child.wait()?;
            return Ok(ExitOutcome::TimedOut { after: limit });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Join relay threads, giving up after `grace` when one is set.
/// Threads still running then are left to finish on their own.
fn join_relays(relays: Vec<JoinHandle<()>>, grace: Option<Duration>) {
    if let Some(grace) = grace {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && relays.iter().any(|h| !h.is_finished()) {
            thread::sleep(POLL_INTERVAL);
        }
    }

    for handle in relays {
        if grace.is_none() || handle.is_finished() {
            let _ = handle.join();
        } else {
            debug!("Detaching output relay still held open by a descendant process");
        }
    }
}

/// Drain `stream` to EOF, logging each line. Non-UTF-8 bytes are replaced,
/// never treated as the end of output.
fn relay<R: Read + Send + 'static>(stream: R, name: &'static str) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    debug!(target: "quadmsh::tool", stream = name, "{}", line.trim_end());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(stream = name, "Stopped relaying tool output: {}", e);
                    break;
                }
            }
        }
    })
}
