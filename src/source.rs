//! Line sources for the two capture modes.
//!
//! The measurement loop only ever asks for "the next line or end of
//! stream"; whether that line comes from a converted trace file or from a
//! live `dlt-receive` process is hidden behind [`LineSource`].

use crate::error::AnalyzeError;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

const CAPTURE_PROGRAM: &str = "dlt-receive";

/// Yields one trimmed line at a time; `Ok(None)` signals exhaustion.
pub trait LineSource {
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Replays a trace that was converted to text with `dlt-convert -a`.
pub struct ReplaySource {
    reader: BufReader<std::fs::File>,
}

impl ReplaySource {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(ReplaySource {
            reader: BufReader::new(std::fs::File::open(path)?),
        })
    }
}

impl LineSource for ReplaySource {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        read_trimmed_line(&mut self.reader)
    }
}

/// Live capture through a `dlt-receive` child process.
///
/// The child is a scoped resource: it is killed and reaped in [`stop`],
/// which also runs on drop, so it cannot outlive the measurement on any
/// exit path.
///
/// [`stop`]: ReceiveSource::stop
pub struct ReceiveSource {
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
}

impl ReceiveSource {
    /// Spawn `dlt-receive` against the given address and port. A spawn
    /// failure is fatal and surfaces before any measurement begins.
    pub fn spawn(address: &str, port: u16) -> Result<Self, AnalyzeError> {
        Self::spawn_program(CAPTURE_PROGRAM, address, port)
    }

    fn spawn_program(program: &str, address: &str, port: u16) -> Result<Self, AnalyzeError> {
        let command = format!("{program} -a {address} -p {port}");
        let spawn_err = |source| AnalyzeError::CaptureSpawn {
            command: command.clone(),
            source,
        };

        let mut child = Command::new(program)
            .args(["-a", address, "-p", &port.to_string()])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_err)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err(io::Error::other("no stdout pipe")))?;

        Ok(ReceiveSource {
            child: Some(child),
            stdout: BufReader::new(stdout),
        })
    }

    /// Terminate the capture process. Safe to call more than once; a kill
    /// failure is reported on stderr but never masks the measurement
    /// result.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {} // already exited
                _ => {
                    if let Err(err) = child.kill() {
                        eprintln!("dlt-load: warning: failed to stop capture process: {err}");
                    }
                }
            }
            let _ = child.wait();
        }
    }
}

impl LineSource for ReceiveSource {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        read_trimmed_line(&mut self.stdout)
    }
}

impl Drop for ReceiveSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Trace payloads may carry arbitrary bytes, so lines are read raw and
/// decoded lossily rather than failing on invalid UTF-8.
fn read_trimmed_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).trim().to_string()))
}
