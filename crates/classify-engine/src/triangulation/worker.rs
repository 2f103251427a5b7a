//! Process-isolated triangulation.
//!
//! The `trig-worker` binary reads one [`TriangulationRequest`] as JSON from
//! stdin and writes one [`TriangulationResponse`] to stdout. Any crash of the
//! worker, including aborts inside the triangulation library, surfaces in the
//! caller as a recoverable [`ClassifyError::Worker`].

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use classify_common::{ClassifyError, ClassifyResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{SpadeTriangulator, Triangulator};

/// Environment variable naming the worker executable.
pub const TRIG_WORKER_ENV: &str = "CLASSIFY_TRIG_WORKER";

/// Executable name used when no path is configured.
pub const DEFAULT_WORKER_PROGRAM: &str = "trig-worker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangulationRequest {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TriangulationResponse {
    Ok { triangles: Vec<[usize; 3]> },
    Error { message: String },
}

/// Answer a single request read from `reader`.
///
/// Triangulation failures are written as an error response; only unreadable
/// requests and I/O failures are returned as `Err`.
pub fn serve<R: Read, W: Write>(reader: R, mut writer: W) -> ClassifyResult<()> {
    let request: TriangulationRequest = serde_json::from_reader(reader)?;
    debug!(points = request.x.len(), "Triangulation request received");

    let response = match SpadeTriangulator.triangulate(&request.x, &request.y) {
        Ok(triangles) => TriangulationResponse::Ok { triangles },
        Err(err) => {
            warn!(error = %err, "Triangulation failed");
            TriangulationResponse::Error {
                message: err.to_string(),
            }
        }
    };

    serde_json::to_writer(&mut writer, &response)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Runs triangulation in a separate `trig-worker` process.
#[derive(Debug, Clone)]
pub struct WorkerTriangulator {
    program: PathBuf,
}

impl WorkerTriangulator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Worker from `CLASSIFY_TRIG_WORKER`, else `trig-worker` on the PATH.
    pub fn from_env() -> Self {
        match std::env::var_os(TRIG_WORKER_ENV) {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => Self::new(DEFAULT_WORKER_PROGRAM),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Triangulator for WorkerTriangulator {
    fn triangulate(&self, x: &[f64], y: &[f64]) -> ClassifyResult<Vec<[usize; 3]>> {
        let request = serde_json::to_vec(&TriangulationRequest {
            x: x.to_vec(),
            y: y.to_vec(),
        })?;

        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ClassifyError::Worker(format!("cannot start {}: {}", self.program.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClassifyError::Worker("worker stdin unavailable".to_string()))?;
        // Written from a thread so a large request cannot deadlock against unread stdout
        let feeder = thread::spawn(move || stdin.write_all(&request));

        let output = child.wait_with_output()?;
        let fed = feeder
            .join()
            .map_err(|_| ClassifyError::Worker("request writer panicked".to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClassifyError::Worker(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        fed?;

        match serde_json::from_slice::<TriangulationResponse>(&output.stdout)? {
            TriangulationResponse::Ok { triangles } => {
                debug!(
                    points = x.len(),
                    triangles = triangles.len(),
                    "Worker triangulation complete"
                );
                Ok(triangles)
            }
            TriangulationResponse::Error { message } => Err(ClassifyError::Worker(message)),
        }
    }

    fn name(&self) -> &'static str {
        "worker"
    }
}
