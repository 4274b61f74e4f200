//! Detections read from an external camera + detector process.
//!
//! The process owns the camera and the model. It prints one JSON line per
//! processed frame on stdout, either a bare list of detections or an object
//! with a `detections` list:
//!
//! ```text
//! [{"label": "person", "confidence": 0.91}, {"label": "person", "confidence": 0.4}]
//! {"detections": [{"class": "person", "score": 0.77}]}
//! ```
//!
//! The stream is infinite but not restartable: once the process exits, the
//! sensor must be reopened.

use std::fmt::{self, Debug, Formatter};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{SensorError, VisionSensor};
use crate::reading::{Detection, Frame};

pub struct DetectionStream {
    command: String,
    child: Child,
    lines: watch::Receiver<Line>,
    reader: JoinHandle<()>,
}

/// One line of detector output and when it was read.
#[derive(Debug, Clone)]
struct Line {
    received_at: DateTime<Utc>,
    text: String,
}

impl DetectionStream {
    /// Start the detector. `command[0]` is the program, the rest its arguments.
    pub fn spawn(command: &[String]) -> Result<DetectionStream, SensorError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SensorError::Unavailable("empty detector command".to_string()))?;

        tracing::info!(program, ?args, "starting detector process");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SensorError::Unavailable("detector stdout is not piped".to_string()))?;

        // only the newest frame matters; older lines are overwritten
        let (tx, lines) = watch::channel(Line {
            received_at: Utc::now(),
            text: String::new(),
        });
        let reader = tokio::spawn(forward_lines(BufReader::new(stdout), tx));

        Ok(DetectionStream {
            command: command.join(" "),
            child,
            lines,
            reader,
        })
    }
}

/// Copy every non-blank line into `tx` until end of output.
///
/// Lines are decoded lossily so a garbled frame reaches the parser and
/// fails there, without ending the stream.
async fn forward_lines<R: AsyncBufRead + Unpin>(mut output: R, tx: watch::Sender<Line>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match output.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::warn!("detector closed its output");
                break;
            }
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                if text.trim().is_empty() {
                    continue;
                }
                let line = Line {
                    received_at: Utc::now(),
                    text: text.into_owned(),
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading detector output failed");
                break;
            }
        }
    }
}

#[async_trait]
impl VisionSensor for DetectionStream {
    async fn detect(&mut self) -> Result<Frame, SensorError> {
        if self.lines.changed().await.is_err() {
            if let Ok(Some(status)) = self.child.try_wait() {
                tracing::warn!(%status, "detector process exited");
            }
            return Err(SensorError::StreamEnded);
        }

        let line = self.lines.borrow_and_update().clone();
        Ok(Frame::new(parse_detections(&line.text)?, line.received_at))
    }
}

impl Drop for DetectionStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Debug for DetectionStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionStream")
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameLine {
    Bare(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

/// Parse one line of detector output.
pub fn parse_detections(line: &str) -> Result<Vec<Detection>, SensorError> {
    match serde_json::from_str::<FrameLine>(line.trim()) {
        Ok(FrameLine::Bare(detections)) | Ok(FrameLine::Wrapped { detections }) => Ok(detections),
        Err(e) => Err(SensorError::Malformed(format!("{e}: {line:?}"))),
    }
}
