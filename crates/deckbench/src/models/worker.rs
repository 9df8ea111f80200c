//! Persistent inference worker speaking JSON lines over stdin/stdout.
//!
//! The worker is started once, receives a `load` request and then serves any
//! number of `infer` requests:
//!
//! ```text
//! -> {"op":"load","model":"deepseek-ai/DeepSeek-OCR-2","strategy":"vllm","quantize":false}
//! <- {"ok":true}
//! -> {"op":"infer","images":["/tmp/slide_001.png"],"prompt":"<image>\nFree OCR."}
//! <- {"ok":true,"texts":["..."]}
//! ```
//!
//! A reply with `"ok":false` carries an `error` message. Requests are
//! serialized per worker; one request is in flight at a time.

use super::ModelRuntime;
use crate::error::{DeckbenchError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum WorkerRequest<'a> {
    Infer {
        images: Vec<&'a Path>,
        #[serde(skip_serializing_if = "str::is_empty")]
        prompt: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    ok: bool,
    #[serde(default)]
    texts: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

struct WorkerIo {
    // Held so the process is killed when the worker is dropped.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A running worker process.
pub struct WorkerProcess {
    name: String,
    io: Mutex<WorkerIo>,
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess").field("name", &self.name).finish()
    }
}

fn resolve_program(name: &str, program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|e| {
        DeckbenchError::dependency_unavailable(
            name,
            format!(
                "Worker program '{}' not found ({}). Install the worker or set its worker_command in deckbench.toml.",
                program, e
            ),
        )
    })
}

impl WorkerProcess {
    /// Start the worker and send it `load` as the first request.
    ///
    /// `load` must be a JSON object; `"op":"load"` is added to it.
    ///
    /// # Errors
    ///
    /// `DependencyUnavailable` if the program cannot be found or started, or if
    /// the worker reports that the model could not be loaded.
    pub async fn spawn(name: &str, command: &[String], load: serde_json::Value) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| DeckbenchError::configuration(format!("Empty worker command for {}", name)))?;
        let program_path = resolve_program(name, program)?;

        tracing::info!("Starting {} worker: {}", name, command.join(" "));

        let mut child = Command::new(&program_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DeckbenchError::dependency_unavailable(
                    name,
                    format!("Failed to start '{}': {}", program_path.display(), e),
                )
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DeckbenchError::Io(std::io::Error::other("Failed to capture worker stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeckbenchError::Io(std::io::Error::other("Failed to capture worker stdout")))?;

        let worker = Self {
            name: name.to_string(),
            io: Mutex::new(WorkerIo {
                _child: child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
        };

        let mut request = match load {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(DeckbenchError::configuration(format!(
                    "Worker load request must be a JSON object, got {}",
                    other
                )));
            }
        };
        request.insert("op".to_string(), serde_json::Value::from("load"));

        let reply = worker.round_trip(&serde_json::Value::Object(request)).await?;
        if !reply.ok {
            return Err(DeckbenchError::dependency_unavailable(
                name,
                reply.error.unwrap_or_else(|| "worker failed to load the model".to_string()),
            ));
        }

        tracing::info!("{} worker ready", name);
        Ok(worker)
    }

    async fn round_trip<T: Serialize>(&self, request: &T) -> Result<WorkerReply> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let reply = io.stdout.next_line().await?.ok_or_else(|| {
            DeckbenchError::backend(&self.name, "worker exited before replying")
        })?;

        serde_json::from_str(&reply).map_err(|e| {
            DeckbenchError::malformed_response_with_source(format!("{} worker sent an invalid reply", self.name), e)
        })
    }
}

#[async_trait]
impl ModelRuntime for WorkerProcess {
    async fn infer(&self, images: &[PathBuf], prompt: &str) -> Result<Vec<String>> {
        let request = WorkerRequest::Infer {
            images: images.iter().map(PathBuf::as_path).collect(),
            prompt,
        };
        let reply = self.round_trip(&request).await?;

        if !reply.ok {
            return Err(DeckbenchError::backend(
                &self.name,
                reply.error.unwrap_or_else(|| "inference failed".to_string()),
            ));
        }
        if reply.texts.len() != images.len() {
            return Err(DeckbenchError::malformed_response(format!(
                "{} worker returned {} texts for {} images",
                self.name,
                reply.texts.len(),
                images.len()
            )));
        }

        Ok(reply.texts)
    }
}
