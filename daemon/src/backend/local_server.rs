//! Long-running local model server
//!
//! The model is loaded once when the process starts. Requests wait for the
//! server to answer its health check the first time, then go straight
//! through. The process is killed when the handle is dropped.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::BackendError;

/// Delay between two health checks while the model loads
const HEALTH_POLL: Duration = Duration::from_millis(250);

pub(super) struct LocalServer {
    name: &'static str,
    base_url: String,
    health_path: &'static str,
    startup: Duration,
    child: Mutex<Child>,
    ready: AtomicBool,
}

impl LocalServer {
    /// Start `program` listening on `127.0.0.1:port`
    pub fn spawn(
        name: &'static str,
        program: &str,
        args: Vec<OsString>,
        port: u16,
        health_path: &'static str,
        startup: Duration,
    ) -> Result<Self, BackendError> {
        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::NotConfigured(format!("{name} ({program}: {e})")))?;

        info!(server = name, program, port, pid = child.id(), "local model server started");
        Ok(Self {
            name,
            base_url: format!("http://127.0.0.1:{port}"),
            health_path,
            startup,
            child: Mutex::new(child),
            ready: AtomicBool::new(false),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[cfg(test)]
    pub fn pid(&self) -> Option<u32> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner).id()
    }

    fn exited(&self) -> Option<ExitStatus> {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_wait()
            .ok()
            .flatten()
    }

    /// Fail fast if the server died; otherwise wait until it has loaded its model
    pub async fn ensure_ready(&self, client: &reqwest::Client) -> Result<(), String> {
        if let Some(status) = self.exited() {
            return Err(format!("{} exited ({status})", self.name));
        }
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let deadline = Instant::now() + self.startup;
        let health = self.url(self.health_path);
        loop {
            match client.get(&health).send().await {
                Ok(response) if response.status().is_success() => {
                    self.ready.store(true, Ordering::Release);
                    info!(server = self.name, "local model loaded");
                    return Ok(());
                }
                Ok(response) => {
                    debug!(server = self.name, status = %response.status(), "model still loading");
                }
                Err(e) => debug!(server = self.name, error = %e, "server not listening yet"),
            }

            if let Some(status) = self.exited() {
                return Err(format!("{} exited ({status})", self.name));
            }
            if Instant::now() >= deadline {
                return Err(format!("{} not ready after {:?}", self.name, self.startup));
            }
            sleep(HEALTH_POLL).await;
        }
    }
}
