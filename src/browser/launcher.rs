//! Browser process launcher.
//!
//! External collaborator consumed at its interface boundary: `start`
//! spawns the vibium browser binary and yields the WebSocket port it
//! listens on; `terminate` is a best-effort kill. The protocol client
//! connects to `ws://localhost:<port>` once `start` returns.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for the spawned process to start listening.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for the port to accept connections.
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Binary name looked up on `PATH` when no explicit path is given.
const DEFAULT_BINARY: &str = "vibium";

// ============================================================================
// LaunchOptions
// ============================================================================

/// Configuration for launching the browser process.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Run the browser headless (default: visible).
    pub headless: bool,

    /// WebSocket port (default: auto-assigned free port).
    pub port: Option<u16>,

    /// Path to the vibium binary (default: `PATH` lookup).
    pub executable_path: Option<PathBuf>,
}

impl LaunchOptions {
    /// Creates default options: visible browser, auto port, `PATH` binary.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the browser headless.
    #[inline]
    #[must_use]
    pub fn headless(mut self) -> Self {
        self.headless = true;
        self
    }

    /// Uses a fixed WebSocket port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Uses an explicit binary path instead of `PATH` lookup.
    #[inline]
    #[must_use]
    pub fn executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }
}

// ============================================================================
// BrowserProcess
// ============================================================================

/// A running browser process.
pub struct BrowserProcess {
    child: Child,
    port: u16,
}

impl BrowserProcess {
    /// Launches the browser and waits until its port accepts connections.
    ///
    /// # Errors
    ///
    /// - [`Error::BinaryNotFound`] if an explicit path does not exist
    /// - [`Error::LaunchFailed`] if the process fails to spawn
    /// - [`Error::Timeout`] if the port never comes up
    pub async fn start(options: &LaunchOptions) -> Result<Self> {
        let binary = Self::resolve_binary(options)?;
        let port = match options.port {
            Some(port) => port,
            None => Self::pick_free_port().await?,
        };

        let mut cmd = Command::new(&binary);
        cmd.arg("--port").arg(port.to_string());
        if options.headless {
            cmd.arg("--headless");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::launch_failed(format!("{}: {e}", binary.display())))?;
        let pid = child.id();
        info!(pid, port, "Browser process spawned");

        Self::wait_for_port(port).await?;
        debug!(port, "Browser listening");

        Ok(Self { child, port })
    }

    /// Returns the WebSocket port the browser listens on.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Terminates the browser process.
    ///
    /// Best-effort: kill failures are logged, not propagated. Idempotent.
    pub async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill browser process");
        }
        debug!("Browser process terminated");
    }

    fn resolve_binary(options: &LaunchOptions) -> Result<PathBuf> {
        match &options.executable_path {
            Some(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(Error::binary_not_found(path.clone()))
                }
            }
            // PATH lookup is delegated to the OS at spawn time.
            None => Ok(PathBuf::from(DEFAULT_BINARY)),
        }
    }

    /// Asks the OS for a free port by binding to port 0.
    async fn pick_free_port() -> Result<u16> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        drop(listener);
        Ok(port)
    }

    /// Polls the port until it accepts a TCP connection.
    async fn wait_for_port(port: u16) -> Result<()> {
        let wait = async {
            loop {
                if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                    return;
                }
                sleep(STARTUP_POLL_INTERVAL).await;
            }
        };

        timeout(STARTUP_TIMEOUT, wait).await.map_err(|_| {
            Error::timeout(
                format!("waiting for browser on port {port}"),
                STARTUP_TIMEOUT.as_millis() as u64,
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_builder() {
        let options = LaunchOptions::new()
            .headless()
            .port(9000)
            .executable_path("/opt/vibium/vibium");

        assert!(options.headless);
        assert_eq!(options.port, Some(9000));
        assert_eq!(
            options.executable_path,
            Some(PathBuf::from("/opt/vibium/vibium"))
        );
    }

    #[test]
    fn test_missing_explicit_binary_is_rejected() {
        let options = LaunchOptions::new().executable_path("/nonexistent/vibium");
        let err = BrowserProcess::resolve_binary(&options).expect_err("missing binary");
        assert!(matches!(err, Error::BinaryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_pick_free_port() {
        let port = BrowserProcess::pick_free_port().await.expect("free port");
        assert!(port > 0);
    }
}
