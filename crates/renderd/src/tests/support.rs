//! Shared collaborators for the daemon test suites.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use renderd_config::{Config, FramingMode};
use serde_json::Value;
use tempfile::TempDir;

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;
use crate::process::{ShutdownError, ShutdownSignal};
use crate::transport::{FramedReader, write_message};

const RESPONSE_DEADLINE: Duration = Duration::from_secs(10);

/// Temporary directory holding sockets, scripts and resources.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temporary directory"),
        }
    }

    /// Absolute UTF-8 path of `relative` inside the scratch directory.
    pub fn path(&self, relative: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(relative))
            .expect("temporary path was not valid UTF-8")
    }

    /// Writes `contents` to `relative` and returns its path.
    pub fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directory");
        }
        fs::write(&path, contents).expect("failed to write scratch file");
        path
    }
}

/// Loader resolving a socket under a nested temporary directory.
pub struct TestConfigLoader {
    scratch: Scratch,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scratch: Scratch::new(),
        }
    }

    pub fn socket_path(&self) -> Utf8PathBuf {
        self.scratch.path("run/renderd.sock")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("renderd"),
            OsString::from("--socket-path"),
            OsString::from(self.socket_path().as_str()),
            OsString::from("--idle-interval-ms"),
            OsString::from("10"),
        ];
        Config::load_from_iter(args)
    }
}

/// Loader that always fails on an unknown framing mode.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("renderd"),
            OsString::from("--framing"),
            OsString::from("newline"),
        ];
        Config::load_from_iter(args)
    }
}

/// Shutdown signal that fires immediately, or fails when asked to.
pub struct ImmediateShutdown {
    pub fail: bool,
}

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        if self.fail {
            return Err(ShutdownError::Install {
                source: io::Error::other("signal handlers unavailable"),
            });
        }
        Ok(())
    }
}

/// Shutdown signal that fires once its sender sends or is dropped.
pub struct PendingShutdown {
    release: Mutex<Receiver<()>>,
}

impl PendingShutdown {
    /// Creates the signal together with the sender that releases it.
    pub fn new() -> (Sender<()>, Self) {
        let (sender, release) = mpsc::channel();
        (
            sender,
            Self {
                release: Mutex::new(release),
            },
        )
    }
}

impl ShutdownSignal for PendingShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        let release = self.release.lock().expect("release mutex poisoned");
        release.recv().ok();
        Ok(())
    }
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Waits until `event` has been recorded.
    pub fn wait_for(&self, event: &HealthEvent) -> bool {
        let deadline = Instant::now() + RESPONSE_DEADLINE;
        while Instant::now() < deadline {
            if self.events().contains(event) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn server_listening(&self, socket: &Utf8Path) {
        self.record(HealthEvent::ServerListening(socket.to_path_buf()));
    }

    fn client_connected(&self) {
        self.record(HealthEvent::ClientConnected);
    }

    fn server_stopped(&self) {
        self.record(HealthEvent::ServerStopped);
    }
}

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ServerListening(Utf8PathBuf),
    ClientConnected,
    ServerStopped,
}

/// Client end of a daemon connection.
pub struct TestClient {
    stream: UnixStream,
    reader: FramedReader,
    framing: FramingMode,
}

impl TestClient {
    /// Connects to `path`, speaking `framing`.
    pub fn connect(path: &Utf8Path, framing: FramingMode) -> Self {
        let stream = UnixStream::connect(path).expect("failed to connect to daemon socket");
        stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .expect("failed to set client read timeout");
        Self {
            stream,
            reader: FramedReader::new(framing, None),
            framing,
        }
    }

    /// Sends one raw message.
    pub fn send(&self, payload: &[u8]) {
        write_message(&mut &self.stream, self.framing, payload).expect("failed to send request");
    }

    /// Sends a JSON request.
    pub fn send_json(&self, request: &Value) {
        self.send(&serde_json::to_vec(request).expect("request serialises"));
    }

    /// Waits for the next response and parses it as JSON.
    pub fn receive(&mut self) -> Result<Value, String> {
        let deadline = Instant::now() + RESPONSE_DEADLINE;
        while Instant::now() < deadline {
            let message = self
                .reader
                .read_message(&mut &self.stream)
                .map_err(|error| format!("failed to read response: {error}"))?;
            if let Some(bytes) = message {
                return serde_json::from_slice(&bytes)
                    .map_err(|error| format!("response is not JSON: {error}"));
            }
        }
        Err("timed out waiting for a response".to_owned())
    }

    /// Sends `request` and waits for its response.
    pub fn round_trip(&mut self, request: &Value) -> Result<Value, String> {
        self.send_json(request);
        self.receive()
    }

    /// Reports whether a response arrives within `window`.
    pub fn nothing_within(&mut self, window: Duration) -> bool {
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            match self.reader.read_message(&mut &self.stream) {
                Ok(None) => {}
                Ok(Some(_)) | Err(_) => return false,
            }
        }
        true
    }
}
