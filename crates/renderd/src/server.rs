//! Single-client serving loop.
//!
//! The server binds the socket, accepts exactly one client and then cycles
//! over that connection: read a framed message, dispatch it, write the
//! response. A cycle that finds no complete message sleeps for the idle
//! interval. Errors are logged and the loop carries on until the shutdown
//! flag is raised.

use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use renderd_config::{Config, FramingMode};
use tracing::{debug, info, warn};

use crate::dispatch::{RequestHandler, ResponseWriter};
use crate::health::HealthReporter;
use crate::transport::{FramedReader, ListenerError, SocketListener};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Runtime parameters of the serving loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Socket path to bind.
    pub socket_path: Utf8PathBuf,
    /// Framing used for requests and responses.
    pub framing: FramingMode,
    /// Sleep between polls that found no complete message.
    pub idle_interval: Duration,
    /// Largest accepted message, if bounded.
    pub max_message_bytes: Option<usize>,
}

impl ServerOptions {
    /// Extracts the serving parameters from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            socket_path: config.socket_path().to_path_buf(),
            framing: config.framing(),
            idle_interval: config.idle_interval(),
            max_message_bytes: config.max_message_bytes(),
        }
    }
}

/// A bound server waiting to be run.
pub struct Server {
    listener: SocketListener,
    options: ServerOptions,
    handler: RequestHandler,
    reporter: Arc<dyn HealthReporter>,
}

impl Server {
    /// Binds the configured socket, replacing any stale file at its path.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the stale file cannot be removed or
    /// the socket cannot be bound.
    pub fn bind(
        options: ServerOptions,
        handler: RequestHandler,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, ListenerError> {
        let listener = SocketListener::bind(&options.socket_path)?;
        reporter.server_listening(listener.path());
        Ok(Self {
            listener,
            options,
            handler,
            reporter,
        })
    }

    /// Path the server is bound to.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        self.listener.path()
    }

    /// Accepts one client and serves it until `shutdown` is raised.
    ///
    /// The socket file is removed when this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when accepting or configuring the client
    /// connection fails. Per-message failures are logged and never end the
    /// loop.
    pub fn run(self, shutdown: &AtomicBool) -> Result<(), ListenerError> {
        let result = self.serve(shutdown);
        self.reporter.server_stopped();
        result
    }

    /// Runs the server on a background thread.
    #[must_use]
    pub fn start(self) -> ServerHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let socket_path = self.socket_path().to_path_buf();
        let handle = thread::spawn(move || self.run(&flag));
        ServerHandle {
            shutdown,
            socket_path,
            handle: Some(handle),
        }
    }

    fn serve(&self, shutdown: &AtomicBool) -> Result<(), ListenerError> {
        let Some(stream) = self
            .listener
            .accept_one(shutdown, self.options.idle_interval)?
        else {
            debug!(target: SERVER_TARGET, "shutdown requested before a client connected");
            return Ok(());
        };
        self.reporter.client_connected();
        self.serve_client(&stream, shutdown);
        Ok(())
    }

    fn serve_client(&self, stream: &UnixStream, shutdown: &AtomicBool) {
        let mut reader = FramedReader::new(self.options.framing, self.options.max_message_bytes);
        let mut writer = ResponseWriter::new(stream, self.options.framing);
        let mut input = stream;
        while !shutdown.load(Ordering::SeqCst) {
            match reader.read_message(&mut input) {
                Ok(Some(message)) => self.respond(&message, &mut writer),
                Ok(None) => thread::sleep(self.options.idle_interval),
                Err(error) => {
                    warn!(target: SERVER_TARGET, %error, "failed to read request");
                }
            }
        }
    }

    fn respond(&self, message: &[u8], writer: &mut ResponseWriter<&UnixStream>) {
        let result = match self.handler.handle_message(message) {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    target: SERVER_TARGET,
                    %error,
                    bytes = message.len(),
                    "dropping undecodable request"
                );
                return;
            }
        };
        if let Err(error) = writer.write_result(&result) {
            warn!(target: SERVER_TARGET, %error, "failed to write response");
        } else {
            info!(
                target: SERVER_TARGET,
                success = result.is_success(),
                "request served"
            );
        }
    }
}

/// Handle to a server running on a background thread.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    socket_path: Utf8PathBuf,
    handle: Option<thread::JoinHandle<Result<(), ListenerError>>>,
}

impl ServerHandle {
    /// Path the server is bound to.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        &self.socket_path
    }

    /// Requests the loop to stop after its current cycle.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Reports whether the serving thread has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(thread::JoinHandle::is_finished)
    }

    /// Waits for the serving thread to finish.
    ///
    /// # Errors
    ///
    /// Returns the loop's [`ListenerError`], or
    /// [`ListenerError::ThreadPanic`] when the thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic)?,
            None => Ok(()),
        }
    }

    /// Requests shutdown and waits for the serving thread.
    ///
    /// # Errors
    ///
    /// See [`ServerHandle::join`].
    pub fn stop(self) -> Result<(), ListenerError> {
        self.shutdown();
        self.join()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
