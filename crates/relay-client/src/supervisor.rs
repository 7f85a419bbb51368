//! Reconnect supervisor.
//!
//! [`ReconnectSupervisor::spawn`] starts a background task that owns at most
//! one [`TransportLink`] at a time and returns a [`SupervisorHandle`]. The task
//! connects immediately, reconnects after an unintended close at a fixed
//! interval up to `max_attempts` times, and stops retrying silently once the
//! budget is spent. [`SupervisorHandle::reconnect`] restores the budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{ClientAction, ServerEvent};
use relay_settings::ClientSettings;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{ClientError, Result};
use crate::transport::{Connector, LinkEvent, Outbox, TransportLink};

/// Default automatic reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Connection status as observed by the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connection attempt is in flight.
    Connecting,
    /// The link is open.
    Connected,
    /// No link; a retry may or may not be scheduled.
    Disconnected,
    /// The last attempt or link failed.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        })
    }
}

/// Retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Automatic attempts after an unintended close.
    pub max_attempts: u32,
    /// Fixed delay before each attempt.
    pub interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl From<&ClientSettings> for SupervisorConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            max_attempts: settings.reconnect_attempts,
            interval: settings.reconnect_interval(),
        }
    }
}

/// Application callbacks, invoked on the supervisor task.
///
/// The [`Outbox`] passed to `on_open` and `on_event` writes to the link that
/// is current at the time of the call. A kept copy does not hold that link
/// open and stops accepting frames once the link closes.
pub trait SupervisorHandler: Send + 'static {
    /// The link opened.
    fn on_open(&mut self, _outbox: &Outbox) {}
    /// A decoded server event arrived.
    fn on_event(&mut self, _event: ServerEvent, _outbox: &Outbox) {}
    /// The link closed or an attempt failed.
    fn on_close(&mut self) {}
    /// A connection attempt or open link failed.
    fn on_error(&mut self, _reason: &str) {}
}

enum Command {
    Send(ClientAction),
    Disconnect,
    Reconnect,
    Shutdown,
}

/// Handle to a running supervisor.
#[derive(Debug)]
pub struct SupervisorHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Send an action on the current link. Dropped with a warning when not
    /// connected.
    pub fn send(&self, action: ClientAction) {
        if self.cmd_tx.send(Command::Send(action)).is_err() {
            warn!("supervisor stopped, dropping action");
        }
    }

    /// Close the link and stop automatic reconnects.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Close the link, restore the retry budget, and connect again.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Disconnect and wait for the task to exit.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.cmd_tx.send(Command::Shutdown);
        self.task.await.map_err(|_| ClientError::Closed)
    }
}

/// The supervisor task state.
pub struct ReconnectSupervisor<C: Connector, H: SupervisorHandler> {
    connector: Arc<C>,
    handler: H,
    config: SupervisorConfig,
    attempts: u32,
    link: Option<TransportLink>,
    pending: Option<JoinHandle<Result<TransportLink>>>,
    retry_at: Option<Instant>,
    status: watch::Sender<ConnectionStatus>,
}

impl<C: Connector, H: SupervisorHandler> ReconnectSupervisor<C, H> {
    /// Start the supervisor. The first connection attempt begins immediately.
    pub fn spawn(connector: C, handler: H, config: SupervisorConfig) -> SupervisorHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);

        let supervisor = Self {
            connector: Arc::new(connector),
            handler,
            config,
            attempts: 0,
            link: None,
            pending: None,
            retry_at: None,
            status: status_tx,
        };
        let task = tokio::spawn(supervisor.run(cmd_rx));

        SupervisorHandle {
            cmd_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        self.begin_connect();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Send(action)) => self.send(&action),
                    Some(Command::Disconnect) => self.disconnect(),
                    Some(Command::Reconnect) => {
                        self.disconnect();
                        self.attempts = 0;
                        self.begin_connect();
                    }
                    Some(Command::Shutdown) | None => {
                        self.disconnect();
                        break;
                    }
                },
                outcome = wait_pending(&mut self.pending) => {
                    self.pending = None;
                    match outcome {
                        Ok(Ok(link)) => self.on_connected(link),
                        Ok(Err(e)) => self.on_failure(&e.to_string()),
                        Err(e) => self.on_failure(&format!("connect task failed: {e}")),
                    }
                }
                event = next_event(&mut self.link) => match event {
                    Some(LinkEvent::Frame(text)) => self.on_frame(&text),
                    Some(LinkEvent::Error(reason)) => {
                        self.link = None;
                        self.on_failure(&reason);
                    }
                    Some(LinkEvent::Closed) | None => {
                        self.link = None;
                        self.on_closed();
                    }
                },
                () = wait_until(self.retry_at) => {
                    self.retry_at = None;
                    self.begin_connect();
                }
            }
        }
        debug!("supervisor stopped");
    }

    fn begin_connect(&mut self) {
        self.set_status(ConnectionStatus::Connecting);
        let connector = self.connector.clone();
        self.pending = Some(tokio::spawn(async move { connector.connect().await }));
    }

    fn on_connected(&mut self, link: TransportLink) {
        info!("connected");
        self.attempts = 0;
        let outbox = link.outbox();
        self.link = Some(link);
        self.set_status(ConnectionStatus::Connected);
        self.handler.on_open(&outbox);
    }

    fn on_frame(&mut self, text: &str) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        match ServerEvent::parse(text) {
            Ok(event) => {
                let outbox = link.outbox();
                self.handler.on_event(event, &outbox);
            }
            Err(e) => warn!(error = %e, "dropping undecodable frame"),
        }
    }

    fn on_failure(&mut self, reason: &str) {
        warn!(reason, "connection failed");
        self.set_status(ConnectionStatus::Error);
        self.handler.on_error(reason);
        self.on_closed();
    }

    fn on_closed(&mut self) {
        self.set_status(ConnectionStatus::Disconnected);
        self.handler.on_close();

        if self.attempts < self.config.max_attempts {
            self.attempts += 1;
            info!(
                attempt = self.attempts,
                max = self.config.max_attempts,
                delay_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            );
            self.retry_at = Some(Instant::now() + self.config.interval);
        } else {
            debug!(attempts = self.attempts, "reconnect budget spent");
        }
    }

    fn send(&self, action: &ClientAction) {
        match (&self.link, *self.status.borrow()) {
            (Some(link), ConnectionStatus::Connected) => {
                if !link.outbox().send(action) {
                    warn!(action = action.name(), "link closed, dropping action");
                }
            }
            (_, status) => warn!(action = action.name(), %status, "not connected, dropping action"),
        }
    }

    fn disconnect(&mut self) {
        self.retry_at = None;
        self.attempts = self.config.max_attempts;

        let had_attempt = match self.pending.take() {
            Some(pending) => {
                pending.abort();
                true
            }
            None => false,
        };
        let had_link = match self.link.take() {
            Some(link) => {
                link.close();
                true
            }
            None => false,
        };

        self.set_status(ConnectionStatus::Disconnected);
        if had_link || had_attempt {
            self.handler.on_close();
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn wait_pending(
    pending: &mut Option<JoinHandle<Result<TransportLink>>>,
) -> std::result::Result<Result<TransportLink>, tokio::task::JoinError> {
    match pending {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn next_event(link: &mut Option<TransportLink>) -> Option<LinkEvent> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
