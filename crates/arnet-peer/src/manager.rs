//! Supervision of device connections with automatic reconnection.
//!
//! Each attached connector gets its own supervisor task. Supervisors share
//! nothing but the manager's event channel.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::connection::{CloseReason, ConnectionHandle};
use crate::connector::Connector;
use crate::device::Device;
use crate::error::{ConnectionError, Result};

/// How an attached device is supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOptions {
    /// Start connecting as soon as the device is attached.
    pub autoconnect: bool,
    /// Reconnect after a disconnect or a failed attempt.
    pub reconnect: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            autoconnect: true,
            reconnect: true,
        }
    }
}

/// Lifecycle notifications, per device uid.
#[derive(Debug)]
pub enum ManagerEvent {
    Attached { uid: String },
    Connecting { uid: String },
    /// A connection is up; the [`Device`] carries its event stream.
    Connected { uid: String, device: Device },
    Disconnected { uid: String },
    Detached { uid: String },
    /// A connection attempt failed.
    Error { uid: String, error: ConnectionError },
}

impl ManagerEvent {
    pub fn uid(&self) -> &str {
        match self {
            Self::Attached { uid }
            | Self::Connecting { uid }
            | Self::Connected { uid, .. }
            | Self::Disconnected { uid }
            | Self::Detached { uid }
            | Self::Error { uid, .. } => uid,
        }
    }
}

/// Stream of [`ManagerEvent`]s.
#[derive(Debug)]
pub struct ManagerEvents {
    rx: mpsc::UnboundedReceiver<ManagerEvent>,
}

impl ManagerEvents {
    pub async fn recv(&mut self) -> Option<ManagerEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ManagerEvent> {
        self.rx.try_recv().ok()
    }
}

impl futures_core::Stream for ManagerEvents {
    type Item = ManagerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Connect,
    Disconnect,
}

struct Entry {
    control: mpsc::UnboundedSender<Control>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps a set of devices connected.
pub struct DeviceManager<C: Connector> {
    config: ManagerConfig,
    entries: HashMap<String, Entry>,
    events: mpsc::UnboundedSender<ManagerEvent>,
    _connector: std::marker::PhantomData<fn(C)>,
}

impl<C: Connector> DeviceManager<C> {
    pub fn new(config: ManagerConfig) -> (Self, ManagerEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            config,
            entries: HashMap::new(),
            events: tx,
            _connector: std::marker::PhantomData,
        };
        (manager, ManagerEvents { rx })
    }

    /// Uids of the attached devices.
    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_attached(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    /// Start supervising the device behind `connector`.
    pub fn attach(&mut self, connector: C, options: AttachOptions) -> Result<()> {
        let uid = connector.uid().to_string();
        if self.entries.contains_key(&uid) {
            return Err(ConnectionError::AlreadyAttached(uid));
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let _ = self.events.send(ManagerEvent::Attached { uid: uid.clone() });
        info!(uid = %uid, ?options, "device attached");

        let supervisor = Supervisor {
            uid: uid.clone(),
            connector: Arc::new(connector),
            options,
            config: self.config.clone(),
            control: control_rx,
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run());
        self.entries.insert(
            uid,
            Entry {
                control: control_tx,
                cancel,
                task,
            },
        );
        Ok(())
    }

    /// Start connecting a device attached without `autoconnect`, or after
    /// [`DeviceManager::disconnect`]. No-op while connected.
    pub fn connect(&self, uid: &str) -> Result<()> {
        self.control(uid, Control::Connect)
    }

    /// Close the live connection and stop reconnecting until
    /// [`DeviceManager::connect`].
    pub fn disconnect(&self, uid: &str) -> Result<()> {
        self.control(uid, Control::Disconnect)
    }

    /// Disconnect and stop supervising. Returns once the supervisor has
    /// emitted [`ManagerEvent::Detached`].
    pub async fn detach(&mut self, uid: &str) -> Result<()> {
        let entry = self
            .entries
            .remove(uid)
            .ok_or_else(|| ConnectionError::UnknownDevice(uid.to_string()))?;
        entry.cancel.cancel();
        if let Err(err) = entry.task.await {
            warn!(uid, error = %err, "supervisor task failed");
        }
        Ok(())
    }

    /// Detach every device.
    pub async fn shutdown(&mut self) {
        let uids: Vec<String> = self.entries.keys().cloned().collect();
        for uid in uids {
            let _ = self.detach(&uid).await;
        }
    }

    fn control(&self, uid: &str, control: Control) -> Result<()> {
        let entry = self
            .entries
            .get(uid)
            .ok_or_else(|| ConnectionError::UnknownDevice(uid.to_string()))?;
        entry
            .control
            .send(control)
            .map_err(|_| ConnectionError::UnknownDevice(uid.to_string()))
    }
}

impl<C: Connector> Drop for DeviceManager<C> {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            entry.cancel.cancel();
        }
    }
}

impl<C: Connector> std::fmt::Debug for DeviceManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("config", &self.config)
            .field("devices", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Why a live connection stopped being supervised.
enum Ended {
    Closed(CloseReason),
    Disconnect,
    Detach,
}

/// Outcome of waiting between attempts.
enum Wait {
    Elapsed,
    Connect,
    Disconnect,
    Detach,
}

struct Supervisor<C> {
    uid: String,
    connector: Arc<C>,
    options: AttachOptions,
    config: ManagerConfig,
    control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<ManagerEvent>,
    cancel: CancellationToken,
}

impl<C: Connector> Supervisor<C> {
    async fn run(mut self) {
        let mut wanted = self.options.autoconnect;
        loop {
            if !wanted {
                match self.wait(None).await {
                    Wait::Connect => wanted = true,
                    Wait::Detach => break,
                    Wait::Elapsed | Wait::Disconnect => {}
                }
                continue;
            }

            self.emit(ManagerEvent::Connecting {
                uid: self.uid.clone(),
            });
            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                attempt = self.connector.connect() => attempt,
            };

            let delay = match attempt {
                Ok((handle, events)) => {
                    let device = Device::new(self.uid.clone(), handle.clone(), events);
                    self.emit(ManagerEvent::Connected {
                        uid: self.uid.clone(),
                        device,
                    });
                    match self.watch(&handle).await {
                        Ended::Closed(reason) => {
                            info!(uid = %self.uid, %reason, "device disconnected");
                            self.emit_disconnected();
                        }
                        Ended::Disconnect => {
                            self.close(&handle).await;
                            wanted = false;
                            continue;
                        }
                        Ended::Detach => {
                            self.close(&handle).await;
                            break;
                        }
                    }
                    self.config.reconnect_delay
                }
                Err(error) => {
                    warn!(uid = %self.uid, error = %error, "connection attempt failed");
                    self.emit(ManagerEvent::Error {
                        uid: self.uid.clone(),
                        error,
                    });
                    self.config.retry_delay
                }
            };

            if !self.options.reconnect {
                wanted = false;
                continue;
            }
            debug!(uid = %self.uid, delay_ms = delay.as_millis() as u64, "reconnecting");
            match self.wait(Some(delay)).await {
                Wait::Elapsed | Wait::Connect => {}
                Wait::Disconnect => wanted = false,
                Wait::Detach => break,
            }
        }

        info!(uid = %self.uid, "device detached");
        self.emit(ManagerEvent::Detached {
            uid: self.uid.clone(),
        });
    }

    /// Follow a live connection until it closes or is told to stop.
    async fn watch(&mut self, handle: &ConnectionHandle) -> Ended {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ended::Detach,
                control = self.control.recv() => match control {
                    Some(Control::Disconnect) => return Ended::Disconnect,
                    Some(Control::Connect) => {}
                    None => return Ended::Detach,
                },
                reason = handle.closed() => return Ended::Closed(reason),
            }
        }
    }

    /// Wait for `delay` (forever if `None`) or a control message.
    async fn wait(&mut self, delay: Option<Duration>) -> Wait {
        let sleep = async {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Wait::Detach,
            control = self.control.recv() => match control {
                Some(Control::Connect) => Wait::Connect,
                Some(Control::Disconnect) => Wait::Disconnect,
                None => Wait::Detach,
            },
            () = sleep => Wait::Elapsed,
        }
    }

    async fn close(&self, handle: &ConnectionHandle) {
        handle.close();
        handle.closed().await;
        info!(uid = %self.uid, "device disconnected");
        self.emit_disconnected();
    }

    fn emit_disconnected(&self) {
        self.emit(ManagerEvent::Disconnected {
            uid: self.uid.clone(),
        });
    }

    fn emit(&self, event: ManagerEvent) {
        let _ = self.events.send(event);
    }
}
