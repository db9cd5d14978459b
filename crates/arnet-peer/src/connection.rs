use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use arnet_catalog::MessageCatalog;
use arnet_frame::hexdump;
use arnet_transport::DatagramTransport;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, Result};
use crate::session::{Command, CommandResult, ResolvedMessage, Responder, Session, SessionEvent};

/// Why a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// [`ConnectionHandle::close`] was called.
    Requested,
    /// Nothing was received within the keepalive window.
    KeepaliveTimeout,
    /// The transport reported end of stream.
    TransportClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("closed by request"),
            Self::KeepaliveTimeout => f.write_str("keepalive timeout"),
            Self::TransportClosed => f.write_str("transport closed"),
        }
    }
}

/// Lifecycle of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initializing,
    Active,
    Closed(CloseReason),
}

impl ConnectionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            Self::Closed(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Notifications from a connection, in arrival order.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A resolved inbound message (terminators of correlated commands excepted).
    Message(ResolvedMessage),
    /// The device pinged; the pong has been sent.
    Ping { seq: u8, payload: Bytes },
    /// A socket error. The connection stays open.
    Error(ConnectionError),
    /// The connection closed. Always the last event.
    Closed(CloseReason),
}

impl From<SessionEvent> for ConnectionEvent {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Message(message) => Self::Message(message),
            SessionEvent::Ping { seq, payload } => Self::Ping { seq, payload },
        }
    }
}

struct Submission {
    command: Command,
    responder: Responder,
}

/// Cloneable handle for sending commands to, and closing, a connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    remote: Arc<str>,
    catalog: Arc<dyn MessageCatalog>,
    commands: mpsc::UnboundedSender<Submission>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Description of the remote end.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn catalog(&self) -> &Arc<dyn MessageCatalog> {
        &self.catalog
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Queue a command without waiting for its outcome.
    ///
    /// Resolution and argument encoding happen here, so an unknown path or
    /// bad arguments fail this call only. The returned future resolves with
    /// the events received before the command's terminator, or with
    /// [`ConnectionError::ConnectionClosed`] if the connection goes away
    /// first.
    pub fn submit(&self, path: &str, params: &Value) -> Result<CommandResponse> {
        let command = Command::prepare(self.catalog.as_ref(), path, params)?;
        let (responder, rx) = oneshot::channel();
        self.commands
            .send(Submission { command, responder })
            .map_err(|_| ConnectionError::ConnectionClosed)?;
        Ok(CommandResponse { rx })
    }

    /// Send a command and wait for its response batch.
    pub async fn send_command(&self, path: &str, params: Value) -> Result<Vec<ResolvedMessage>> {
        self.submit(path, &params)?.await
    }

    /// Ask the connection to close. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait until the connection has closed.
    pub async fn closed(&self) -> CloseReason {
        let mut state = self.state.clone();
        let reason = state
            .wait_for(ConnectionState::is_closed)
            .await
            .ok()
            .and_then(|current| current.close_reason());
        reason
            .or_else(|| state.borrow().close_reason())
            .unwrap_or(CloseReason::TransportClosed)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}

/// Outcome of a submitted command.
#[derive(Debug)]
#[must_use = "dropping the response does not cancel the command"]
pub struct CommandResponse {
    rx: oneshot::Receiver<CommandResult>,
}

impl Future for CommandResponse {
    type Output = CommandResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ConnectionError::ConnectionClosed)))
    }
}

/// Stream of [`ConnectionEvent`]s. Ends after [`ConnectionEvent::Closed`].
///
/// Unbounded: the driver never waits on the consumer, and undrained events
/// accumulate in memory.
#[derive(Debug)]
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionEvents {
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }
}

impl futures_core::Stream for ConnectionEvents {
    type Item = ConnectionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start a connection over an established transport.
///
/// Spawns the driver task that owns the transport and all protocol state.
/// Must be called within a tokio runtime.
pub fn spawn_connection<T: DatagramTransport>(
    transport: T,
    catalog: Arc<dyn MessageCatalog>,
    config: ConnectionConfig,
) -> (ConnectionHandle, ConnectionEvents) {
    let remote: Arc<str> = transport.remote().into();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Initializing);
    let cancel = CancellationToken::new();

    let driver = Driver {
        remote: Arc::clone(&remote),
        transport,
        session: Session::new(Arc::clone(&catalog)),
        commands: commands_rx,
        events: events_tx,
        state: state_tx,
        cancel: cancel.clone(),
        keepalive: config.keepalive,
    };
    tokio::spawn(driver.run());

    let handle = ConnectionHandle {
        remote,
        catalog,
        commands: commands_tx,
        state: state_rx,
        cancel,
    };
    (handle, ConnectionEvents { rx: events_rx })
}

struct Driver<T> {
    remote: Arc<str>,
    transport: T,
    session: Session,
    commands: mpsc::UnboundedReceiver<Submission>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    keepalive: Duration,
}

impl<T: DatagramTransport> Driver<T> {
    async fn run(mut self) {
        self.state.send_replace(ConnectionState::Active);
        info!(remote = %self.remote, "connection active");

        let idle = sleep(self.keepalive);
        tokio::pin!(idle);
        let mut accepting = true;

        let reason = loop {
            self.flush().await;

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break CloseReason::Requested,

                _ = &mut idle => {
                    info!(remote = %self.remote, keepalive = ?self.keepalive, "keepalive timeout");
                    break CloseReason::KeepaliveTimeout;
                }

                submission = self.commands.recv(), if accepting => match submission {
                    Some(Submission { command, responder }) => {
                        self.session.send_command(command, responder);
                    }
                    None => {
                        debug!(remote = %self.remote, "all handles dropped");
                        accepting = false;
                    }
                },

                received = self.transport.recv() => match received {
                    Ok(Some(datagram)) => {
                        idle.as_mut().reset(Instant::now() + self.keepalive);
                        self.session.handle_datagram(datagram);
                    }
                    Ok(None) => break CloseReason::TransportClosed,
                    Err(err) => {
                        warn!(remote = %self.remote, error = %err, "receive failed");
                        self.emit(ConnectionEvent::Error(err.into()));
                    }
                },
            }
        };

        self.session.close();
        let stats = self.session.stats();
        drop(self.transport);
        self.state.send_replace(ConnectionState::Closed(reason));
        let _ = self.events.send(ConnectionEvent::Closed(reason));
        info!(
            remote = %self.remote,
            %reason,
            received = stats.frames_received,
            dropped = stats.frames_dropped,
            "connection closed"
        );
    }

    /// Put queued datagrams on the wire, then release completions and events.
    async fn flush(&mut self) {
        while let Some(datagram) = self.session.poll_transmit() {
            trace!(len = datagram.len(), hex = %hexdump(&datagram), "datagram sent");
            if let Err(err) = self.transport.send(datagram).await {
                warn!(remote = %self.remote, error = %err, "send failed");
                self.emit(ConnectionEvent::Error(err.into()));
            }
        }
        self.session.complete_ready();
        while let Some(event) = self.session.poll_event() {
            self.emit(event.into());
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // Nobody listening is not an error.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use arnet_frame::{FrameType, EVENT_ACK, PING, PONG};
    use arnet_transport::MemoryTransport;
    use bytes::BytesMut;
    use serde_json::json;

    use super::*;
    use crate::testing::{self, COUNT, COUNTED, READING, REFRESH, REFRESHED};

    fn connect(keepalive: Duration) -> (ConnectionHandle, ConnectionEvents, MemoryTransport) {
        let (controller, device) = MemoryTransport::pair();
        let (handle, events) = spawn_connection(
            controller,
            testing::catalog(),
            ConnectionConfig { keepalive },
        );
        (handle, events, device)
    }

    async fn next_datagram(device: &mut MemoryTransport) -> Bytes {
        device
            .recv()
            .await
            .expect("recv should succeed")
            .expect("controller should send")
    }

    #[tokio::test]
    async fn end_to_end_command_resolution() {
        let (handle, mut events, mut device) = connect(Duration::from_secs(5));

        let response = handle
            .submit("lab.commands.count", &json!({"n": 2}))
            .expect("submit should succeed");
        let sent = next_datagram(&mut device).await;
        assert_eq!(testing::message_key(&sent), COUNT);

        device
            .send(testing::event_with_ack(0, READING, &10i16.to_le_bytes()))
            .await
            .unwrap();
        device
            .send(testing::event_with_ack(1, READING, &20i16.to_le_bytes()))
            .await
            .unwrap();
        device
            .send(testing::event_with_ack(2, COUNTED, &[2]))
            .await
            .unwrap();

        let batch = response.await.expect("command should resolve");
        let values: Vec<_> = batch.iter().map(|m| m.params["value"].clone()).collect();
        assert_eq!(values, vec![json!(10), json!(20)]);

        for _ in 0..2 {
            match events.recv().await {
                Some(ConnectionEvent::Message(m)) => assert_eq!(m.key(), READING),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert!(events.try_recv().is_none());

        // Three acks, one per acknowledged event.
        for seq in 0..3 {
            let ack = testing::frame(&next_datagram(&mut device).await);
            assert_eq!(ack.channel, EVENT_ACK);
            assert_eq!(ack.payload.as_ref(), &[seq]);
        }
    }

    #[tokio::test]
    async fn second_command_waits_for_first() {
        let (handle, _events, mut device) = connect(Duration::from_secs(5));

        let first = handle.submit("lab.commands.refresh", &Value::Null).unwrap();
        let second = handle.submit("lab.commands.count", &json!([1])).unwrap();

        assert_eq!(testing::message_key(&next_datagram(&mut device).await), REFRESH);
        tokio::task::yield_now().await;
        assert!(device.try_recv().is_none());

        device
            .send(testing::event_with_ack(0, REFRESHED, &[]))
            .await
            .unwrap();
        assert!(first.await.unwrap().is_empty());

        let ack = testing::frame(&next_datagram(&mut device).await);
        assert_eq!(ack.frame_type, FrameType::Ack);
        assert_eq!(testing::message_key(&next_datagram(&mut device).await), COUNT);

        device.send(testing::event_with_ack(1, COUNTED, &[1])).await.unwrap();
        assert!(second.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_path_fails_submit() {
        let (handle, _events, _device) = connect(Duration::from_secs(5));
        let err = handle
            .send_command("lab.commands.missing", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::DescriptorNotFound(_)));
    }

    #[tokio::test]
    async fn close_rejects_pending_and_emits_one_closed() {
        let (handle, mut events, mut device) = connect(Duration::from_secs(5));
        let response = handle.submit("lab.commands.refresh", &Value::Null).unwrap();
        next_datagram(&mut device).await;

        handle.close();
        assert!(matches!(
            response.await,
            Err(ConnectionError::ConnectionClosed)
        ));
        assert_eq!(handle.closed().await, CloseReason::Requested);
        assert_eq!(handle.state(), ConnectionState::Closed(CloseReason::Requested));

        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Closed(CloseReason::Requested))
        ));
        assert!(events.recv().await.is_none());

        let err = handle.submit("lab.commands.poke", &Value::Null).unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_timeout_closes_once() {
        let (handle, mut events, _device) = connect(Duration::from_millis(5000));

        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Closed(CloseReason::KeepaliveTimeout))
        ));
        assert!(events.recv().await.is_none());
        assert_eq!(handle.closed().await, CloseReason::KeepaliveTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_resets_keepalive() {
        let (handle, _events, device) = connect(Duration::from_millis(5000));

        for seq in 0..3 {
            tokio::time::sleep(Duration::from_millis(4000)).await;
            device
                .send_now(testing::event_no_ack(seq, READING, &0i16.to_le_bytes()))
                .unwrap();
        }
        tokio::task::yield_now().await;
        assert_eq!(handle.state(), ConnectionState::Active);

        let started = Instant::now();
        assert_eq!(handle.closed().await, CloseReason::KeepaliveTimeout);
        assert!(started.elapsed() >= Duration::from_millis(4900));
    }

    #[tokio::test]
    async fn transport_close_is_reported() {
        let (handle, mut events, device) = connect(Duration::from_secs(5));
        drop(device);

        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Closed(CloseReason::TransportClosed))
        ));
        assert_eq!(handle.closed().await, CloseReason::TransportClosed);
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let (_handle, mut events, mut device) = connect(Duration::from_secs(5));

        let mut ping = BytesMut::new();
        arnet_frame::encode_frame(FrameType::Data, PING, 9, b"ts", &mut ping).unwrap();
        device.send(ping.freeze()).await.unwrap();

        let pong = testing::frame(&next_datagram(&mut device).await);
        assert_eq!(pong.channel, PONG);
        assert_eq!(pong.seq, 9);
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Ping { seq: 9, .. })
        ));
    }
}
