//! Live Position Channel - one push connection, republished as ordered events.
//!
//! ```text
//! PositionTransport           pump task                 subscribers
//!   |-- Text({x,y}) ----------->|-- decode -- Position ---->| (in arrival order)
//!   |-- Text(garbage) --------->|-- drop + warn             |
//!   |-- Error / end ----------->|-- Disconnected ---------->|
//! ```
//!
//! The channel never reconnects on its own. It can hold a reopen timer on
//! behalf of its owner, which `close` cancels.

use futures_util::StreamExt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wayfinder_env::wire::decode_position;
use wayfinder_env::{DeviceId, FrameStream, Point, PositionTransport, TransportFrame, WayfinderError};

/// Identifies one opened connection. Never reused within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Events delivered to subscribers, in transport order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A decoded live position from connection `handle`.
    Position { handle: ChannelHandle, position: Point },

    /// Connection `handle` failed or was closed by the remote side.
    Disconnected { handle: ChannelHandle, reason: String },

    /// A reopen timer scheduled through [`LivePositionChannel::schedule_reopen`] fired.
    ReopenDue { device: DeviceId, attempt: u32 },
}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>>;

fn publish(subscribers: &Subscribers, event: ChannelEvent) {
    let mut subs = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
    subs.retain(|tx| tx.send(event.clone()).is_ok());
}

struct Connection {
    handle: ChannelHandle,
    device: DeviceId,
    pump: JoinHandle<()>,
}

/// At most one live connection, keyed by device.
pub struct LivePositionChannel<T: PositionTransport> {
    transport: Arc<T>,
    subscribers: Subscribers,
    active: Option<Connection>,
    reopen_timer: Option<JoinHandle<()>>,
    next_handle: u64,
}

impl<T: PositionTransport> LivePositionChannel<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            active: None,
            reopen_timer: None,
            next_handle: 1,
        }
    }

    /// Registers a new subscriber. Events published before this call are
    /// not replayed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Handle of the current connection, if one is held.
    pub fn current(&self) -> Option<ChannelHandle> {
        self.active.as_ref().map(|c| c.handle)
    }

    /// Device of the current connection.
    pub fn device(&self) -> Option<&DeviceId> {
        self.active.as_ref().map(|c| &c.device)
    }

    /// True while a connection is held and its stream has not ended.
    pub fn is_streaming(&self) -> bool {
        self.active.as_ref().is_some_and(|c| !c.pump.is_finished())
    }

    /// True while a reopen timer is pending.
    pub fn reopen_pending(&self) -> bool {
        self.reopen_timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Opens a connection for `device`, closing any previous one first.
    ///
    /// # Returns
    /// * `Ok(handle)` - Positions from this connection carry `handle`
    /// * `Err(WayfinderError::Connection)` - Empty id or transport refused
    pub async fn open(&mut self, device: &DeviceId) -> Result<ChannelHandle, WayfinderError> {
        if device.as_str().trim().is_empty() {
            return Err(WayfinderError::connection("device id must not be empty"));
        }

        self.cancel_reopen();
        if let Some(previous) = self.current() {
            self.close(previous).await;
        }

        let frames = self.transport.connect(device).await?;

        let handle = ChannelHandle(self.next_handle);
        self.next_handle += 1;

        let pump = tokio::spawn(pump(handle, frames, Arc::clone(&self.subscribers)));
        self.active = Some(Connection {
            handle,
            device: device.clone(),
            pump,
        });

        info!(device = %device, handle = handle.id(), "Live position channel opened");
        Ok(handle)
    }

    /// Closes connection `handle` and cancels any pending reopen.
    ///
    /// Closing a stale or unknown handle is a no-op. When this returns the
    /// transport stream has been dropped.
    pub async fn close(&mut self, handle: ChannelHandle) {
        match self.active.take() {
            Some(conn) if conn.handle == handle => {
                self.cancel_reopen();
                conn.pump.abort();
                let _ = conn.pump.await;
                info!(device = %conn.device, handle = handle.id(), "Live position channel closed");
            }
            other => {
                self.active = other;
                debug!(handle = handle.id(), "Ignoring close of inactive handle");
            }
        }
    }

    /// Closes whatever connection is held and cancels any pending reopen.
    pub async fn shutdown(&mut self) {
        self.cancel_reopen();
        if let Some(handle) = self.current() {
            self.close(handle).await;
        }
    }

    /// Publishes [`ChannelEvent::ReopenDue`] after `delay`.
    ///
    /// Replaces any pending timer. Cancelled by `open`, `close` and `shutdown`.
    pub fn schedule_reopen(&mut self, device: DeviceId, attempt: u32, delay: Duration) {
        self.cancel_reopen();
        let subscribers = Arc::clone(&self.subscribers);
        debug!(device = %device, attempt, ?delay, "Reopen scheduled");
        self.reopen_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            publish(&subscribers, ChannelEvent::ReopenDue { device, attempt });
        }));
    }

    pub fn cancel_reopen(&mut self) {
        if let Some(timer) = self.reopen_timer.take() {
            timer.abort();
        }
    }
}

impl<T: PositionTransport> Drop for LivePositionChannel<T> {
    fn drop(&mut self) {
        self.cancel_reopen();
        if let Some(conn) = self.active.take() {
            conn.pump.abort();
        }
    }
}

async fn pump(handle: ChannelHandle, mut frames: FrameStream, subscribers: Subscribers) {
    while let Some(frame) = frames.next().await {
        match frame {
            TransportFrame::Text(payload) => match decode_position(&payload) {
                Ok(position) => publish(&subscribers, ChannelEvent::Position { handle, position }),
                Err(e) => warn!(handle = handle.id(), "Dropping stream message: {}", e),
            },
            TransportFrame::Error(reason) => {
                warn!(handle = handle.id(), %reason, "Live position transport failed");
                publish(&subscribers, ChannelEvent::Disconnected { handle, reason });
                return;
            }
        }
    }

    warn!(handle = handle.id(), "Live position stream closed by remote");
    publish(
        &subscribers,
        ChannelEvent::Disconnected {
            handle,
            reason: "stream closed by remote".to_string(),
        },
    );
}
