//! Host-side access to a running broker.
//!
//! The hosting environment attaches one transport per execution context and
//! vouches for the origin of every frame that arrives over it. Frames, attach
//! and detach notices all reach the broker's event loop through one queue, so
//! the broker processes them in a single turn each.

use crate::core::{ClientConfig, Error, Result, TransportHandle};
use crate::transport::{ChannelTransport, Envelope, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// A frame received from a context, with the origin the host verified.
#[derive(Clone, Debug)]
pub struct InboundFrame {
    /// Transport the frame arrived on
    pub handle: TransportHandle,
    /// Origin of the sender, as verified by the host
    pub origin: String,
    /// The frame
    pub envelope: Envelope,
}

/// Input of the broker event loop.
pub enum BrokerEvent {
    /// A transport was attached; `port` carries frames to the context
    Attach {
        handle: TransportHandle,
        port: Arc<dyn Transport>,
    },
    /// A frame arrived from a context
    Frame(InboundFrame),
    /// A transport went away
    Detach { handle: TransportHandle },
    /// The host finished starting up
    StartupCompleted,
    /// Stop the event loop
    Shutdown,
}

/// Both halves of a context's connection to the broker.
pub struct ContextEndpoint {
    /// Handle assigned to the transport
    pub handle: TransportHandle,
    /// Context-to-broker half
    pub outbound: Arc<dyn Transport>,
    /// Broker-to-context half
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
}

/// Cloneable handle to a broker event loop.
#[derive(Clone)]
pub struct BrokerHandle {
    events: mpsc::UnboundedSender<BrokerEvent>,
    next_handle: Arc<AtomicU64>,
    client_config: ClientConfig,
}

impl BrokerHandle {
    pub(crate) fn new(events: mpsc::UnboundedSender<BrokerEvent>, client_config: ClientConfig) -> Self {
        Self {
            events,
            next_handle: Arc::new(AtomicU64::new(1)),
            client_config,
        }
    }

    fn send(&self, event: BrokerEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| Error::MessageDispatch("broker is not running".into()))
    }

    /// Attach a new in-process context whose frames come from `origin`.
    ///
    /// Dropping the last reference to the endpoint's outbound half detaches
    /// the transport.
    pub fn attach(&self, origin: &str) -> Result<ContextEndpoint> {
        let handle = TransportHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let (port, inbound) = ChannelTransport::pair();
        self.send(BrokerEvent::Attach {
            handle,
            port: Arc::new(port),
        })?;
        Ok(ContextEndpoint {
            handle,
            outbound: Arc::new(BrokerTransport {
                handle,
                origin: origin.to_string(),
                events: self.events.clone(),
            }),
            inbound,
        })
    }

    /// Attach a transport managed by the host, e.g. a bridge to another process.
    pub fn attach_port(&self, port: Arc<dyn Transport>) -> Result<TransportHandle> {
        let handle = TransportHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.send(BrokerEvent::Attach { handle, port })?;
        Ok(handle)
    }

    /// Hand a frame received on a host-managed transport to the broker.
    pub fn submit(&self, frame: InboundFrame) -> Result<()> {
        self.send(BrokerEvent::Frame(frame))
    }

    /// Report that a transport went away.
    pub fn detach(&self, handle: TransportHandle) -> Result<()> {
        self.send(BrokerEvent::Detach { handle })
    }

    /// Release requests held back until startup completes.
    pub fn signal_startup_completed(&self) -> Result<()> {
        self.send(BrokerEvent::StartupCompleted)
    }

    /// Stop the broker.
    pub fn shutdown(&self) -> Result<()> {
        self.send(BrokerEvent::Shutdown)
    }

    /// Client configuration matching the broker's settings.
    pub fn client_config(&self) -> ClientConfig {
        self.client_config.clone()
    }
}

/// Context-to-broker half of an in-process transport.
struct BrokerTransport {
    handle: TransportHandle,
    origin: String,
    events: mpsc::UnboundedSender<BrokerEvent>,
}

impl Transport for BrokerTransport {
    fn send(&self, envelope: Envelope) -> Result<()> {
        trace!(handle = %self.handle, message_id = %envelope.message_id, "frame to broker");
        self.events
            .send(BrokerEvent::Frame(InboundFrame {
                handle: self.handle,
                origin: self.origin.clone(),
                envelope,
            }))
            .map_err(|_| Error::MessageDispatch("broker is not running".into()))
    }
}

impl Drop for BrokerTransport {
    fn drop(&mut self) {
        // Ignored: a stopped broker has nothing left to clean up
        let _ = self.events.send(BrokerEvent::Detach { handle: self.handle });
    }
}
