//! Transport abstraction.
//!
//! The broker and clients only ever talk through [`Transport`], so the same
//! logic runs over in-process channels, a window messaging bridge or a socket.

use crate::core::{Error, Result};
use crate::transport::envelope::Envelope;
use tokio::sync::mpsc;

/// Sending half of a frame channel.
pub trait Transport: Send + Sync {
    /// Send a frame. Fails only if the other side is gone.
    fn send(&self, envelope: Envelope) -> Result<()>;
}

/// Transport backed by an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelTransport {
    /// Create a connected transport/receiver pair.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|e| Error::MessageDispatch(format!("transport closed, frame {} dropped", e.0.message_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_delivers_in_order() {
        let (transport, mut rx) = ChannelTransport::pair();
        let first = Envelope::subscribe("a", "s1");
        let second = Envelope::unsubscribe("s1");
        transport.send(first.clone()).unwrap();
        transport.send(second.clone()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (transport, rx) = ChannelTransport::pair();
        drop(rx);
        assert!(transport.is_closed());
        let err = transport.send(Envelope::disconnect()).unwrap_err();
        assert!(matches!(err, Error::MessageDispatch(_)));
    }
}
