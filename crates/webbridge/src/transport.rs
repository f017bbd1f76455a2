//! The narrow contract to the host channel.
//!
//! Outbound is a single "deliver string to host" call, fire-and-forget from
//! the proxy layer's point of view; the host replies asynchronously through
//! the inbound channel that [`crate::Bridge::process_inbound`] drains one
//! message at a time in delivery order.

use tokio::sync::mpsc;

use webbridge_common::TransportError;

/// Delivers one logical message string to the host.
pub trait Transport: Send + Sync {
    fn deliver_to_host(&self, message: String) -> Result<(), TransportError>;
}

/// In-process transport over an unbounded tokio channel.
///
/// The receiving half goes to the embedding host loop; whatever the host
/// sends back is fed to the bridge's inbound pump.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    /// Create a transport plus the host-side receiver for outbound messages.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn deliver_to_host(&self, message: String) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_messages_in_order() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.deliver_to_host("one".into()).unwrap();
        transport.deliver_to_host("two".into()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[test]
    fn closed_channel_reports_transport_error() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        let err = transport.deliver_to_host("lost".into()).unwrap_err();
        assert!(matches!(err, TransportError::ChannelClosed));
    }
}
