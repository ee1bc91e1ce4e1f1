use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use crate::keys::EphemeralKeyPair;
use crate::session::resolver::ResolvedInstance;
use crate::session::SessionDescriptor;
use crate::{Result, TunnelError};

/// A bidirectional byte stream carried by the channel. Each forwarded local
/// connection gets its own stream.
pub trait ChannelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ChannelStream for T {}

/// The underlying secure transport to the instance's management agent
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open one logical byte stream to the configured forwarding target
    async fn open_stream(&self) -> Result<Box<dyn ChannelStream>>;

    /// Attach the invoking terminal to a remote shell; returns its exit code
    async fn attach_shell(&mut self) -> Result<i32>;

    /// Release underlying transport resources
    async fn close(&mut self) -> Result<()>;
}

/// Negotiates a channel to a resolved instance, authenticated by the
/// session's ephemeral key
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    async fn open(
        &self,
        instance: &ResolvedInstance,
        descriptor: &SessionDescriptor,
        key: &EphemeralKeyPair,
    ) -> Result<Channel>;
}

/// The secure session-management connection for one session.
///
/// Owns its transport; never reused across sessions. `close` is idempotent
/// and a closed channel refuses new streams.
pub struct Channel {
    transport: Box<dyn ChannelTransport>,
    closed: bool,
}

impl Channel {
    pub fn new(transport: Box<dyn ChannelTransport>) -> Self {
        Self {
            transport,
            closed: false,
        }
    }

    pub async fn open_stream(&self) -> Result<Box<dyn ChannelStream>> {
        if self.closed {
            return Err(TunnelError::ChannelClosed);
        }
        self.transport.open_stream().await
    }

    pub async fn attach_shell(&mut self) -> Result<i32> {
        if self.closed {
            return Err(TunnelError::ChannelClosed);
        }
        self.transport.attach_shell().await
    }

    /// Close the channel, releasing transport resources. Idempotent; close
    /// failures are logged so they never mask the session's outcome.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "failed to close session channel");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;

    #[async_trait]
    impl ChannelTransport for NullTransport {
        async fn open_stream(&self) -> Result<Box<dyn ChannelStream>> {
            let (local, _remote) = tokio::io::duplex(64);
            Ok(Box::new(local))
        }

        async fn attach_shell(&mut self) -> Result<i32> {
            Ok(0)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut channel = Channel::new(Box::new(NullTransport));
        channel.close().await;
        channel.close().await;
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_closed_channel_refuses_streams() {
        let mut channel = Channel::new(Box::new(NullTransport));
        assert!(channel.open_stream().await.is_ok());

        channel.close().await;
        assert!(matches!(
            channel.open_stream().await,
            Err(TunnelError::ChannelClosed)
        ));
        assert!(matches!(
            channel.attach_shell().await,
            Err(TunnelError::ChannelClosed)
        ));
    }
}
