use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::channel::{Channel, ChannelStream};
use crate::{Result, TunnelError};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Local TCP listener relaying accepted connections through the session
/// channel.
///
/// Multiple concurrent local connections are supported; each one negotiates
/// its own logical sub-session over the channel, so a broken relay only
/// takes down its own connection. A failure to open a sub-stream is treated
/// as a shared-channel failure and ends the whole session.
pub struct ForwardProxy {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ForwardProxy {
    /// Bind the loopback listener. Port 0 asks the OS for a free port;
    /// `local_addr` reports what was actually bound.
    pub async fn bind(local_port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", local_port))
            .await
            .map_err(|e| TunnelError::ListenerBindFailed {
                port: local_port,
                reason: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TunnelError::ListenerBindFailed {
                port: local_port,
                reason: e.to_string(),
            })?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and relay until cancelled or the shared channel fails.
    /// Cancellation stops the accept loop, closes the listener, and tears
    /// down in-flight relays within a bounded grace window.
    pub async fn serve(self, channel: &Channel, cancel: &CancellationToken) -> Result<()> {
        let mut relays: JoinSet<()> = JoinSet::new();
        let relay_cancel = cancel.child_token();

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Err(TunnelError::Cancelled),

                accepted = self.listener.accept() => {
                    let (local, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => break Err(TunnelError::transport(e)),
                    };

                    // One logical sub-session per local connection; failing
                    // to get one means the shared channel is gone.
                    let stream = match channel.open_stream().await {
                        Ok(stream) => stream,
                        Err(e) => break Err(e),
                    };

                    debug!(%peer, "accepted local connection");
                    let token = relay_cancel.clone();
                    relays.spawn(relay(local, stream, token, peer));
                }

                Some(_) = relays.join_next(), if !relays.is_empty() => {}
            }
        };

        // Stop accepting before tearing down relays
        drop(self.listener);
        relay_cancel.cancel();

        if tokio::time::timeout(SHUTDOWN_GRACE, async {
            while relays.join_next().await.is_some() {}
        })
        .await
        .is_err()
        {
            warn!("relay tasks did not stop within grace period, aborting");
            relays.abort_all();
        }

        outcome
    }
}

/// Copy bytes in both directions until either peer closes, the relay is
/// cancelled, or one direction breaks (which ends both for this connection
/// only).
async fn relay(
    mut local: tokio::net::TcpStream,
    mut stream: Box<dyn ChannelStream>,
    cancel: CancellationToken,
    peer: SocketAddr,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%peer, "relay cancelled");
        }
        result = tokio::io::copy_bidirectional(&mut local, &mut stream) => {
            match result {
                Ok((sent, received)) => {
                    debug!(%peer, sent, received, "relay finished");
                }
                Err(e) => {
                    // Scoped to this connection; the listener keeps serving
                    debug!(%peer, error = %e, "relay failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_reports_os_assigned_port() {
        let proxy = ForwardProxy::bind(0).await.unwrap();
        assert_ne!(proxy.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_in_use_fails() {
        let first = ForwardProxy::bind(0).await.unwrap();
        let port = first.local_addr().port();
        let err = ForwardProxy::bind(port).await.unwrap_err();
        assert!(matches!(err, TunnelError::ListenerBindFailed { .. }));
    }
}
