use tokio_util::sync::CancellationToken;

use crate::session::channel::Channel;
use crate::{Result, TunnelError};

/// Attach the local terminal to a remote shell over the channel and block
/// until it exits, returning the remote shell's exit status. The external
/// ssh client owns the terminal, so resize and interrupt propagation ride
/// its own handling.
pub async fn run_interactive(channel: &mut Channel, cancel: &CancellationToken) -> Result<i32> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TunnelError::Cancelled),
        code = channel.attach_shell() => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::channel::{ChannelStream, ChannelTransport};
    use async_trait::async_trait;

    struct ShellTransport {
        exit_code: i32,
    }

    #[async_trait]
    impl ChannelTransport for ShellTransport {
        async fn open_stream(&self) -> Result<Box<dyn ChannelStream>> {
            Err(TunnelError::transport("not a forwarding channel"))
        }

        async fn attach_shell(&mut self) -> Result<i32> {
            Ok(self.exit_code)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_returns_shell_exit_code() {
        let mut channel = Channel::new(Box::new(ShellTransport { exit_code: 7 }));
        let cancel = CancellationToken::new();
        assert_eq!(run_interactive(&mut channel, &cancel).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_shell() {
        let mut channel = Channel::new(Box::new(ShellTransport { exit_code: 0 }));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            run_interactive(&mut channel, &cancel).await,
            Err(TunnelError::Cancelled)
        ));
    }
}
