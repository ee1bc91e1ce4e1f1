pub mod channel;
pub mod interactive;
pub mod orchestrator;
pub mod proxy;
pub mod resolver;
pub mod selector;
pub mod ssm;

use crate::{Result, TunnelError};

/// What kind of session to run over the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Forward a local TCP port through the jump instance to a remote endpoint
    Forward,
    /// Attach the local terminal to an interactive shell on the jump instance
    Interactive,
}

/// Validated parameters for one session, supplied by the CLI
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub mode: SessionMode,
    /// Endpoint to forward to, as seen from the jump instance's network
    /// position. "localhost" tunnels to the jump instance itself.
    pub remote_host: String,
    pub remote_port: u16,
    /// Local listener port. 0 asks the OS for a free port.
    pub local_port: u16,
}

impl SessionDescriptor {
    /// Build a forwarding descriptor. The local port mirrors the remote port
    /// when not given; 0 requests an OS-assigned port.
    pub fn forward(
        remote_host: Option<String>,
        remote_port: u16,
        local_port: Option<u16>,
    ) -> Result<Self> {
        let remote_host = remote_host.unwrap_or_else(|| "localhost".to_string());
        if remote_host.trim().is_empty() {
            return Err(TunnelError::InvalidDescriptor(
                "remote host cannot be empty".to_string(),
            ));
        }
        if remote_port == 0 {
            return Err(TunnelError::InvalidDescriptor(
                "remote port cannot be 0".to_string(),
            ));
        }

        Ok(Self {
            mode: SessionMode::Forward,
            remote_host: remote_host.trim().to_string(),
            remote_port,
            local_port: local_port.unwrap_or(remote_port),
        })
    }

    /// Build an interactive shell descriptor (SSH straight to the instance)
    pub fn interactive() -> Self {
        Self {
            mode: SessionMode::Interactive,
            remote_host: "localhost".to_string(),
            remote_port: 22,
            local_port: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_defaults() {
        let d = SessionDescriptor::forward(None, 22, None).unwrap();
        assert_eq!(d.mode, SessionMode::Forward);
        assert_eq!(d.remote_host, "localhost");
        assert_eq!(d.remote_port, 22);
        assert_eq!(d.local_port, 22);
    }

    #[test]
    fn test_forward_local_port_mirrors_remote() {
        let d = SessionDescriptor::forward(Some("mydb.internal".to_string()), 5432, None).unwrap();
        assert_eq!(d.local_port, 5432);
    }

    #[test]
    fn test_forward_explicit_local_port() {
        let d = SessionDescriptor::forward(None, 5432, Some(15432)).unwrap();
        assert_eq!(d.local_port, 15432);
    }

    #[test]
    fn test_forward_zero_local_port_allowed() {
        // 0 means "pick a free port for me"
        let d = SessionDescriptor::forward(None, 22, Some(0)).unwrap();
        assert_eq!(d.local_port, 0);
    }

    #[test]
    fn test_forward_rejects_empty_host() {
        assert!(SessionDescriptor::forward(Some("  ".to_string()), 22, None).is_err());
    }

    #[test]
    fn test_forward_rejects_zero_remote_port() {
        assert!(SessionDescriptor::forward(None, 0, None).is_err());
    }

    #[test]
    fn test_interactive() {
        let d = SessionDescriptor::interactive();
        assert_eq!(d.mode, SessionMode::Interactive);
        assert_eq!(d.remote_port, 22);
    }
}
