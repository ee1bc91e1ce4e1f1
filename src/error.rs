use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunnelError {
    // Selector / descriptor errors
    #[error("Invalid tag selector '{0}': expected KEY=VALUE")]
    InvalidSelector(String),

    #[error("Invalid session parameters: {0}")]
    InvalidDescriptor(String),

    // Resolution errors
    #[error("No running instances found with tag {0}")]
    InstanceNotFound(String),

    // Key errors
    #[error("SSH key error: {0}")]
    Key(String),

    #[error("Key authorization rejected for instance {instance_id}: {reason}")]
    AuthorizationFailed { instance_id: String, reason: String },

    // Channel errors
    #[error("Session channel unavailable for instance {0}: agent unreachable after retries")]
    ChannelUnavailable(String),

    #[error("Session channel is closed")]
    ChannelClosed,

    // Proxy errors
    #[error("Cannot bind local port {port}: {reason}. Is it in use?")]
    ListenerBindFailed { port: u16, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    // AWS errors
    #[error("AWS credentials not found or invalid")]
    AwsCredentials,

    #[error("AWS EC2 error: {0}")]
    Ec2(String),

    #[error("AWS SSM error: {0}")]
    Ssm(String),

    // External tooling
    #[error("SSH command failed: {0}")]
    SshCommand(String),

    #[error("Session Manager plugin not found. Install from: https://docs.aws.amazon.com/systems-manager/latest/userguide/session-manager-working-with-install-plugin.html")]
    SessionManagerPluginNotFound,

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prerequisites not met: {0}")]
    Prerequisites(String),

    // File/IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // User cancelled (reported clean, not as a failure)
    #[error("Operation cancelled by user")]
    Cancelled,
}

impl TunnelError {
    pub fn ec2(err: impl std::fmt::Display) -> Self {
        TunnelError::Ec2(err.to_string())
    }

    pub fn ssm(err: impl std::fmt::Display) -> Self {
        TunnelError::Ssm(err.to_string())
    }

    pub fn key(err: impl std::fmt::Display) -> Self {
        TunnelError::Key(err.to_string())
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        TunnelError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
