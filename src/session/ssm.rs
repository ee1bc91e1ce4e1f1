use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_ssm::types::{InstanceInformationStringFilter, PingStatus};
use aws_sdk_ssm::Client as SsmClient;
use shell_escape::escape;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::keys::EphemeralKeyPair;
use crate::session::channel::{Channel, ChannelOpener, ChannelStream, ChannelTransport};
use crate::session::resolver::ResolvedInstance;
use crate::session::{SessionDescriptor, SessionMode};
use crate::{Result, TunnelError};

const AGENT_PROBE_ATTEMPTS: u32 = 5;
const AGENT_PROBE_INITIAL_DELAY: Duration = Duration::from_millis(500);
const AGENT_PROBE_MAX_DELAY: Duration = Duration::from_secs(4);

/// SSH ProxyCommand that routes the connection through an SSM Session
/// Manager session instead of a direct TCP connection. Profile and region
/// are spliced in shell-escaped since the inner command runs under sh.
pub fn ssm_proxy_command(profile: Option<&str>, region: Option<&str>) -> String {
    let mut cmd = String::from(
        "sh -c \"aws ssm start-session --target %h \
         --document-name AWS-StartSSHSession --parameters portNumber=%p",
    );
    if let Some(profile) = profile {
        cmd.push_str(" --profile ");
        cmd.push_str(&escape(Cow::Borrowed(profile)));
    }
    if let Some(region) = region {
        cmd.push_str(" --region ");
        cmd.push_str(&escape(Cow::Borrowed(region)));
    }
    cmd.push('"');
    cmd
}

/// Common ssh options for SSM-routed sessions: proxy through the management
/// agent, authenticate only with the ephemeral key, and skip host key
/// checking since instance IDs are never in known_hosts.
pub fn ssh_options(proxy_command: &str, key_path: &Path, connect_timeout: Duration) -> Vec<String> {
    vec![
        "-o".to_string(),
        format!("ProxyCommand={}", proxy_command),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "IdentitiesOnly=yes".to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs()),
        "-i".to_string(),
        key_path.display().to_string(),
    ]
}

/// Opens channels over SSM Session Manager, with ssh(1) as the protocol
/// engine on top
pub struct SsmChannelOpener {
    ssm: SsmClient,
    profile: Option<String>,
    region: Option<String>,
    user: String,
    negotiation_timeout: Duration,
}

impl SsmChannelOpener {
    pub fn new(ssm: SsmClient, profile: Option<String>, region: Option<String>, user: String) -> Self {
        Self {
            ssm,
            profile,
            region,
            user,
            negotiation_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Wait until the SSM agent on the instance reports Online. Only the
    /// not-yet-ready case is retried; API failures surface immediately.
    async fn wait_for_agent(&self, instance_id: &str) -> Result<()> {
        let mut delay = AGENT_PROBE_INITIAL_DELAY;

        for attempt in 1..=AGENT_PROBE_ATTEMPTS {
            let filter = InstanceInformationStringFilter::builder()
                .key("InstanceIds")
                .values(instance_id)
                .build()
                .map_err(TunnelError::ssm)?;

            let probe = self
                .ssm
                .describe_instance_information()
                .filters(filter)
                .send();

            match tokio::time::timeout(self.negotiation_timeout, probe).await {
                Ok(Ok(response)) => {
                    let online = response
                        .instance_information_list()
                        .iter()
                        .any(|info| info.ping_status() == Some(&PingStatus::Online));
                    if online {
                        return Ok(());
                    }
                    debug!(instance_id, attempt, "SSM agent not yet online");
                }
                Ok(Err(e)) => return Err(TunnelError::ssm(e)),
                Err(_) => {
                    debug!(instance_id, attempt, "SSM agent probe timed out");
                }
            }

            if attempt < AGENT_PROBE_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(AGENT_PROBE_MAX_DELAY);
            }
        }

        Err(TunnelError::ChannelUnavailable(instance_id.to_string()))
    }
}

#[async_trait]
impl ChannelOpener for SsmChannelOpener {
    async fn open(
        &self,
        instance: &ResolvedInstance,
        descriptor: &SessionDescriptor,
        key: &EphemeralKeyPair,
    ) -> Result<Channel> {
        self.wait_for_agent(&instance.id).await?;

        let forward_target = match descriptor.mode {
            SessionMode::Forward => {
                Some((descriptor.remote_host.clone(), descriptor.remote_port))
            }
            SessionMode::Interactive => None,
        };

        let transport = SshSsmTransport {
            instance_id: instance.id.clone(),
            user: self.user.clone(),
            key_path: key.private_key_path().to_path_buf(),
            proxy_command: ssm_proxy_command(self.profile.as_deref(), self.region.as_deref()),
            connect_timeout: self.negotiation_timeout,
            forward_target,
        };

        Ok(Channel::new(Box::new(transport)))
    }
}

/// Channel transport backed by spawned ssh(1) processes riding an SSM
/// ProxyCommand. Each forwarded stream is one `ssh -W` child whose stdio is
/// the byte stream; the interactive shell inherits the terminal so resize
/// and interrupt handling ride the external client.
struct SshSsmTransport {
    instance_id: String,
    user: String,
    key_path: PathBuf,
    proxy_command: String,
    connect_timeout: Duration,
    forward_target: Option<(String, u16)>,
}

impl SshSsmTransport {
    fn base_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(ssh_options(
            &self.proxy_command,
            &self.key_path,
            self.connect_timeout,
        ));
        cmd
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.instance_id)
    }
}

#[async_trait]
impl ChannelTransport for SshSsmTransport {
    async fn open_stream(&self) -> Result<Box<dyn ChannelStream>> {
        let (host, port) = self
            .forward_target
            .as_ref()
            .ok_or_else(|| TunnelError::transport("channel was not opened for forwarding"))?;

        let mut child = self
            .base_command()
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-W")
            .arg(format!("{}:{}", host, port))
            .arg(self.destination())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TunnelError::SshCommand(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TunnelError::transport("ssh child has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TunnelError::transport("ssh child has no stdout"))?;

        Ok(Box::new(SshChildStream {
            _child: child,
            stdin,
            stdout,
        }))
    }

    async fn attach_shell(&mut self) -> Result<i32> {
        let status = self
            .base_command()
            .arg(self.destination())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| TunnelError::SshCommand(e.to_string()))?;

        match status.code() {
            // 255 is ssh's own connection/authentication failure, not the
            // remote shell's status
            Some(255) => Err(TunnelError::transport("ssh connection failed (exit 255)")),
            Some(code) => Ok(code),
            None => Err(TunnelError::transport("ssh terminated by signal")),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Per-stream children are killed when their stream drops; the shell
        // child is reaped by attach_shell. Nothing persistent remains.
        Ok(())
    }
}

/// The stdio of one `ssh -W` child, exposed as a bidirectional byte stream.
/// Dropping it kills the child.
struct SshChildStream {
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl AsyncRead for SshChildStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for SshChildStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stdin).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_command_without_overrides() {
        let cmd = ssm_proxy_command(None, None);
        assert!(cmd.contains("aws ssm start-session --target %h"));
        assert!(cmd.contains("--document-name AWS-StartSSHSession"));
        assert!(cmd.contains("--parameters portNumber=%p"));
        assert!(!cmd.contains("--profile"));
        assert!(!cmd.contains("--region"));
    }

    #[test]
    fn test_proxy_command_with_profile_and_region() {
        let cmd = ssm_proxy_command(Some("staging"), Some("eu-west-1"));
        assert!(cmd.contains("--profile staging"));
        assert!(cmd.contains("--region eu-west-1"));
    }

    #[test]
    fn test_proxy_command_escapes_shell_metacharacters() {
        let cmd = ssm_proxy_command(Some("my profile; rm -rf /"), None);
        assert!(cmd.contains("'my profile; rm -rf /'"));
    }

    #[test]
    fn test_ssh_options() {
        let opts = ssh_options("sh -c \"proxy\"", Path::new("/tmp/key"), Duration::from_secs(15));
        let joined = opts.join(" ");
        assert!(joined.contains("ProxyCommand=sh -c \"proxy\""));
        assert!(joined.contains("StrictHostKeyChecking=no"));
        assert!(joined.contains("UserKnownHostsFile=/dev/null"));
        assert!(joined.contains("IdentitiesOnly=yes"));
        assert!(joined.contains("ConnectTimeout=15"));
        assert!(joined.ends_with("-i /tmp/key"));
    }
}
