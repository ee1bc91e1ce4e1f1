use tokio_util::sync::CancellationToken;

use aws_ssh_tunnel::session::SessionDescriptor;
use aws_ssh_tunnel::Result;

use super::prepare_session;

/// Run a port forwarding session: local port -> jump instance -> remote
/// host:port, as seen from the instance's network position
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    tag: Option<String>,
    profile: Option<String>,
    region: Option<String>,
    remote_host: Option<String>,
    port: u16,
    local_port: Option<u16>,
    cancel: CancellationToken,
) -> Result<i32> {
    let descriptor = SessionDescriptor::forward(remote_host, port, local_port)?;
    let setup = prepare_session(tag, profile, region).await?;

    setup
        .orchestrator
        .run(&setup.filter, &descriptor, &cancel)
        .await
}
