use tokio_util::sync::CancellationToken;

use aws_ssh_tunnel::session::SessionDescriptor;
use aws_ssh_tunnel::Result;

use super::prepare_session;

/// Run an interactive SSH session on the jump instance, returning the
/// remote shell's exit status
pub async fn execute(
    tag: Option<String>,
    profile: Option<String>,
    region: Option<String>,
    cancel: CancellationToken,
) -> Result<i32> {
    let descriptor = SessionDescriptor::interactive();
    let setup = prepare_session(tag, profile, region).await?;

    setup
        .orchestrator
        .run(&setup.filter, &descriptor, &cancel)
        .await
}
