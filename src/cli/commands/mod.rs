pub mod config;
pub mod forward;
pub mod ssh;

use indicatif::{ProgressBar, ProgressStyle};

use aws_ssh_tunnel::aws::{AwsClients, Ec2Inventory, InstanceConnectAuthorizer};
use aws_ssh_tunnel::config::Settings;
use aws_ssh_tunnel::keys::Ed25519KeyFactory;
use aws_ssh_tunnel::session::orchestrator::Orchestrator;
use aws_ssh_tunnel::session::selector::TagFilter;
use aws_ssh_tunnel::session::ssm::SsmChannelOpener;
use aws_ssh_tunnel::Result;

pub(crate) struct SessionSetup {
    pub filter: TagFilter,
    pub orchestrator: Orchestrator,
}

/// Merge CLI arguments with stored settings, connect to AWS, and wire up an
/// orchestrator against the real AWS collaborators
pub(crate) async fn prepare_session(
    tag: Option<String>,
    profile: Option<String>,
    region: Option<String>,
) -> Result<SessionSetup> {
    let settings = Settings::load()?;

    let filter = TagFilter::parse(&settings.effective_tag(tag)?)?;
    let profile = settings.effective_profile(profile);
    let region = settings.effective_region(region);
    let user = settings.effective_user();

    let spinner = create_spinner("Connecting to AWS...");
    let clients = AwsClients::new(profile.as_deref(), region.as_deref()).await?;
    spinner.finish_with_message(format!(
        "Connected to AWS (region {}, account {})",
        clients.region, clients.account_id
    ));

    let orchestrator = Orchestrator::new(
        Box::new(Ec2Inventory::new(clients.ec2.clone())),
        Box::new(InstanceConnectAuthorizer::new(
            clients.instance_connect.clone(),
        )),
        Box::new(SsmChannelOpener::new(
            clients.ssm.clone(),
            profile,
            region,
            user.clone(),
        )),
        Box::new(Ed25519KeyFactory),
        user,
    );

    Ok(SessionSetup {
        filter,
        orchestrator,
    })
}

pub(crate) fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}
