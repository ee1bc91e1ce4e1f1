use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::keys::{EphemeralKeyPair, KeyAuthorizer, KeyFactory};
use crate::session::channel::{Channel, ChannelOpener};
use crate::session::interactive::run_interactive;
use crate::session::proxy::ForwardProxy;
use crate::session::resolver::{resolve, InstanceInventory, ResolvedInstance};
use crate::session::selector::TagFilter;
use crate::session::{SessionDescriptor, SessionMode};
use crate::{Result, TunnelError};

/// Sequences one session: resolve, authorize an ephemeral key, open the
/// channel, run the forward proxy or interactive shell, then tear down.
///
/// All collaborators are injected behind traits so tests run the full
/// sequence against in-memory fakes. The rng drives the documented random
/// tie-break among multiple matching instances.
pub struct Orchestrator {
    inventory: Box<dyn InstanceInventory>,
    authorizer: Box<dyn KeyAuthorizer>,
    opener: Box<dyn ChannelOpener>,
    keys: Box<dyn KeyFactory>,
    rng: StdRng,
    user: String,
}

impl Orchestrator {
    pub fn new(
        inventory: Box<dyn InstanceInventory>,
        authorizer: Box<dyn KeyAuthorizer>,
        opener: Box<dyn ChannelOpener>,
        keys: Box<dyn KeyFactory>,
        user: String,
    ) -> Self {
        Self {
            inventory,
            authorizer,
            opener,
            keys,
            rng: StdRng::from_entropy(),
            user,
        }
    }

    /// Replace the tie-break rng with a seeded one (deterministic tests)
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Run one session to completion; returns the process exit code.
    ///
    /// Once a key is generated, it is destroyed exactly once on every exit
    /// path, strictly after the channel is closed. Cancellation is safe at
    /// any point and unwinds only what already exists.
    pub async fn run(
        mut self,
        filter: &TagFilter,
        descriptor: &SessionDescriptor,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        let instance = tokio::select! {
            _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
            resolved = resolve(&*self.inventory, filter, &mut self.rng) => resolved?,
        };

        let mut key = self.keys.generate()?;
        let outcome = self
            .run_session(&instance, descriptor, &mut key, cancel)
            .await;
        key.destroy();

        outcome
    }

    async fn run_session(
        &self,
        instance: &ResolvedInstance,
        descriptor: &SessionDescriptor,
        key: &mut EphemeralKeyPair,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
            pushed = self.authorizer.authorize(instance, &self.user, key.public_key()) => pushed?,
        }
        key.mark_authorized();

        // Channel authentication depends on the pushed key, so this never
        // starts before authorization completed
        let mut channel = tokio::select! {
            _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
            opened = self.opener.open(instance, descriptor, key) => opened?,
        };

        let result = match descriptor.mode {
            SessionMode::Forward => self.run_forward(&channel, descriptor, cancel).await,
            SessionMode::Interactive => {
                println!(
                    "Attempting to start session on AWS SSM Session Manager to {}...",
                    instance.id
                );
                run_interactive(&mut channel, cancel).await
            }
        };

        channel.close().await;
        result
    }

    async fn run_forward(
        &self,
        channel: &Channel,
        descriptor: &SessionDescriptor,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        let proxy = ForwardProxy::bind(descriptor.local_port).await?;
        println!(
            "Attempting to start tunnel on AWS SSM Session Manager to {} using local port {} and remote port {}...",
            descriptor.remote_host,
            proxy.local_addr().port(),
            descriptor.remote_port
        );

        proxy.serve(channel, cancel).await.map(|_| 0)
    }
}
