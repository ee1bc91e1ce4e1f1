use async_trait::async_trait;
use aws_sdk_ec2instanceconnect::Client as InstanceConnectClient;

use crate::keys::KeyAuthorizer;
use crate::session::resolver::ResolvedInstance;
use crate::{Result, TunnelError};

/// Authorizes ephemeral public keys through EC2 Instance Connect. The
/// service expires the key server-side after about 60 seconds; there is no
/// revoke call, so that window is the leak bound if the session dies after
/// the push.
pub struct InstanceConnectAuthorizer {
    client: InstanceConnectClient,
}

impl InstanceConnectAuthorizer {
    pub fn new(client: InstanceConnectClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyAuthorizer for InstanceConnectAuthorizer {
    async fn authorize(
        &self,
        instance: &ResolvedInstance,
        user: &str,
        public_key: &str,
    ) -> Result<()> {
        let response = self
            .client
            .send_ssh_public_key()
            .instance_id(&instance.id)
            .instance_os_user(user)
            .ssh_public_key(public_key)
            .availability_zone(&instance.availability_zone)
            .send()
            .await
            .map_err(|e| TunnelError::AuthorizationFailed {
                instance_id: instance.id.clone(),
                reason: e.to_string(),
            })?;

        if !response.success() {
            return Err(TunnelError::AuthorizationFailed {
                instance_id: instance.id.clone(),
                reason: format!("rejected (request id {:?})", response.request_id()),
            });
        }

        Ok(())
    }
}
