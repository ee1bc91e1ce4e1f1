use aws_config::BehaviorVersion;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2instanceconnect::Client as InstanceConnectClient;
use aws_sdk_ssm::Client as SsmClient;
use aws_sdk_sts::Client as StsClient;

use crate::{Result, TunnelError};

/// AWS client wrapper holding all service clients
#[derive(Clone)]
pub struct AwsClients {
    pub ec2: Ec2Client,
    pub ssm: SsmClient,
    pub instance_connect: InstanceConnectClient,
    pub sts: StsClient,
    pub region: String,
    pub account_id: String,
}

impl AwsClients {
    /// Create new AWS clients with optional profile and region overrides
    /// (CLI arguments or settings); falls back to the ambient AWS
    /// configuration chain for anything not given
    pub async fn new(profile: Option<&str>, region: Option<&str>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }

        let config = loader.load().await;

        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or(TunnelError::AwsCredentials)?;

        let ec2 = Ec2Client::new(&config);
        let ssm = SsmClient::new(&config);
        let instance_connect = InstanceConnectClient::new(&config);
        let sts = StsClient::new(&config);

        // Verify credentials by getting caller identity
        let identity = sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|_| TunnelError::AwsCredentials)?;

        let account_id = identity
            .account()
            .ok_or(TunnelError::AwsCredentials)?
            .to_string();

        Ok(Self {
            ec2,
            ssm,
            instance_connect,
            sts,
            region,
            account_id,
        })
    }
}
