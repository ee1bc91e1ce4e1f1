use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client as Ec2Client;
use chrono::DateTime;

use crate::session::resolver::{InstanceInventory, ResolvedInstance};
use crate::session::selector::TagFilter;
use crate::{Result, TunnelError};

/// EC2-backed instance inventory: DescribeInstances restricted to running
/// instances carrying the selector tag
pub struct Ec2Inventory {
    ec2: Ec2Client,
}

impl Ec2Inventory {
    pub fn new(ec2: Ec2Client) -> Self {
        Self { ec2 }
    }
}

#[async_trait]
impl InstanceInventory for Ec2Inventory {
    async fn running_instances(&self, filter: &TagFilter) -> Result<Vec<ResolvedInstance>> {
        let response = self
            .ec2
            .describe_instances()
            .filters(
                Filter::builder()
                    .name(format!("tag:{}", filter.key))
                    .values(&filter.value)
                    .build(),
            )
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            )
            .send()
            .await
            .map_err(TunnelError::ec2)?;

        let instances = response
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .filter_map(|instance| {
                let id = instance.instance_id()?.to_string();
                let availability_zone = instance
                    .placement()
                    .and_then(|p| p.availability_zone())?
                    .to_string();

                Some(ResolvedInstance {
                    id,
                    availability_zone,
                    private_ip: instance.private_ip_address().map(String::from),
                    launch_time: instance
                        .launch_time()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                })
            })
            .collect();

        Ok(instances)
    }
}
