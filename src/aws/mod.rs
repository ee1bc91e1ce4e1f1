pub mod authorize;
pub mod client;
pub mod inventory;

pub use authorize::InstanceConnectAuthorizer;
pub use client::AwsClients;
pub use inventory::Ec2Inventory;
