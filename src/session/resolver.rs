use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::session::selector::TagFilter;
use crate::{Result, TunnelError};

/// One running instance matched by the tag filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    pub id: String,
    /// EC2 Instance Connect scopes key pushes to the availability zone
    pub availability_zone: String,
    pub private_ip: Option<String>,
    pub launch_time: Option<DateTime<Utc>>,
}

/// Read-only inventory of running instances, keyed by tag
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    async fn running_instances(&self, filter: &TagFilter) -> Result<Vec<ResolvedInstance>>;
}

/// Resolve the tag filter to a single running instance.
///
/// Zero matches is fatal (a configuration problem, not worth retrying).
/// Multiple matches pick one uniformly at random: the caller needs *a* valid
/// jump host, not a specific one. The rng is injected so tests can seed it.
pub async fn resolve(
    inventory: &dyn InstanceInventory,
    filter: &TagFilter,
    rng: &mut impl Rng,
) -> Result<ResolvedInstance> {
    let mut instances = inventory.running_instances(filter).await?;

    if instances.is_empty() {
        return Err(TunnelError::InstanceNotFound(filter.to_string()));
    }

    let picked = instances.swap_remove(rng.gen_range(0..instances.len()));
    println!(
        "Found instance with tag {} and id {} on availability zone {}...",
        filter, picked.id, picked.availability_zone
    );

    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct FixedInventory(Vec<ResolvedInstance>);

    #[async_trait]
    impl InstanceInventory for FixedInventory {
        async fn running_instances(&self, _filter: &TagFilter) -> Result<Vec<ResolvedInstance>> {
            Ok(self.0.clone())
        }
    }

    fn instance(id: &str) -> ResolvedInstance {
        ResolvedInstance {
            id: id.to_string(),
            availability_zone: "eu-west-1a".to_string(),
            private_ip: Some("10.0.1.5".to_string()),
            launch_time: None,
        }
    }

    fn filter() -> TagFilter {
        TagFilter::parse("application=jump_server").unwrap()
    }

    #[tokio::test]
    async fn test_zero_matches_fails() {
        let inventory = FixedInventory(vec![]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = resolve(&inventory, &filter(), &mut rng).await.unwrap_err();
        assert!(matches!(err, TunnelError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_single_match_returned() {
        let inventory = FixedInventory(vec![instance("i-abc")]);
        let mut rng = StdRng::seed_from_u64(0);
        let picked = resolve(&inventory, &filter(), &mut rng).await.unwrap();
        assert_eq!(picked.id, "i-abc");
    }

    #[tokio::test]
    async fn test_tie_break_picks_existing_instance() {
        let ids = ["i-a", "i-b", "i-c"];
        let inventory = FixedInventory(ids.iter().map(|id| instance(id)).collect());

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = resolve(&inventory, &filter(), &mut rng).await.unwrap();
            assert!(ids.contains(&picked.id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_tie_break_deterministic_with_seed() {
        let inventory = FixedInventory(vec![instance("i-a"), instance("i-b"), instance("i-c")]);

        let mut rng_one = StdRng::seed_from_u64(42);
        let mut rng_two = StdRng::seed_from_u64(42);
        let first = resolve(&inventory, &filter(), &mut rng_one).await.unwrap();
        let second = resolve(&inventory, &filter(), &mut rng_two).await.unwrap();
        assert_eq!(first.id, second.id);
    }
}
