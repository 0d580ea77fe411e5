//! Populate a store from configuration

use guardian_api::Policy;
use guardian_config::ServiceConfig;
use guardian_store::{Store, StoreResult, StoreSeed};
use tracing::info;

/// Counts of records written by [`seed_store`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub children: usize,
    pub apps: usize,
    pub policies: usize,
    pub installs: usize,
    pub alerts: usize,
    pub screen_time_days: usize,
}

impl SeedSummary {
    fn of(seed: &StoreSeed) -> Self {
        Self {
            children: seed.children.len(),
            apps: seed.apps.len(),
            policies: seed.policies.len(),
            installs: seed.installs.len(),
            alerts: seed.alerts.len(),
            screen_time_days: seed.screen_time.len(),
        }
    }
}

/// Collect the configured roster, catalog and sample state.
///
/// Config order is ledger order: later alerts are newer.
pub fn store_seed(config: &ServiceConfig) -> StoreSeed {
    let policies = config
        .policies
        .iter()
        .map(|policy| Policy {
            updated_at: Some(policy.updated_at.unwrap_or_else(guardian_util::now)),
            ..policy.clone()
        })
        .collect();

    StoreSeed {
        children: config.children.clone(),
        apps: config.apps.clone(),
        policies,
        installs: config.installs.clone(),
        alerts: config
            .alerts
            .iter()
            .map(|seed| (seed.alert.clone(), seed.is_read))
            .collect(),
        screen_time: config.screen_time.clone(),
    }
}

/// Write the configured state into `store` as one unit.
///
/// Returns `None` without writing anything when the store already holds
/// data, so a persistent store is seeded only on first start. A failed
/// seed leaves the store empty and is attempted again on the next start.
pub fn seed_store(store: &dyn Store, config: &ServiceConfig) -> StoreResult<Option<SeedSummary>> {
    let seed = store_seed(config);
    if !store.import_seed(&seed)? {
        info!("Store already populated, skipping seed");
        return Ok(None);
    }

    let summary = SeedSummary::of(&seed);
    info!(
        children = summary.children,
        apps = summary.apps,
        policies = summary.policies,
        installs = summary.installs,
        alerts = summary.alerts,
        screen_time_days = summary.screen_time_days,
        "Store seeded from config"
    );

    Ok(Some(summary))
}
