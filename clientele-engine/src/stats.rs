//! Interaction statistics for list decoration

use clientele_core::{CrmResult, InteractionStats, PartyKind, RecordId, TenantId};
use clientele_storage::UnitOfWork;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAggregator;

impl StatsAggregator {
    /// Count and latest contact per party, one grouped query per page.
    ///
    /// An empty id set never reaches the store. Every requested id gets an
    /// entry; parties without interactions get `{0, None}`.
    pub async fn stats_for(
        uow: &mut dyn UnitOfWork,
        tenant: TenantId,
        kind: PartyKind,
        ids: &[RecordId],
    ) -> CrmResult<HashMap<RecordId, InteractionStats>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut stats = uow.interaction_stats(tenant, kind, ids).await?;
        for id in ids {
            stats.entry(*id).or_default();
        }
        Ok(stats)
    }
}
