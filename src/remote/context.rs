//! Remote context bundling the per-resource clients.

use std::sync::Arc;

use super::api::{PipelineApi, RecipientApi, ScheduleApi, ShareApi};

/// Scope applied to remote searches.
///
/// `catalog` and `schema` keep target-table lookups from matching pipelines
/// owned by another tenant.
#[derive(Debug, Clone, Default)]
pub struct RemoteScope {
    /// Target workspace name.
    pub workspace: String,
    /// Catalog restricting pipeline searches.
    pub catalog: Option<String>,
    /// Schema restricting pipeline searches.
    pub schema: Option<String>,
}

/// The bundle of remote clients a run operates against.
#[derive(Clone)]
pub struct RemoteContext {
    /// Recipient client.
    pub recipients: Arc<dyn RecipientApi>,
    /// Share client.
    pub shares: Arc<dyn ShareApi>,
    /// Pipeline client.
    pub pipelines: Arc<dyn PipelineApi>,
    /// Schedule client.
    pub schedules: Arc<dyn ScheduleApi>,
    /// Search scope.
    pub scope: RemoteScope,
}

impl RemoteContext {
    /// Creates a new remote context.
    #[must_use]
    pub fn new(
        recipients: Arc<dyn RecipientApi>,
        shares: Arc<dyn ShareApi>,
        pipelines: Arc<dyn PipelineApi>,
        schedules: Arc<dyn ScheduleApi>,
        scope: RemoteScope,
    ) -> Self {
        Self {
            recipients,
            shares,
            pipelines,
            schedules,
            scope,
        }
    }

    /// Returns a pipeline filter carrying this context's search scope.
    #[must_use]
    pub fn pipeline_filter(&self, target_table: Option<&str>) -> super::types::PipelineFilter {
        super::types::PipelineFilter {
            catalog: self.scope.catalog.clone(),
            schema: self.scope.schema.clone(),
            target_table: target_table.map(String::from),
        }
    }
}

impl std::fmt::Debug for RemoteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContext")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
