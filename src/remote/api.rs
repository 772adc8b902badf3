//! Remote resource client contracts.
//!
//! One trait per resource type. The reconcilers and the rollback manager
//! only ever talk to these traits; the concrete transport lives in
//! [`super::http`]. Error kinds are structured ([`crate::error::RemoteError`])
//! so callers never classify failures by message text.

use async_trait::async_trait;
use std::collections::BTreeSet;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

use super::types::{
    CreatePipelineRequest, CreateRecipientRequest, CreateShareRequest, PipelineFilter,
    RemotePipeline, RemoteRecipient, RemoteSchedule, RemoteShare, ScheduleState,
};

/// Client for recipient resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecipientApi: Send + Sync {
    /// Fetches a recipient by name. Returns `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<RemoteRecipient>>;

    /// Lists all recipients visible to the caller.
    async fn list(&self) -> Result<Vec<RemoteRecipient>>;

    /// Creates a recipient.
    async fn create(&self, request: &CreateRecipientRequest) -> Result<RemoteRecipient>;

    /// Replaces the recipient description.
    async fn set_description<'a>(&self, id: &str, description: Option<&'a str>) -> Result<()>;

    /// Adds addresses to the IP access list.
    async fn add_ip_addresses(&self, id: &str, addresses: &BTreeSet<String>) -> Result<()>;

    /// Removes addresses from the IP access list.
    async fn remove_ip_addresses(&self, id: &str, addresses: &BTreeSet<String>) -> Result<()>;

    /// Deletes a recipient.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Client for share resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ShareApi: Send + Sync {
    /// Fetches a share by name. Returns `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<RemoteShare>>;

    /// Lists all shares visible to the caller.
    async fn list(&self) -> Result<Vec<RemoteShare>>;

    /// Creates a share with no assets and no recipients.
    async fn create(&self, request: &CreateShareRequest) -> Result<RemoteShare>;

    /// Replaces the share description.
    async fn set_description<'a>(&self, id: &str, description: Option<&'a str>) -> Result<()>;

    /// Adds assets to the share.
    async fn add_assets(&self, id: &str, assets: &BTreeSet<String>) -> Result<()>;

    /// Removes assets from the share.
    async fn remove_assets(&self, id: &str, assets: &BTreeSet<String>) -> Result<()>;

    /// Grants recipients access to the share.
    async fn grant_recipients(&self, id: &str, recipients: &BTreeSet<String>) -> Result<()>;

    /// Revokes recipients' access to the share.
    async fn revoke_recipients(&self, id: &str, recipients: &BTreeSet<String>) -> Result<()>;

    /// Deletes a share.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Client for pipeline resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Fetches a pipeline by name. Returns `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<RemotePipeline>>;

    /// Lists pipelines matching the filter.
    async fn list(&self, filter: &PipelineFilter) -> Result<Vec<RemotePipeline>>;

    /// Creates a pipeline.
    async fn create(&self, request: &CreatePipelineRequest) -> Result<RemotePipeline>;

    /// Replaces the pipeline description.
    async fn set_description<'a>(&self, id: &str, description: Option<&'a str>) -> Result<()>;

    /// Deletes a pipeline. Its schedule must be deleted first.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Client for pipeline schedules.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScheduleApi: Send + Sync {
    /// Fetches the schedule of a pipeline. Returns `None` if the pipeline is
    /// unscheduled.
    async fn get_for_pipeline(&self, pipeline_id: &str) -> Result<Option<RemoteSchedule>>;

    /// Creates a schedule for a pipeline.
    async fn create(&self, pipeline_id: &str, state: &ScheduleState) -> Result<RemoteSchedule>;

    /// Replaces an existing schedule's trigger definition.
    async fn update(&self, id: &str, state: &ScheduleState) -> Result<()>;

    /// Deletes a schedule.
    async fn delete(&self, id: &str) -> Result<()>;
}
