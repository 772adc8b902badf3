//! Remote sharing-platform clients.
//!
//! This module defines the per-resource client contracts the reconcilers
//! operate against, the platform resource types, and the REST transport.

mod api;
mod context;
mod http;
mod types;

pub use api::{PipelineApi, RecipientApi, ScheduleApi, ShareApi};
pub use context::{RemoteContext, RemoteScope};
pub use http::HttpRemoteClient;
pub use types::{
    AuthenticationKind, CreatePipelineRequest, CreateRecipientRequest, CreateShareRequest,
    PipelineFilter, RemotePipeline, RemoteRecipient, RemoteSchedule, RemoteShare, ScheduleState,
};

#[cfg(test)]
pub use api::{MockPipelineApi, MockRecipientApi, MockScheduleApi, MockShareApi};
