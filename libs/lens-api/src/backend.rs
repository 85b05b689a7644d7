use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::config::CanonicalConfig;
use crate::error::BackendError;
use crate::event::{EventListener, SessionEventKind};
use crate::filter::{FilterSpec, PartitionSelector, StartPosition};
use crate::record::Record;

/// Position part of a filter, the only part the backend applies on its own.
/// Text filters travel with the streaming start request instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionFilter {
    pub partition: PartitionSelector,
    pub start_offset: Option<i64>,
    pub start_position: StartPosition,
}

impl From<&FilterSpec> for PositionFilter {
    fn from(spec: &FilterSpec) -> Self {
        Self {
            partition: spec.partition,
            start_offset: spec.start_offset,
            start_position: spec.start_position,
        }
    }
}

/// Start request of a streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Session completes after this many matching records.
    pub limit: usize,
    pub key_filter: Option<String>,
    pub payload_filter: Option<String>,
}

impl StreamRequest {
    pub fn from_filter(limit: usize, spec: &FilterSpec) -> Self {
        Self {
            limit,
            key_filter: spec.key_filter.clone(),
            payload_filter: spec.payload_filter.clone(),
        }
    }

    /// The request's text filters as a matchable spec.
    pub fn text_filter(&self) -> FilterSpec {
        FilterSpec {
            key_filter: self.key_filter.clone(),
            payload_filter: self.payload_filter.clone(),
            ..Default::default()
        }
    }
}

/// Result of parsing schema files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// Fully qualified names of decodable message types.
    pub message_types: Vec<String>,
    /// Handle under which the backend cached the parsed descriptors.
    pub cache_key: String,
}

/// Request/response operations of the external consumption backend.
///
/// The backend owns the broker connection and the consumption position;
/// the controller only sequences these calls.
pub trait ConsumerBackend: Send + Sync {
    /// Validate and apply a connection configuration.
    fn configure(
        &self,
        config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>>;

    /// Partition ids of the configured topic, in broker order.
    fn discover_partitions(
        &self,
        config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<i32>, BackendError>> + Send + '_>>;

    /// Topic names visible with the given connection settings.
    fn discover_topics(
        &self,
        config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BackendError>> + Send + '_>>;

    /// Pull up to `limit` records from the current consumption position.
    fn pull_batch(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, BackendError>> + Send + '_>>;

    /// Reposition consumption. Resets the backend's read position.
    fn apply_filter(
        &self,
        filter: PositionFilter,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>>;

    /// Start a streaming session. Confirmation arrives as a `Started` event.
    fn start_streaming(
        &self,
        request: StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>>;

    /// Ask the running streaming session to stop. Best-effort.
    fn cancel_streaming(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>>;

    /// Parse schema files into decodable message type names.
    fn parse_schema_metadata(
        &self,
        files: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<SchemaMetadata, BackendError>> + Send + '_>>;
}

/// Push side of the backend: one listener per event class.
pub trait SessionEvents: Send + Sync {
    /// Register a listener for `kind`. The subscription lives as long as
    /// the returned listener.
    fn listen(
        &self,
        kind: SessionEventKind,
    ) -> Pin<Box<dyn Future<Output = Result<EventListener, BackendError>> + Send + '_>>;
}
