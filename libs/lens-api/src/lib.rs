pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod notice;
pub mod record;

pub use backend::{ConsumerBackend, PositionFilter, SchemaMetadata, SessionEvents, StreamRequest};
pub use config::{CanonicalConfig, DecodingMode, PayloadDecoding, RawConfig, SchemaSource, SecurityProtocol};
pub use error::{BackendError, ErrorKind};
pub use event::{EventEmitter, EventListener, SessionEvent, SessionEventKind, listener_channel};
pub use filter::{FilterPatch, FilterSpec, InvalidPartition, PartitionSelector, StartPosition};
pub use notice::{Notice, NoticeLevel, Notifier};
pub use record::{Record, format_timestamp_ms, record_id};
