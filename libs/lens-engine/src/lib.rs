pub mod buffer;
pub mod controller;
pub mod error;
pub mod filter_state;
pub mod gate;
pub mod memory;
pub mod notifier;
pub mod security;
pub mod settings;
pub mod subscription;

pub use buffer::MessageBuffer;
pub use controller::{Controller, Mode, Page, RefreshOutcome, SessionUpdate};
pub use error::{ConfigError, ControllerError};
pub use filter_state::FilterTracker;
pub use gate::{AppliedConfig, ConfigGate, Discovery};
pub use memory::{MemoryBackend, NEWEST_WINDOW, StoredMessage};
pub use notifier::{DecodeErrorNotifier, LogNotifier};
pub use settings::ControllerSettings;
pub use subscription::{Polled, SubscriptionGroup};
