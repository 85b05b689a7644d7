pub mod browse;
pub mod schema;
pub mod stream;
pub mod topics;

use std::io::Write;
use std::sync::Arc;

use lens_api::Record;
use lens_engine::{Controller, LogNotifier, MemoryBackend};

use crate::config::Profile;
use crate::dump;
use crate::error::CliError;

/// Backend populated from the profile's dump, plus a controller over it.
pub struct Session {
    pub profile: Profile,
    pub backend: Arc<MemoryBackend>,
    pub controller: Controller,
}

impl Session {
    pub fn open(config_path: &str) -> Result<Self, CliError> {
        let profile = Profile::load(config_path)?;
        tracing::info!(config = %config_path, topic = %profile.connection.topic, "loaded profile");

        let backend = Arc::new(MemoryBackend::new());
        match &profile.dump {
            Some(path) => {
                dump::load(path, &backend)?;
            }
            None => tracing::warn!("profile has no dump, backend starts empty"),
        }

        let controller = Controller::new(
            backend.clone(),
            backend.clone(),
            Arc::new(LogNotifier),
            profile.controller.clone(),
        );
        Ok(Self { profile, backend, controller })
    }
}

/// Write records to stdout as JSON lines.
pub fn print_records(records: &[Record]) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
