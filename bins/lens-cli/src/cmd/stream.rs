use std::time::Duration;

use lens_api::{FilterPatch, Record};
use lens_engine::{Controller, RefreshOutcome, SessionUpdate};

use crate::cmd::{Session, print_records};
use crate::config::StreamArgs;
use crate::error::CliError;

pub async fn run(config_path: &str, args: StreamArgs) -> Result<(), CliError> {
    let mut patch = FilterPatch::default();
    if let Some(key) = args.key.filter(|k| !k.is_empty()) {
        patch = patch.key_filter(key);
    }
    if let Some(payload) = args.payload.filter(|p| !p.is_empty()) {
        patch = patch.payload_filter(payload);
    }
    if patch.key_filter.is_none() && patch.payload_filter.is_none() {
        return Err(CliError::Config {
            context: "stream",
            detail: "--key or --payload is required".into(),
        });
    }

    let mut session = Session::open(config_path)?;
    let controller = &mut session.controller;
    controller.configure(&session.profile.connection).await?;
    controller.update_filter(session.profile.filter_patch());
    controller.update_filter(patch);

    if let RefreshOutcome::Pulled(count) = controller.refresh().await? {
        tracing::warn!(records = count, "no text filter in effect, pulled a batch instead");
        return print_records(controller.records());
    }

    let end = follow(controller, args.timeout_secs.map(Duration::from_secs), print_records).await?;
    tracing::info!(
        outcome = ?end,
        matched = controller.buffered(),
        listeners = session.backend.listener_count(),
        "stream finished"
    );
    Ok(())
}

/// Apply streaming events until the session ends, handing every newly
/// appended slice of records to `on_records`. Ctrl+C or `timeout`
/// cancels the session.
pub async fn follow(
    controller: &mut Controller,
    timeout: Option<Duration>,
    mut on_records: impl FnMut(&[Record]) -> Result<(), CliError>,
) -> Result<SessionUpdate, CliError> {
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    let mut seen = controller.buffered();
    loop {
        let expired = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, cancelling session");
                controller.cancel().await?;
                return Ok(SessionUpdate::Cancelled);
            }
            _ = expired => {
                tracing::info!("timeout reached, cancelling session");
                controller.cancel().await?;
                return Ok(SessionUpdate::Cancelled);
            }
            update = controller.next_event() => {
                let Some(update) = update else {
                    return Ok(SessionUpdate::Closed);
                };
                if update == SessionUpdate::Record {
                    on_records(&controller.records()[seen..])?;
                    seen = controller.buffered();
                }
                if update.is_terminal() {
                    return Ok(update);
                }
            }
        }
    }
}
