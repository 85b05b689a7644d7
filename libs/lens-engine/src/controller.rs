use std::sync::Arc;

use lens_api::{
    CanonicalConfig, ConsumerBackend, FilterPatch, FilterSpec, Notifier, PositionFilter, RawConfig,
    Record, SchemaMetadata, SessionEvent, SessionEvents, StreamRequest,
};

use crate::buffer::MessageBuffer;
use crate::error::ControllerError;
use crate::filter_state::FilterTracker;
use crate::gate::{AppliedConfig, ConfigGate, Discovery};
use crate::notifier::DecodeErrorNotifier;
use crate::settings::ControllerSettings;
use crate::subscription::{Polled, SubscriptionGroup};

/// Consumption mode of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No configuration applied yet.
    Idle,
    /// Configured; records arrive through on-demand pulls.
    BatchReady,
    /// A streaming session is active.
    Streaming,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => f.write_str("idle"),
            Mode::BatchReady => f.write_str("batch"),
            Mode::Streaming => f.write_str("streaming"),
        }
    }
}

/// Internal state. The subscription group only exists inside `Streaming`,
/// so pulling while streaming or streaming without subscriptions cannot
/// be represented.
enum State {
    Idle,
    BatchReady(AppliedConfig),
    Streaming {
        applied: AppliedConfig,
        group: SubscriptionGroup,
    },
}

impl State {
    fn mode(&self) -> Mode {
        match self {
            State::Idle => Mode::Idle,
            State::BatchReady(_) => Mode::BatchReady,
            State::Streaming { .. } => Mode::Streaming,
        }
    }

    fn applied(&self) -> Option<&AppliedConfig> {
        match self {
            State::Idle => None,
            State::BatchReady(applied) | State::Streaming { applied, .. } => Some(applied),
        }
    }
}

/// What a `refresh` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A batch pull appended this many records.
    Pulled(usize),
    /// A streaming session was opened.
    Streaming,
}

/// Effect of one applied streaming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    Started,
    Record,
    Completed,
    Cancelled,
    /// The backend dropped the session without a terminal event.
    Closed,
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionUpdate::Started | SessionUpdate::Record)
    }
}

/// Snapshot of one presentation page. Re-read after every append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub total_pages: usize,
    pub records: Vec<Record>,
}

/// Streaming Session Controller.
///
/// Decides between on-demand pulls and streaming sessions, owns the message
/// buffer, reconciles pending and applied filters, and surfaces the first
/// decode failure of every session.
///
/// All operations take `&mut self`: one operation is in flight per
/// controller at a time, and buffer appends from pulls and from streaming
/// events are serialized by construction.
pub struct Controller {
    backend: Arc<dyn ConsumerBackend>,
    events: Arc<dyn SessionEvents>,
    notifier: Arc<dyn Notifier>,
    settings: ControllerSettings,
    state: State,
    buffer: MessageBuffer,
    filters: FilterTracker,
    decode_errors: DecodeErrorNotifier,
    last_session: u64,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("mode", &self.mode())
            .field("buffered", &self.buffer.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Controller {
    pub fn new(
        backend: Arc<dyn ConsumerBackend>,
        events: Arc<dyn SessionEvents>,
        notifier: Arc<dyn Notifier>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            backend,
            events,
            notifier,
            settings,
            state: State::Idle,
            buffer: MessageBuffer::new(),
            filters: FilterTracker::new(),
            decode_errors: DecodeErrorNotifier::new(),
            last_session: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Active canonical configuration, if any.
    pub fn config(&self) -> Option<&CanonicalConfig> {
        self.state.applied().map(|a| &a.config)
    }

    /// Partitions discovered for the active configuration.
    pub fn partitions(&self) -> &[i32] {
        self.state.applied().map(|a| a.partitions.as_slice()).unwrap_or(&[])
    }

    pub fn status(&self) -> String {
        match self.state.applied() {
            None => "not configured".to_string(),
            Some(a) => format!(
                "connected to {} topic {} ({})",
                a.config.broker,
                a.config.topic,
                self.mode()
            ),
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn records(&self) -> &[Record] {
        self.buffer.records()
    }

    pub fn current_page(&self) -> usize {
        self.buffer.cursor()
    }

    pub fn page_count(&self) -> usize {
        self.buffer.page_count(self.settings.page_size)
    }

    /// Snapshot of page `number` without moving the cursor or prefetching.
    pub fn page(&self, number: usize) -> Page {
        Page {
            number,
            total_pages: self.page_count(),
            records: self.buffer.page(number, self.settings.page_size).to_vec(),
        }
    }

    pub fn pending_filter(&self) -> &FilterSpec {
        self.filters.pending()
    }

    pub fn applied_filter(&self) -> &FilterSpec {
        self.filters.applied()
    }

    pub fn is_filter_dirty(&self) -> bool {
        self.filters.is_dirty()
    }

    /// Edit the pending filter. Takes effect on the next `refresh`.
    pub fn update_filter(&mut self, patch: FilterPatch) {
        self.filters.update(patch);
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Apply a new configuration and populate the buffer with one pull.
    ///
    /// Any running streaming session is released first. The buffer, filters
    /// and decode-error flag are reset before validation, so a rejected
    /// configuration, or a failed initial pull, leaves the controller `Idle`
    /// with nothing buffered. Returns the number of records of the initial
    /// pull.
    pub async fn configure(&mut self, raw: &RawConfig) -> Result<usize, ControllerError> {
        if self.mode() == Mode::Streaming {
            self.stop_session("reconfigure").await;
        }
        self.state = State::Idle;
        self.buffer.clear();
        self.filters.reset();
        self.decode_errors.reset();

        let applied = ConfigGate::apply(self.backend.as_ref(), raw).await.inspect_err(|e| {
            tracing::warn!(topic = %raw.topic, error = %e, "configuration rejected");
        })?;
        self.state = State::BatchReady(applied);

        match self.pull_next_batch(self.settings.batch_limit).await {
            Ok(count) => Ok(count),
            Err(e) => {
                tracing::warn!(topic = %raw.topic, error = %e, "initial pull failed");
                self.state = State::Idle;
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Topic names for a connection that is not applied yet. Never fails.
    pub async fn discover_topics(&self, raw: &RawConfig) -> Discovery<String> {
        ConfigGate::discover_topics(self.backend.as_ref(), raw).await
    }

    pub async fn describe_schema(&self, files: &[String]) -> Result<SchemaMetadata, ControllerError> {
        ConfigGate::describe_schema(self.backend.as_ref(), files).await
    }

    // -----------------------------------------------------------------------
    // Batch mode
    // -----------------------------------------------------------------------

    /// Pull up to `limit` more records and append them.
    ///
    /// Rejected while streaming. A failed pull leaves the buffer untouched.
    /// Returns the number of appended records; zero is a no-op.
    pub async fn pull_next_batch(&mut self, limit: usize) -> Result<usize, ControllerError> {
        match self.state {
            State::Idle => return Err(ControllerError::NotConfigured),
            State::Streaming { .. } => return Err(ControllerError::Streaming("pull")),
            State::BatchReady(_) => {}
        }

        let records = self
            .backend
            .pull_batch(limit)
            .await
            .map_err(ControllerError::backend("pull batch"))?;
        let count = records.len();
        if count == 0 {
            tracing::debug!("pull returned no records");
            return Ok(0);
        }
        for record in &records {
            self.inspect(record);
        }
        self.buffer.append(records);
        tracing::debug!(count, buffered = self.buffer.len(), "batch appended");
        Ok(count)
    }

    /// Move the page cursor and return the page.
    ///
    /// When `number` is the last page, that page is exactly full, the
    /// filter is clean and no session is streaming, one more batch is
    /// prefetched: an aligned buffer suggests more data exists.
    pub async fn request_page(&mut self, number: usize) -> Result<Page, ControllerError> {
        let number = number.max(1);
        self.buffer.set_cursor(number);

        let size = self.settings.page_size;
        let prefetch = matches!(self.state, State::BatchReady(_))
            && !self.filters.is_dirty()
            && number == self.buffer.page_count(size)
            && self.buffer.last_page_full(size);
        if prefetch {
            tracing::debug!(page = number, "last page full, prefetching");
            self.pull_next_batch(self.settings.batch_limit).await?;
        }
        Ok(self.page(number))
    }

    // -----------------------------------------------------------------------
    // Refresh / streaming
    // -----------------------------------------------------------------------

    /// Re-consume under the pending filter.
    ///
    /// A dirty filter is pushed to the backend and committed first; if that
    /// fails nothing else changes. Then the buffer and decode-error flag are
    /// reset, and either a streaming session is opened (a text filter is
    /// set) or one batch is pulled. A running session is released before
    /// anything else.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome, ControllerError> {
        if self.mode() == Mode::Streaming {
            self.stop_session("refresh").await;
        }
        if self.mode() == Mode::Idle {
            return Err(ControllerError::NotConfigured);
        }

        if self.filters.is_dirty() {
            let position = PositionFilter::from(self.filters.pending());
            self.backend
                .apply_filter(position)
                .await
                .map_err(ControllerError::backend("apply filter"))?;
            self.filters.commit();
            tracing::info!(
                partition = %position.partition,
                start_offset = ?position.start_offset,
                start_position = %position.start_position,
                "filter applied"
            );
        }

        self.buffer.clear();
        self.decode_errors.reset();

        if self.filters.applied().has_text_filters() {
            self.start_session().await?;
            Ok(RefreshOutcome::Streaming)
        } else {
            let pulled = self.pull_next_batch(self.settings.batch_limit).await?;
            Ok(RefreshOutcome::Pulled(pulled))
        }
    }

    /// Subscribe to all session events, then send the start request.
    /// Subscribing first means no event emitted on start can be missed.
    async fn start_session(&mut self) -> Result<(), ControllerError> {
        let session = self.last_session + 1;
        self.last_session = session;

        let group = SubscriptionGroup::acquire(self.events.as_ref(), session)
            .await
            .map_err(ControllerError::backend("subscribe"))?;
        self.state = match std::mem::replace(&mut self.state, State::Idle) {
            State::BatchReady(applied) => State::Streaming { applied, group },
            other => other,
        };

        let request = StreamRequest::from_filter(self.settings.stream_limit, self.filters.applied());
        if let Err(e) = self.backend.start_streaming(request).await {
            self.release_session();
            tracing::warn!(session, error = %e, "streaming start failed");
            return Err(ControllerError::Backend { op: "start streaming", source: e });
        }
        tracing::info!(
            session,
            key_filter = ?self.filters.applied().key_filter,
            payload_filter = ?self.filters.applied().payload_filter,
            "streaming session started"
        );
        Ok(())
    }

    /// Stop the active streaming session.
    ///
    /// Subscriptions are released before the backend is asked to cancel, and
    /// the controller is back in `BatchReady` even if that request fails.
    pub async fn cancel(&mut self) -> Result<(), ControllerError> {
        if self.mode() != Mode::Streaming {
            return Err(ControllerError::NotStreaming);
        }
        self.stop_session("cancel").await;
        Ok(())
    }

    async fn stop_session(&mut self, reason: &'static str) {
        let Some(session) = self.release_session() else {
            return;
        };
        match self.backend.cancel_streaming().await {
            Ok(()) => tracing::info!(session, reason, "streaming session cancelled"),
            Err(e) => {
                tracing::warn!(session, reason, error = %e, "backend cancel failed, session released locally")
            }
        }
    }

    /// Drop the subscription group and fall back to `BatchReady`.
    fn release_session(&mut self) -> Option<u64> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Streaming { applied, group } => {
                let session = group.session();
                drop(group);
                self.state = State::BatchReady(applied);
                Some(session)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Wait for and apply the next streaming event. `None` when not streaming.
    pub async fn next_event(&mut self) -> Option<SessionUpdate> {
        let State::Streaming { group, .. } = &mut self.state else {
            return None;
        };
        let event = group.next().await;
        Some(self.apply_event(event))
    }

    /// Apply every event already delivered, without waiting.
    pub fn drain_events(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let State::Streaming { group, .. } = &mut self.state {
            match group.try_next() {
                Polled::Event(event) => updates.push(self.apply_event(Some(event))),
                Polled::Empty => break,
                Polled::Closed => {
                    updates.push(self.apply_event(None));
                    break;
                }
            }
        }
        updates
    }

    fn apply_event(&mut self, event: Option<SessionEvent>) -> SessionUpdate {
        match event {
            Some(SessionEvent::Started) => {
                tracing::debug!(session = self.last_session, "streaming confirmed");
                SessionUpdate::Started
            }
            Some(SessionEvent::Record(record)) => {
                self.inspect(&record);
                self.buffer.push(record);
                SessionUpdate::Record
            }
            Some(SessionEvent::Completed) => {
                self.release_session();
                tracing::info!(session = self.last_session, buffered = self.buffer.len(), "streaming session completed");
                SessionUpdate::Completed
            }
            Some(SessionEvent::Cancelled) => {
                self.release_session();
                tracing::info!(session = self.last_session, "streaming session cancelled by backend");
                SessionUpdate::Cancelled
            }
            None => {
                self.release_session();
                tracing::warn!(session = self.last_session, "event stream closed without terminal event");
                SessionUpdate::Closed
            }
        }
    }

    /// Raise the session's decode-failure notice if `record` is its first.
    fn inspect(&mut self, record: &Record) {
        if let Some(notice) = self.decode_errors.consider(record) {
            tracing::warn!(record = %record.id, error = %notice.message, "payload decode failed");
            self.notifier.notify(notice);
        }
    }
}
