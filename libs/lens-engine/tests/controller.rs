use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use lens_api::{
    BackendError, CanonicalConfig, ConsumerBackend, EventEmitter, EventListener, FilterPatch,
    Notice, Notifier, PartitionSelector, PositionFilter, RawConfig, Record, SchemaMetadata,
    SessionEvent, SessionEventKind, SessionEvents, StreamRequest, listener_channel,
};
use lens_engine::{
    ConfigError, Controller, ControllerError, ControllerSettings, MemoryBackend, Mode,
    RefreshOutcome, SessionUpdate, StoredMessage,
};

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    batches: Mutex<VecDeque<Vec<Record>>>,
    /// Emitted synchronously from inside `start_streaming`.
    on_start: Mutex<Vec<SessionEvent>>,
    fail: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<String>>,
    emitters: Mutex<Vec<EventEmitter>>,
    requests: Mutex<Vec<StreamRequest>>,
    positions: Mutex<Vec<PositionFilter>>,
}

#[derive(Clone, Default)]
struct Fake(Arc<Script>);

impl Fake {
    fn with_batches(batches: impl IntoIterator<Item = Vec<Record>>) -> Self {
        let fake = Fake::default();
        fake.0.batches.lock().unwrap().extend(batches);
        fake
    }

    fn fail(&self, op: &'static str) {
        self.0.fail.lock().unwrap().insert(op);
    }

    fn push_batch(&self, batch: Vec<Record>) {
        self.0.batches.lock().unwrap().push_back(batch);
    }

    fn on_start(&self, events: Vec<SessionEvent>) {
        *self.0.on_start.lock().unwrap() = events;
    }

    fn emit(&self, event: SessionEvent) -> bool {
        let emitters = self.0.emitters.lock().unwrap();
        emitters
            .iter()
            .filter(|e| e.kind() == event.kind())
            .fold(false, |sent, e| e.emit(event.clone()) || sent)
    }

    fn open_listeners(&self) -> usize {
        self.0.emitters.lock().unwrap().iter().filter(|e| !e.is_closed()).count()
    }

    fn calls(&self, op: &str) -> usize {
        self.0.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    fn record(&self, op: &'static str) -> Result<(), BackendError> {
        self.0.calls.lock().unwrap().push(op.to_string());
        if self.0.fail.lock().unwrap().contains(op) {
            return Err(BackendError::io(format!("{op} rejected")));
        }
        Ok(())
    }
}

impl ConsumerBackend for Fake {
    fn configure(
        &self,
        _config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move { self.record("configure") })
    }

    fn discover_partitions(
        &self,
        _config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<i32>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.record("partitions")?;
            Ok(vec![0, 1, 2])
        })
    }

    fn discover_topics(
        &self,
        _config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.record("topics")?;
            Ok(vec!["payments".into(), "orders".into(), "payments".into()])
        })
    }

    fn pull_batch(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.record("pull")?;
            let mut batch = self.0.batches.lock().unwrap().pop_front().unwrap_or_default();
            batch.truncate(limit);
            Ok(batch)
        })
    }

    fn apply_filter(
        &self,
        filter: PositionFilter,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.record("apply_filter")?;
            self.0.positions.lock().unwrap().push(filter);
            Ok(())
        })
    }

    fn start_streaming(
        &self,
        request: StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.record("start")?;
            self.0.requests.lock().unwrap().push(request);
            let events = self.0.on_start.lock().unwrap().clone();
            for event in events {
                self.emit(event);
            }
            Ok(())
        })
    }

    fn cancel_streaming(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move { self.record("cancel") })
    }

    fn parse_schema_metadata(
        &self,
        files: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<SchemaMetadata, BackendError>> + Send + '_>> {
        let count = files.len();
        Box::pin(async move {
            self.record("schema")?;
            Ok(SchemaMetadata {
                message_types: vec!["shop.Order".into()],
                cache_key: format!("files-{count}"),
            })
        })
    }
}

impl SessionEvents for Fake {
    fn listen(
        &self,
        kind: SessionEventKind,
    ) -> Pin<Box<dyn Future<Output = Result<EventListener, BackendError>> + Send + '_>> {
        Box::pin(async move {
            let (tx, rx) = listener_channel(kind);
            self.0.emitters.lock().unwrap().push(tx);
            Ok(rx)
        })
    }
}

#[derive(Default)]
struct Notices(Mutex<Vec<Notice>>);

impl Notifier for Notices {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

impl Notices {
    fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn records(range: std::ops::Range<i64>) -> Vec<Record> {
    range
        .map(|i| Record::new(0, i, format!("k{i}"), format!("payload {i}"), ""))
        .collect()
}

fn orders() -> RawConfig {
    RawConfig {
        broker: "b:9092".into(),
        topic: "orders".into(),
        ..Default::default()
    }
}

fn controller(fake: &Fake) -> (Controller, Arc<Notices>) {
    let notices = Arc::new(Notices::default());
    let controller = Controller::new(
        Arc::new(fake.clone()),
        Arc::new(fake.clone()),
        notices.clone(),
        ControllerSettings::default(),
    );
    (controller, notices)
}

/// A controller with 200 records buffered.
async fn configured(fake: &Fake) -> (Controller, Arc<Notices>) {
    fake.push_batch(records(0..200));
    let (mut c, notices) = controller(fake);
    assert_eq!(c.configure(&orders()).await.unwrap(), 200);
    (c, notices)
}

/// Put `c` into a streaming session with a payload filter.
async fn stream(c: &mut Controller, filter: &str) {
    c.update_filter(FilterPatch::default().payload_filter(filter));
    assert_eq!(c.refresh().await.unwrap(), RefreshOutcome::Streaming);
    assert_eq!(c.mode(), Mode::Streaming);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn configure_pulls_one_batch_and_pages_it() {
    let fake = Fake::default();
    let (c, _) = configured(&fake).await;

    assert_eq!(c.mode(), Mode::BatchReady);
    assert_eq!(c.buffered(), 200);
    assert_eq!(c.page_count(), 10);
    assert_eq!(c.partitions(), &[0, 1, 2]);
    assert_eq!(c.status(), "connected to b:9092 topic orders (batch)");

    let page = c.page(1);
    assert_eq!(page.records.len(), 20);
    assert_eq!(page.records[0].id, "0-0");
    assert_eq!(page.records[19].id, "0-19");
    assert!(c.page(11).records.is_empty());
}

#[tokio::test]
async fn rejected_configuration_stays_idle() {
    let fake = Fake::default();
    let (mut c, _) = controller(&fake);

    let err = c.configure(&RawConfig::default()).await.unwrap_err();
    assert!(matches!(err, ControllerError::Config(ConfigError::EmptyTopic)));
    assert_eq!(c.mode(), Mode::Idle);
    assert_eq!(c.status(), "not configured");
    assert_eq!(fake.calls("configure"), 0);

    fake.fail("configure");
    let err = c.configure(&orders()).await.unwrap_err();
    assert_eq!(err.backend_error().map(|e| e.message()), Some("configure rejected"));
    assert_eq!(c.mode(), Mode::Idle);
}

#[tokio::test]
async fn failed_initial_pull_leaves_controller_idle() {
    let fake = Fake::with_batches([records(0..3)]);
    fake.fail("pull");
    let (mut c, _) = controller(&fake);

    let err = c.configure(&orders()).await.unwrap_err();
    assert!(matches!(err, ControllerError::Backend { op: "pull batch", .. }));
    assert_eq!(c.mode(), Mode::Idle);
    assert_eq!(c.buffered(), 0);
}

#[tokio::test]
async fn partition_discovery_failure_is_not_fatal() {
    let fake = Fake::with_batches([records(0..3)]);
    fake.fail("partitions");
    let (mut c, _) = controller(&fake);

    assert_eq!(c.configure(&orders()).await.unwrap(), 3);
    assert_eq!(c.mode(), Mode::BatchReady);
    assert!(c.partitions().is_empty());
}

#[tokio::test]
async fn reconfigure_clears_buffer_and_filters() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    c.update_filter(FilterPatch::default().partition(PartitionSelector::Partition(1)));
    assert!(c.is_filter_dirty());

    fake.push_batch(records(0..5));
    assert_eq!(c.configure(&orders()).await.unwrap(), 5);
    assert_eq!(c.buffered(), 5);
    assert!(!c.is_filter_dirty());
    assert_eq!(c.pending_filter().partition, PartitionSelector::All);
}

#[tokio::test]
async fn reconfigure_rearms_decode_notice() {
    let failing = || vec![Record::new(0, 0, "k", "\u{fffd}", "").with_decode_error("bad")];
    let fake = Fake::with_batches([failing()]);
    let (mut c, notices) = controller(&fake);

    assert_eq!(c.configure(&orders()).await.unwrap(), 1);
    assert_eq!(notices.count(), 1);

    fake.push_batch(failing());
    assert_eq!(c.configure(&orders()).await.unwrap(), 1);
    assert_eq!(notices.count(), 2);
}

#[tokio::test]
async fn topic_discovery_degrades_to_error_text() {
    let fake = Fake::default();
    let (c, _) = controller(&fake);

    let found = c.discover_topics(&orders()).await;
    assert_eq!(found.items, ["orders", "payments"]);
    assert_eq!(found.error, None);

    fake.fail("topics");
    let found = c.discover_topics(&orders()).await;
    assert!(found.items.is_empty());
    assert_eq!(found.error.as_deref(), Some("topics rejected"));
}

#[tokio::test]
async fn schema_description_rejects_empty_file_list() {
    let fake = Fake::default();
    let (c, _) = controller(&fake);

    let err = c.describe_schema(&[" ".to_string()]).await.unwrap_err();
    assert!(matches!(err, ControllerError::Config(ConfigError::NoSchemaFiles)));
    assert_eq!(fake.calls("schema"), 0);

    let meta = c.describe_schema(&["a.proto".to_string()]).await.unwrap();
    assert_eq!(meta.cache_key, "files-1");
}

// ---------------------------------------------------------------------------
// Batch mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_need_a_configuration() {
    let fake = Fake::default();
    let (mut c, _) = controller(&fake);
    assert!(matches!(c.pull_next_batch(10).await, Err(ControllerError::NotConfigured)));
    assert!(matches!(c.refresh().await, Err(ControllerError::NotConfigured)));
    assert!(matches!(c.cancel().await, Err(ControllerError::NotStreaming)));
}

#[tokio::test]
async fn empty_pull_is_a_no_op() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    assert_eq!(c.pull_next_batch(200).await.unwrap(), 0);
    assert_eq!(c.buffered(), 200);
}

#[tokio::test]
async fn pulled_batch_keeps_order_and_notifies_once() {
    let mut batch = records(0..4);
    batch[1] = batch[1].clone().with_decode_error("first");
    batch[3] = batch[3].clone().with_decode_error("second");
    let fake = Fake::with_batches([batch]);
    let (mut c, notices) = controller(&fake);

    assert_eq!(c.configure(&orders()).await.unwrap(), 4);
    let ids: Vec<_> = c.records().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["0-0", "0-1", "0-2", "0-3"]);
    let raised = notices.0.lock().unwrap().clone();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].message, "first");
    assert_eq!(c.records()[3].decode_error.as_deref(), Some("second"));
}

#[tokio::test]
async fn failed_pull_leaves_buffer_untouched() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.fail("pull");
    assert!(c.pull_next_batch(200).await.is_err());
    assert_eq!(c.buffered(), 200);
    assert_eq!(c.mode(), Mode::BatchReady);
}

#[tokio::test]
async fn full_last_page_prefetches() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.push_batch(records(200..400));

    let page = c.request_page(5).await.unwrap();
    assert_eq!(page.records[0].id, "0-80");
    assert_eq!(fake.calls("pull"), 1);

    let page = c.request_page(10).await.unwrap();
    assert_eq!(page.number, 10);
    assert_eq!(c.current_page(), 10);
    assert_eq!(fake.calls("pull"), 2);
    assert_eq!(c.buffered(), 400);
    assert_eq!(c.page_count(), 20);
}

#[tokio::test]
async fn partial_last_page_does_not_prefetch() {
    let fake = Fake::with_batches([records(0..45)]);
    let (mut c, _) = controller(&fake);
    c.configure(&orders()).await.unwrap();

    let page = c.request_page(3).await.unwrap();
    assert_eq!(page.records.len(), 5);
    assert_eq!(fake.calls("pull"), 1);
}

#[tokio::test]
async fn dirty_filter_blocks_prefetch() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    c.update_filter(FilterPatch::default().start_offset(Some(7)));

    c.request_page(10).await.unwrap();
    assert_eq!(fake.calls("pull"), 1);
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_applies_dirty_filter_then_pulls() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    c.update_filter(FilterPatch::default().partition(PartitionSelector::Partition(2)).start_offset(Some(9)));
    fake.push_batch(records(9..12));

    assert_eq!(c.refresh().await.unwrap(), RefreshOutcome::Pulled(3));
    assert!(!c.is_filter_dirty());
    assert_eq!(c.applied_filter().partition, PartitionSelector::Partition(2));
    assert_eq!(c.buffered(), 3);

    let positions = fake.0.positions.lock().unwrap().clone();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].start_offset, Some(9));
}

#[tokio::test]
async fn clean_refresh_skips_filter_application() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.push_batch(records(0..4));

    assert_eq!(c.refresh().await.unwrap(), RefreshOutcome::Pulled(4));
    assert_eq!(fake.calls("apply_filter"), 0);
    assert_eq!(c.buffered(), 4);
}

#[tokio::test]
async fn failed_filter_application_changes_nothing() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.fail("apply_filter");
    c.update_filter(FilterPatch::default().partition(PartitionSelector::Partition(1)));

    assert!(c.refresh().await.is_err());
    assert!(c.is_filter_dirty());
    assert_eq!(c.applied_filter().partition, PartitionSelector::All);
    assert_eq!(c.buffered(), 200);
    assert_eq!(c.mode(), Mode::BatchReady);
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streaming_session_collects_matches_and_notifies_once() {
    let fake = Fake::default();
    let (mut c, notices) = configured(&fake).await;
    fake.on_start(vec![
        SessionEvent::Started,
        SessionEvent::Record(Record::new(1, 10, "a", "error one", "")),
        SessionEvent::Record(Record::new(1, 11, "b", "\u{fffd}", "").with_decode_error("invalid wire type")),
        SessionEvent::Record(Record::new(1, 12, "c", "\u{fffd}", "").with_decode_error("truncated message")),
        SessionEvent::Completed,
    ]);

    stream(&mut c, "error").await;
    assert_eq!(c.buffered(), 0);
    assert_eq!(fake.open_listeners(), 4);

    let updates = c.drain_events();
    assert_eq!(
        updates,
        [
            SessionUpdate::Started,
            SessionUpdate::Record,
            SessionUpdate::Record,
            SessionUpdate::Record,
            SessionUpdate::Completed,
        ]
    );
    assert_eq!(c.buffered(), 3);
    assert_eq!(c.mode(), Mode::BatchReady);
    assert_eq!(fake.open_listeners(), 0);

    let raised = notices.0.lock().unwrap().clone();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].message, "invalid wire type");
    assert_eq!(c.records()[2].decode_error.as_deref(), Some("truncated message"));

    let request = fake.0.requests.lock().unwrap()[0].clone();
    assert_eq!(request.limit, 200);
    assert_eq!(request.payload_filter.as_deref(), Some("error"));
}

#[tokio::test]
async fn next_event_waits_for_delivery() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    stream(&mut c, "x").await;

    let emitter = fake.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        emitter.emit(SessionEvent::Started);
        emitter.emit(SessionEvent::Record(Record::new(0, 1, "", "x", "")));
        emitter.emit(SessionEvent::Cancelled);
    });

    let mut seen = Vec::new();
    while let Some(update) = c.next_event().await {
        seen.push(update);
        if update.is_terminal() {
            break;
        }
    }
    assert_eq!(seen, [SessionUpdate::Started, SessionUpdate::Record, SessionUpdate::Cancelled]);
    assert_eq!(c.mode(), Mode::BatchReady);
    assert_eq!(c.next_event().await, None);
}

#[tokio::test]
async fn no_pulls_while_streaming() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.on_start(
        std::iter::once(SessionEvent::Started)
            .chain(records(0..20).into_iter().map(SessionEvent::Record))
            .collect(),
    );
    stream(&mut c, "payload").await;
    c.drain_events();
    assert_eq!(c.buffered(), 20);

    c.request_page(1).await.unwrap();
    assert!(matches!(c.pull_next_batch(10).await, Err(ControllerError::Streaming(_))));
    assert_eq!(fake.calls("pull"), 1);
}

#[tokio::test]
async fn subscriptions_precede_the_start_request() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.on_start(vec![SessionEvent::Started, SessionEvent::Record(Record::new(0, 0, "", "hit", ""))]);

    stream(&mut c, "hit").await;
    assert_eq!(c.drain_events(), [SessionUpdate::Started, SessionUpdate::Record]);
    assert_eq!(c.mode(), Mode::Streaming);
}

#[tokio::test]
async fn late_events_after_cancel_are_dropped() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.on_start(vec![SessionEvent::Started]);
    stream(&mut c, "x").await;

    c.cancel().await.unwrap();
    assert_eq!(c.mode(), Mode::BatchReady);
    assert_eq!(fake.open_listeners(), 0);

    assert!(!fake.emit(SessionEvent::Record(Record::new(0, 99, "", "x", ""))));
    assert!(!fake.emit(SessionEvent::Completed));
    assert!(c.drain_events().is_empty());
    assert_eq!(c.buffered(), 0);
}

#[tokio::test]
async fn cancel_rejected_by_backend_still_releases() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.fail("cancel");
    stream(&mut c, "x").await;

    c.cancel().await.unwrap();
    assert_eq!(fake.calls("cancel"), 1);
    assert_eq!(c.mode(), Mode::BatchReady);
    assert_eq!(fake.open_listeners(), 0);
    assert!(matches!(c.cancel().await, Err(ControllerError::NotStreaming)));
}

#[tokio::test]
async fn failed_start_releases_subscriptions() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    fake.fail("start");
    c.update_filter(FilterPatch::default().key_filter("k1"));

    let err = c.refresh().await.unwrap_err();
    assert!(matches!(err, ControllerError::Backend { op: "start streaming", .. }));
    assert_eq!(c.mode(), Mode::BatchReady);
    assert_eq!(fake.open_listeners(), 0);
}

#[tokio::test]
async fn each_session_raises_its_own_decode_notice() {
    let fake = Fake::default();
    let (mut c, notices) = configured(&fake).await;
    let failing = SessionEvent::Record(Record::new(0, 1, "", "?", "").with_decode_error("bad"));
    fake.on_start(vec![SessionEvent::Started, failing.clone(), failing, SessionEvent::Completed]);

    stream(&mut c, "x").await;
    c.drain_events();
    assert_eq!(notices.count(), 1);

    assert_eq!(c.refresh().await.unwrap(), RefreshOutcome::Streaming);
    c.drain_events();
    assert_eq!(notices.count(), 2);
}

#[tokio::test]
async fn refresh_while_streaming_replaces_the_session() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    stream(&mut c, "a").await;

    c.update_filter(FilterPatch::default().payload_filter("b"));
    assert_eq!(c.refresh().await.unwrap(), RefreshOutcome::Streaming);
    assert_eq!(fake.calls("cancel"), 1);
    assert_eq!(fake.open_listeners(), 4);

    c.update_filter(FilterPatch::default().clear_text_filters());
    fake.push_batch(records(0..2));
    assert_eq!(c.refresh().await.unwrap(), RefreshOutcome::Pulled(2));
    assert_eq!(fake.calls("cancel"), 2);
    assert_eq!(fake.open_listeners(), 0);
}

#[tokio::test]
async fn closed_event_stream_ends_the_session() {
    let fake = Fake::default();
    let (mut c, _) = configured(&fake).await;
    stream(&mut c, "x").await;

    fake.0.emitters.lock().unwrap().clear();
    assert_eq!(c.drain_events(), [SessionUpdate::Closed]);
    assert_eq!(c.mode(), Mode::BatchReady);
}

// ---------------------------------------------------------------------------
// In-memory backend end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_backend_browse_and_stream() {
    let backend = MemoryBackend::new();
    for i in 0..45 {
        let text = if i % 10 == 0 { format!("ERROR {i}") } else { format!("ok {i}") };
        backend.append("orders", i % 3, StoredMessage::new(format!("k{i}"), text, 1_000 + i as i64));
    }
    let backend = Arc::new(backend);
    let notices = Arc::new(Notices::default());
    let mut c = Controller::new(
        backend.clone(),
        backend.clone(),
        notices.clone(),
        ControllerSettings { page_size: 10, batch_limit: 20, stream_limit: 200 },
    );

    assert_eq!(c.configure(&orders()).await.unwrap(), 20);
    assert_eq!(c.partitions(), &[0, 1, 2]);
    c.request_page(2).await.unwrap();
    assert_eq!(c.buffered(), 40);
    assert_eq!(c.page(1).records[0].id, "0-0");
    assert_eq!(c.page(1).records[1].id, "1-0");

    c.update_filter(FilterPatch::default().payload_filter("error"));
    assert_eq!(c.refresh().await.unwrap(), RefreshOutcome::Streaming);
    loop {
        match c.next_event().await {
            Some(update) if update.is_terminal() => {
                assert_eq!(update, SessionUpdate::Completed);
                break;
            }
            Some(_) => {}
            None => panic!("session ended without terminal event"),
        }
    }
    assert_eq!(c.buffered(), 5);
    assert!(c.records().iter().all(|r| r.payload.starts_with("ERROR")));
    assert_eq!(backend.listener_count(), 0);
    assert_eq!(notices.count(), 0);
}
