use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use lens_api::{
    BackendError, CanonicalConfig, ConsumerBackend, EventEmitter, EventListener, FilterSpec, PartitionSelector,
    PayloadDecoding, PositionFilter, Record, SchemaMetadata, SchemaSource, SessionEvent,
    SessionEventKind, SessionEvents, StartPosition, StreamRequest, format_timestamp_ms,
    listener_channel,
};

/// How far back from the end of each partition a `Newest` read begins.
pub const NEWEST_WINDOW: usize = 2000;

// ═══════════════════════════════════════════════════════════════
//  StoredMessage
// ═══════════════════════════════════════════════════════════════

/// A message as held in a partition log. Its offset is its index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    #[serde(default)]
    pub key: String,
    pub payload: String,
    /// Broker timestamp in milliseconds.
    #[serde(default)]
    pub ts_ms: Option<i64>,
    /// Why the payload could not be decoded, when it could not.
    #[serde(default)]
    pub decode_error: Option<String>,
}

impl StoredMessage {
    pub fn new(key: impl Into<String>, payload: impl Into<String>, ts_ms: i64) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            ts_ms: Some(ts_ms),
            decode_error: None,
        }
    }

    pub fn with_decode_error(mut self, message: impl Into<String>) -> Self {
        self.decode_error = Some(message.into());
        self
    }

    fn to_record(&self, partition: i32, offset: usize) -> Record {
        let timestamp = self.ts_ms.map(format_timestamp_ms).unwrap_or_default();
        let record = Record::new(partition, offset as i64, &self.key, &self.payload, timestamp);
        match &self.decode_error {
            Some(e) => record.with_decode_error(e),
            None => record,
        }
    }
}

type PartitionLogs = BTreeMap<i32, Vec<StoredMessage>>;

// ═══════════════════════════════════════════════════════════════
//  Shared state
// ═══════════════════════════════════════════════════════════════

/// Consumption state of the configured topic: the remaining read order.
#[derive(Debug, Default)]
struct Cursor {
    topic: String,
    queue: VecDeque<(i32, usize)>,
}

/// Listeners of the current streaming generation.
#[derive(Debug, Default)]
struct Bus {
    generation: u64,
    emitters: Vec<EventEmitter>,
}

impl Bus {
    /// Deliver to live listeners of `kind`, pruning released ones.
    fn emit(&mut self, event: SessionEvent) -> usize {
        let kind = event.kind();
        self.emitters.retain(|e| !e.is_closed());
        self.emitters
            .iter()
            .filter(|e| e.kind() == kind)
            .filter(|e| e.emit(event.clone()))
            .count()
    }
}

#[derive(Debug, Default)]
struct Shared {
    topics: RwLock<BTreeMap<String, PartitionLogs>>,
    cursor: Mutex<Option<Cursor>>,
    bus: Mutex<Bus>,
    /// Parsed schema message types by cache key.
    schemas: Mutex<BTreeMap<String, Vec<String>>>,
    session: Mutex<Option<CancellationToken>>,
}

fn read<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(what, "read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(what, "write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(what, "mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl Shared {
    fn topic_logs(&self, topic: &str) -> Result<PartitionLogs, BackendError> {
        read(&self.topics, "topics")
            .get(topic)
            .cloned()
            .ok_or_else(|| BackendError::config(format!("topic '{topic}' not found")))
    }

    fn message(&self, topic: &str, partition: i32, offset: usize) -> Option<StoredMessage> {
        read(&self.topics, "topics")
            .get(topic)?
            .get(&partition)?
            .get(offset)
            .cloned()
    }

    /// Take the next `(partition, offset)` to read and its message.
    fn next_message(&self) -> Option<(i32, usize, StoredMessage)> {
        loop {
            let (topic, partition, offset) = {
                let mut cursor = lock(&self.cursor, "cursor");
                let cursor = cursor.as_mut()?;
                let (partition, offset) = cursor.queue.pop_front()?;
                (cursor.topic.clone(), partition, offset)
            };
            if let Some(message) = self.message(&topic, partition, offset) {
                return Some((partition, offset, message));
            }
        }
    }

    /// Emit only when `generation` is still the current session.
    fn emit(&self, generation: u64, event: SessionEvent) -> bool {
        let mut bus = lock(&self.bus, "event bus");
        if bus.generation != generation {
            return false;
        }
        bus.emit(event);
        true
    }
}

/// Read order for `filter` over `logs`.
///
/// `Newest` reads the last [`NEWEST_WINDOW`] offsets of each selected
/// partition, newest first, whatever the start offset. Otherwise `All`
/// reads every partition from its beginning and a single partition reads
/// from the start offset. Several partitions merge by timestamp (ties by
/// partition, then offset); messages without a timestamp sort last.
fn read_order(logs: &PartitionLogs, filter: &PositionFilter) -> VecDeque<(i32, usize)> {
    let selected: Vec<(i32, &Vec<StoredMessage>)> = match filter.partition {
        PartitionSelector::All => logs.iter().map(|(p, log)| (*p, log)).collect(),
        PartitionSelector::Partition(p) => logs.get(&p).map(|log| vec![(p, log)]).unwrap_or_default(),
    };

    let explicit_offset = match filter.partition {
        PartitionSelector::Partition(_) => filter.start_offset,
        PartitionSelector::All => None,
    };
    let newest = filter.start_position == StartPosition::Newest;

    let mut entries: Vec<(i64, i32, usize)> = Vec::new();
    for (partition, log) in &selected {
        let start = match (newest, explicit_offset) {
            (true, _) => log.len().saturating_sub(NEWEST_WINDOW),
            (false, Some(offset)) => usize::try_from(offset.max(0)).unwrap_or(usize::MAX).min(log.len()),
            (false, None) => 0,
        };
        entries.extend(
            log.iter()
                .enumerate()
                .skip(start)
                .map(|(offset, m)| (m.ts_ms.unwrap_or(i64::MAX), *partition, offset)),
        );
    }

    if selected.len() > 1 {
        entries.sort_unstable();
    }
    if newest {
        entries.reverse();
    }
    entries.into_iter().map(|(_, p, o)| (p, o)).collect()
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBackend
// ═══════════════════════════════════════════════════════════════

/// Consumption backend over topics held in memory.
///
/// Implements both the request/response operations and the session event
/// subscriptions. Streaming sessions run as spawned tokio tasks, so
/// `start_streaming` must be called from inside a runtime.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `topic` with `partitions` empty partitions (0-based ids).
    /// Existing partitions are kept.
    pub fn create_topic(&self, topic: &str, partitions: i32) {
        let mut topics = write(&self.shared.topics, "topics");
        let logs = topics.entry(topic.to_string()).or_default();
        for p in 0..partitions.max(1) {
            logs.entry(p).or_default();
        }
    }

    /// Append a message, creating the topic and partition as needed.
    /// Returns the message's offset.
    pub fn append(&self, topic: &str, partition: i32, message: StoredMessage) -> i64 {
        let mut topics = write(&self.shared.topics, "topics");
        let log = topics
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default();
        log.push(message);
        log.len() as i64 - 1
    }

    pub fn len(&self, topic: &str) -> usize {
        read(&self.shared.topics, "topics")
            .get(topic)
            .map(|logs| logs.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.shared.session, "session")
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Number of listeners still attached.
    pub fn listener_count(&self) -> usize {
        let mut bus = lock(&self.shared.bus, "event bus");
        bus.emitters.retain(|e| !e.is_closed());
        bus.emitters.len()
    }

    fn reposition(&self, filter: &PositionFilter) -> Result<usize, BackendError> {
        let topic = lock(&self.shared.cursor, "cursor")
            .as_ref()
            .map(|c| c.topic.clone())
            .ok_or_else(|| BackendError::new("backend not configured"))?;
        let logs = self.shared.topic_logs(&topic)?;
        if let PartitionSelector::Partition(p) = filter.partition {
            if !logs.contains_key(&p) {
                return Err(BackendError::config(format!("partition {p} not found in topic '{topic}'")));
            }
        }
        let queue = read_order(&logs, filter);
        let pending = queue.len();
        *lock(&self.shared.cursor, "cursor") = Some(Cursor { topic, queue });
        Ok(pending)
    }

    fn check_decoding(&self, decoding: &PayloadDecoding) -> Result<(), BackendError> {
        let PayloadDecoding::Structured { message_type, schema } = decoding else {
            return Ok(());
        };
        let known = match schema {
            SchemaSource::Cached(key) => lock(&self.shared.schemas, "schemas")
                .get(key)
                .cloned()
                .ok_or_else(|| BackendError::config(format!("no cached descriptors under '{key}'")))?,
            SchemaSource::Files(files) => self.register_schema(files)?.message_types,
        };
        if !known.iter().any(|t| t == message_type) {
            return Err(BackendError::config(format!("message type '{message_type}' not found in schema")));
        }
        Ok(())
    }

    fn register_schema(&self, files: &[String]) -> Result<SchemaMetadata, BackendError> {
        let mut message_types = Vec::new();
        for file in files {
            let source = std::fs::read_to_string(file)
                .map_err(|e| BackendError::from(e).with_context(format!("read schema '{file}'")))?;
            message_types.extend(scan_message_types(&source));
        }
        if message_types.is_empty() {
            return Err(BackendError::format_err("no message types found in schema files"));
        }
        message_types.sort();
        message_types.dedup();

        let mut schemas = lock(&self.shared.schemas, "schemas");
        let cache_key = format!("schema-{}", schemas.len() + 1);
        schemas.insert(cache_key.clone(), message_types.clone());
        Ok(SchemaMetadata { message_types, cache_key })
    }

    fn stop_session(&self) -> bool {
        match lock(&self.shared.session, "session").take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Fully qualified top-level message names declared in a proto source.
fn scan_message_types(source: &str) -> Vec<String> {
    let mut package = String::new();
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut tokens = source
        .split(|c: char| c.is_whitespace() || c == ';')
        .flat_map(|t| split_braces(t))
        .filter(|t| !t.is_empty());
    while let Some(token) = tokens.next() {
        match token {
            "{" => depth += 1,
            "}" => depth = depth.saturating_sub(1),
            "package" if depth == 0 => {
                if let Some(name) = tokens.next() {
                    package = name.to_string();
                }
            }
            "message" if depth == 0 => {
                if let Some(name) = tokens.next().filter(|n| *n != "{") {
                    names.push(if package.is_empty() {
                        name.to_string()
                    } else {
                        format!("{package}.{name}")
                    });
                }
            }
            _ => {}
        }
    }
    names
}

fn split_braces(token: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in token.char_indices() {
        if c == '{' || c == '}' {
            parts.push(&token[start..i]);
            parts.push(&token[i..i + 1]);
            start = i + 1;
        }
    }
    parts.push(&token[start..]);
    parts
}

async fn run_session(shared: Arc<Shared>, generation: u64, request: StreamRequest, token: CancellationToken) {
    let filter = request.text_filter();
    let mut matched = 0usize;
    let mut scanned = 0usize;
    loop {
        if token.is_cancelled() {
            shared.emit(generation, SessionEvent::Cancelled);
            tracing::debug!(generation, matched, scanned, "memory streaming cancelled");
            return;
        }
        let Some((partition, offset, message)) = shared.next_message() else {
            break;
        };
        scanned += 1;
        if filter.matches(&message.key, &message.payload) {
            if !shared.emit(generation, SessionEvent::Record(message.to_record(partition, offset))) {
                tracing::debug!(generation, "memory streaming superseded");
                return;
            }
            matched += 1;
            if matched >= request.limit {
                break;
            }
        }
        tokio::task::yield_now().await;
    }

    {
        let mut session = lock(&shared.session, "session");
        if session.as_ref().is_some_and(|t| !t.is_cancelled()) && lock(&shared.bus, "event bus").generation == generation {
            *session = None;
        }
    }
    shared.emit(generation, SessionEvent::Completed);
    tracing::debug!(generation, matched, scanned, "memory streaming completed");
}

impl ConsumerBackend for MemoryBackend {
    fn configure(
        &self,
        config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        let config = config.clone();
        Box::pin(async move {
            let logs = self.shared.topic_logs(&config.topic)?;
            self.check_decoding(&config.decoding)?;
            self.stop_session();
            let queue = read_order(&logs, &PositionFilter::from(&FilterSpec::default()));
            *lock(&self.shared.cursor, "cursor") = Some(Cursor {
                topic: config.topic.clone(),
                queue,
            });
            tracing::debug!(topic = %config.topic, "memory backend configured");
            Ok(())
        })
    }

    fn discover_partitions(
        &self,
        config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<i32>, BackendError>> + Send + '_>> {
        let topic = config.topic.clone();
        Box::pin(async move { Ok(self.shared.topic_logs(&topic)?.keys().copied().collect()) })
    }

    fn discover_topics(
        &self,
        _config: &CanonicalConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BackendError>> + Send + '_>> {
        Box::pin(async move { Ok(read(&self.shared.topics, "topics").keys().cloned().collect()) })
    }

    fn pull_batch(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            if lock(&self.shared.cursor, "cursor").is_none() {
                return Err(BackendError::new("backend not configured"));
            }
            let mut records = Vec::with_capacity(limit.min(1024));
            while records.len() < limit {
                let Some((partition, offset, message)) = self.shared.next_message() else {
                    break;
                };
                records.push(message.to_record(partition, offset));
            }
            Ok(records)
        })
    }

    fn apply_filter(
        &self,
        filter: PositionFilter,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move {
            let pending = self.reposition(&filter)?;
            tracing::debug!(partition = %filter.partition, pending, "memory backend repositioned");
            Ok(())
        })
    }

    fn start_streaming(
        &self,
        request: StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move {
            if lock(&self.shared.cursor, "cursor").is_none() {
                return Err(BackendError::new("backend not configured"));
            }
            if request.limit == 0 {
                return Err(BackendError::config("stream limit must be positive"));
            }
            self.stop_session();

            let token = CancellationToken::new();
            let generation = {
                let mut bus = lock(&self.shared.bus, "event bus");
                bus.generation += 1;
                bus.emit(SessionEvent::Started);
                bus.generation
            };
            *lock(&self.shared.session, "session") = Some(token.clone());
            tokio::spawn(run_session(self.shared.clone(), generation, request, token));
            Ok(())
        })
    }

    fn cancel_streaming(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move {
            if !self.stop_session() {
                tracing::debug!("cancel requested with no running session");
            }
            Ok(())
        })
    }

    fn parse_schema_metadata(
        &self,
        files: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<SchemaMetadata, BackendError>> + Send + '_>> {
        let files = files.to_vec();
        Box::pin(async move { self.register_schema(&files) })
    }
}

impl SessionEvents for MemoryBackend {
    fn listen(
        &self,
        kind: SessionEventKind,
    ) -> Pin<Box<dyn Future<Output = Result<EventListener, BackendError>> + Send + '_>> {
        Box::pin(async move {
            let (tx, rx) = listener_channel(kind);
            let mut bus = lock(&self.shared.bus, "event bus");
            bus.emitters.retain(|e| !e.is_closed());
            bus.emitters.push(tx);
            Ok(rx)
        })
    }
}
