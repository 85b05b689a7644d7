use tokio::sync::mpsc::error::TryRecvError;

use lens_api::{BackendError, EventListener, SessionEvent, SessionEventKind, SessionEvents};

/// The four event subscriptions of one streaming session, held as a unit.
///
/// Acquired before the start request is sent and released together when
/// the group is dropped: on a terminal event, on cancel, or when starting
/// fails. A partially acquired group never escapes `acquire`.
#[derive(Debug)]
pub struct SubscriptionGroup {
    session: u64,
    started: EventListener,
    record: EventListener,
    completed: EventListener,
    cancelled: EventListener,
}

impl SubscriptionGroup {
    pub async fn acquire(events: &dyn SessionEvents, session: u64) -> Result<Self, BackendError> {
        let started = listen(events, SessionEventKind::Started).await?;
        let record = listen(events, SessionEventKind::Record).await?;
        let completed = listen(events, SessionEventKind::Completed).await?;
        let cancelled = listen(events, SessionEventKind::Cancelled).await?;
        tracing::debug!(session, "subscriptions acquired");
        Ok(Self {
            session,
            started,
            record,
            completed,
            cancelled,
        })
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Wait for the next event. Records queued ahead of a terminal event
    /// are always yielded first. `None` once every emitter is gone.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            Some(ev) = self.started.recv() => Some(ev),
            Some(ev) = self.record.recv() => Some(ev),
            Some(ev) = self.completed.recv() => Some(ev),
            Some(ev) = self.cancelled.recv() => Some(ev),
            else => None,
        }
    }

    /// Next already-delivered event, in the same priority as `next`.
    pub fn try_next(&mut self) -> Polled {
        let mut closed = 0;
        for listener in [
            &mut self.started,
            &mut self.record,
            &mut self.completed,
            &mut self.cancelled,
        ] {
            match listener.try_recv() {
                Ok(ev) => return Polled::Event(ev),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => closed += 1,
            }
        }
        if closed == 4 { Polled::Closed } else { Polled::Empty }
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        tracing::debug!(session = self.session, "subscriptions released");
    }
}

/// Outcome of a non-blocking poll.
#[derive(Debug, PartialEq, Eq)]
pub enum Polled {
    Event(SessionEvent),
    Empty,
    /// The backend dropped every emitter of this session.
    Closed,
}

async fn listen(events: &dyn SessionEvents, kind: SessionEventKind) -> Result<EventListener, BackendError> {
    events
        .listen(kind)
        .await
        .map_err(|e| e.with_context(format!("subscribe {kind}")))
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use lens_api::{EventEmitter, Record, listener_channel};

    use super::*;

    #[derive(Default)]
    struct Bus {
        emitters: Mutex<Vec<EventEmitter>>,
        fail_on: Option<SessionEventKind>,
    }

    impl Bus {
        fn emit(&self, event: SessionEvent) -> bool {
            let emitters = self.emitters.lock().unwrap();
            emitters
                .iter()
                .filter(|e| e.kind() == event.kind())
                .any(|e| e.emit(event.clone()))
        }

        fn open(&self) -> usize {
            self.emitters.lock().unwrap().iter().filter(|e| !e.is_closed()).count()
        }
    }

    impl SessionEvents for Bus {
        fn listen(
            &self,
            kind: SessionEventKind,
        ) -> Pin<Box<dyn Future<Output = Result<EventListener, BackendError>> + Send + '_>> {
            Box::pin(async move {
                if self.fail_on == Some(kind) {
                    return Err(BackendError::io("bridge down"));
                }
                let (tx, rx) = listener_channel(kind);
                self.emitters.lock().unwrap().push(tx);
                Ok(rx)
            })
        }
    }

    #[tokio::test]
    async fn records_queued_before_completion_come_first() {
        let bus = Bus::default();
        let mut group = SubscriptionGroup::acquire(&bus, 1).await.unwrap();
        assert_eq!(bus.open(), 4);

        assert!(bus.emit(SessionEvent::Completed));
        assert!(bus.emit(SessionEvent::Record(Record::new(0, 0, "", "a", ""))));
        assert!(bus.emit(SessionEvent::Started));

        assert_eq!(group.next().await, Some(SessionEvent::Started));
        assert!(matches!(group.next().await, Some(SessionEvent::Record(_))));
        assert_eq!(group.try_next(), Polled::Event(SessionEvent::Completed));
        assert_eq!(group.try_next(), Polled::Empty);
    }

    #[tokio::test]
    async fn drop_releases_all_subscriptions() {
        let bus = Bus::default();
        let group = SubscriptionGroup::acquire(&bus, 7).await.unwrap();
        drop(group);
        assert_eq!(bus.open(), 0);
        assert!(!bus.emit(SessionEvent::Started));
    }

    #[tokio::test]
    async fn failed_acquire_leaks_nothing() {
        let bus = Bus {
            fail_on: Some(SessionEventKind::Completed),
            ..Default::default()
        };
        let err = SubscriptionGroup::acquire(&bus, 2).await.unwrap_err();
        assert!(err.message().contains("subscribe session-completed"));
        assert_eq!(bus.open(), 0);
    }

    #[tokio::test]
    async fn closed_when_backend_drops_emitters() {
        let bus = Bus::default();
        let mut group = SubscriptionGroup::acquire(&bus, 3).await.unwrap();
        bus.emitters.lock().unwrap().clear();
        assert_eq!(group.try_next(), Polled::Closed);
        assert_eq!(group.next().await, None);
    }
}
