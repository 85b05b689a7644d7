use tokio::sync::mpsc;

use crate::record::Record;

/// Event classes pushed by the backend during a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Started,
    Record,
    Completed,
    Cancelled,
}

impl SessionEventKind {
    pub const ALL: [SessionEventKind; 4] = [
        SessionEventKind::Started,
        SessionEventKind::Record,
        SessionEventKind::Completed,
        SessionEventKind::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::Started => "session-started",
            SessionEventKind::Record => "record-received",
            SessionEventKind::Completed => "session-completed",
            SessionEventKind::Cancelled => "session-cancelled",
        }
    }
}

impl std::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    Record(Record),
    /// Terminal.
    Completed,
    /// Terminal.
    Cancelled,
}

impl SessionEvent {
    pub fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::Started => SessionEventKind::Started,
            SessionEvent::Record(_) => SessionEventKind::Record,
            SessionEvent::Completed => SessionEventKind::Completed,
            SessionEvent::Cancelled => SessionEventKind::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Completed | SessionEvent::Cancelled)
    }
}

/// Create a connected emitter/listener pair for one event class.
pub fn listener_channel(kind: SessionEventKind) -> (EventEmitter, EventListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventEmitter { kind, tx }, EventListener { kind, rx })
}

/// Backend side of a subscription.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    kind: SessionEventKind,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventEmitter {
    pub fn kind(&self) -> SessionEventKind {
        self.kind
    }

    /// Deliver an event. Returns false once the listener has been released.
    pub fn emit(&self, event: SessionEvent) -> bool {
        debug_assert_eq!(event.kind(), self.kind);
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Controller side of a subscription. Dropping it releases the
/// subscription; later emits on the paired emitter are discarded.
#[derive(Debug)]
pub struct EventListener {
    kind: SessionEventKind,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventListener {
    pub fn kind(&self) -> SessionEventKind {
        self.kind
    }

    /// Next event. `None` once the backend dropped its emitter.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Next already-delivered event, without waiting.
    pub fn try_recv(&mut self) -> Result<SessionEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_listener_closes_emitter() {
        let (tx, rx) = listener_channel(SessionEventKind::Started);
        assert!(!tx.is_closed());
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.emit(SessionEvent::Started));
    }
}
