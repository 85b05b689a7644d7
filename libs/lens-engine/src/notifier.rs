use lens_api::{Notice, NoticeLevel, Notifier, Record};

/// Surfaces the first decode failure of a consumption session and stays
/// silent for the rest of it. Every failure remains visible on its record.
#[derive(Debug, Default)]
pub struct DecodeErrorNotifier {
    notified: bool,
}

impl DecodeErrorNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called at the start of every consumption session.
    pub fn reset(&mut self) {
        self.notified = false;
    }

    pub fn has_notified(&self) -> bool {
        self.notified
    }

    /// Returns the notice to raise for `record`, at most once per session.
    pub fn consider(&mut self, record: &Record) -> Option<Notice> {
        if self.notified {
            return None;
        }
        let message = record.decode_error.as_ref()?;
        self.notified = true;
        Some(Notice::warning(message.clone()))
    }
}

/// Notifier that writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Warning => tracing::warn!(notice = %notice.message, "notice"),
            NoticeLevel::Error => tracing::error!(notice = %notice.message, "notice"),
        }
    }
}
