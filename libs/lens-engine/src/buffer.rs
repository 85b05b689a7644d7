use lens_api::Record;

/// Append-only ordered store of every record consumed under the current
/// configuration. The presentation layer only ever sees page snapshots.
#[derive(Debug)]
pub struct MessageBuffer {
    records: Vec<Record>,
    /// 1-based page cursor of the presentation layer.
    cursor: usize,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            cursor: 1,
        }
    }

    /// Append records in arrival order.
    pub fn append(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Records `[(page - 1) * size, page * size)`, clamped to the buffer.
    /// Empty past the end, for page 0, or for a zero page size.
    pub fn page(&self, page: usize, size: usize) -> &[Record] {
        if page == 0 || size == 0 {
            return &[];
        }
        let start = (page - 1).saturating_mul(size);
        if start >= self.records.len() {
            return &[];
        }
        let end = start.saturating_add(size).min(self.records.len());
        &self.records[start..end]
    }

    /// Number of pages needed to show every record.
    pub fn page_count(&self, size: usize) -> usize {
        if size == 0 {
            return 0;
        }
        self.records.len().div_ceil(size)
    }

    /// True when the last page holds exactly `size` records.
    pub fn last_page_full(&self, size: usize) -> bool {
        size > 0 && !self.records.is_empty() && self.records.len() % size == 0
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.cursor = 1;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, page: usize) {
        self.cursor = page.max(1);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}
