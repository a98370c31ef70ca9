//! The incremental-fetch watermark.

/// The id of the newest message already delivered to the sink.
///
/// Zero means nothing has been seen.  The cursor only moves forward:
/// [`Cursor::advance`] ignores candidates that are not strictly greater than
/// the current value, so a slow response that captured an older cursor can
/// never pull it back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    last_seen_id: u64,
}

impl Cursor {
    /// A cursor that has seen nothing.
    pub const fn new() -> Self {
        Self { last_seen_id: 0 }
    }

    /// The id of the newest delivered message.
    pub fn last_seen_id(&self) -> u64 {
        self.last_seen_id
    }

    /// Move to `candidate` if it is ahead.  Returns true if the cursor moved.
    pub fn advance(&mut self, candidate: u64) -> bool {
        if candidate > self.last_seen_id {
            self.last_seen_id = candidate;
            true
        } else {
            false
        }
    }

    /// Returns true if a message with this id has not been delivered yet.
    pub fn is_new(&self, id: u64) -> bool {
        id > self.last_seen_id
    }
}
