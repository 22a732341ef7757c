//! Bounded, sequence-indexed collection of in-flight messages.
//!
//! The data channel keeps two of these while the session handshake is in
//! progress: one holding outbound messages awaiting acknowledgement (swept
//! by the retransmission task) and one reordering inbound messages that
//! arrived ahead of the expected sequence number.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::protocol::AgentMessage;

/// A bounded buffer of messages keyed by sequence number.
///
/// All operations are internally synchronized so the retransmission sweeper
/// and the reader loop can share one buffer without extra coordination.
pub struct MessageBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    entries: BTreeMap<i64, AgentMessage>,
    /// Sequence number last returned by [`MessageBuffer::next`]; cleared when
    /// the cursor passes the tail. Removals do not reset it, which gives the
    /// sweeper an approximate round-robin over surviving messages.
    cursor: Option<i64>,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                cursor: None,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a message, keyed by its sequence number.
    ///
    /// Returns [`Error::BufferFull`] at capacity; the message is dropped, not
    /// queued. Capacity is a back-pressure signal, not a correctness
    /// invariant.
    pub fn add(&self, msg: AgentMessage) -> Result<()> {
        let mut inner = self.lock();
        if inner.entries.len() == self.capacity {
            return Err(Error::BufferFull);
        }
        inner.entries.insert(msg.sequence_number, msg);
        Ok(())
    }

    /// Remove the message with the given sequence number; no-op when absent.
    pub fn remove(&self, sequence_number: i64) {
        self.lock().entries.remove(&sequence_number);
    }

    /// Look up a message by sequence number.
    pub fn get(&self, sequence_number: i64) -> Option<AgentMessage> {
        self.lock().entries.get(&sequence_number).cloned()
    }

    /// Advance the sticky cursor and return the message it lands on, or
    /// `None` once the cursor has passed the tail (which also rewinds it for
    /// the next sweep).
    pub fn next(&self) -> Option<AgentMessage> {
        let mut inner = self.lock();
        let from = inner.cursor;
        let found = match from {
            None => inner
                .entries
                .iter()
                .next()
                .map(|(seq, msg)| (*seq, msg.clone())),
            Some(cursor) => inner
                .entries
                .range(cursor + 1..)
                .next()
                .map(|(seq, msg)| (*seq, msg.clone())),
        };
        match found {
            Some((seq, msg)) => {
                inner.cursor = Some(seq);
                Some(msg)
            }
            None => {
                inner.cursor = None;
                None
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;

    fn msg(seq: i64) -> AgentMessage {
        let mut m = AgentMessage::new(MessageType::InputStreamData);
        m.sequence_number = seq;
        m
    }

    #[test]
    fn add_then_get() {
        let buf = MessageBuffer::new(10);
        buf.add(msg(3)).unwrap();
        buf.add(msg(5)).unwrap();

        assert_eq!(buf.len(), 2);
        assert_eq!(buf.get(3).map(|m| m.sequence_number), Some(3));
        assert_eq!(buf.get(5).map(|m| m.sequence_number), Some(5));
        assert!(buf.get(4).is_none());
    }

    #[test]
    fn capacity_overflow_fails_and_preserves_entries() {
        let buf = MessageBuffer::new(3);
        for seq in 0..3 {
            buf.add(msg(seq)).unwrap();
        }

        let err = buf.add(msg(3)).unwrap_err();
        assert!(matches!(err, Error::BufferFull));

        // earlier entries are untouched
        assert_eq!(buf.len(), 3);
        for seq in 0..3 {
            assert!(buf.get(seq).is_some());
        }
        assert!(buf.get(3).is_none());
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let buf = MessageBuffer::new(4);
        buf.add(msg(1)).unwrap();
        buf.remove(9);
        assert_eq!(buf.len(), 1);
        buf.remove(1);
        assert!(buf.is_empty());
    }

    #[test]
    fn remove_frees_capacity() {
        let buf = MessageBuffer::new(1);
        buf.add(msg(0)).unwrap();
        assert!(buf.add(msg(1)).is_err());
        buf.remove(0);
        buf.add(msg(1)).unwrap();
    }

    #[test]
    fn cursor_visits_every_entry_then_rewinds() {
        let buf = MessageBuffer::new(10);
        for seq in [2, 7, 4] {
            buf.add(msg(seq)).unwrap();
        }

        let mut seen: Vec<i64> = Vec::new();
        while let Some(m) = buf.next() {
            seen.push(m.sequence_number);
        }
        assert_eq!(seen, vec![2, 4, 7]);

        // exhausted cursor rewinds; the next sweep starts over
        assert_eq!(buf.next().map(|m| m.sequence_number), Some(2));
    }

    #[test]
    fn cursor_survives_removal_of_the_current_entry() {
        let buf = MessageBuffer::new(10);
        for seq in 0..4 {
            buf.add(msg(seq)).unwrap();
        }

        assert_eq!(buf.next().map(|m| m.sequence_number), Some(0));
        assert_eq!(buf.next().map(|m| m.sequence_number), Some(1));
        buf.remove(1);

        // removal does not rewind the sweep
        assert_eq!(buf.next().map(|m| m.sequence_number), Some(2));
        assert_eq!(buf.next().map(|m| m.sequence_number), Some(3));
        assert!(buf.next().is_none());
    }

    #[test]
    fn empty_buffer_next_is_none() {
        let buf = MessageBuffer::new(2);
        assert!(buf.next().is_none());
        assert!(buf.next().is_none());
    }
}
