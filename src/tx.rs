// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

// A bee's ordered, dense transaction log.

use std::collections::VecDeque;

/// Lifecycle state of a single transaction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TxStatus {
    Open,
    Buffered,
    Committed,
}

/// A single replicated transaction. `seq` is dense (no gaps) per bee.
#[derive(Clone, Debug)]
pub struct Tx {
    pub seq: u64,
    pub payload: Vec<u8>,
    pub status: TxStatus,
}

impl Tx {
    pub fn new(seq: u64, payload: Vec<u8>) -> Self {
        Self {
            seq,
            payload,
            status: TxStatus::Open,
        }
    }
}

/// A bee's in-memory transaction buffer, ordered by `seq`.
///
/// Owned exclusively by the bee's own loop: never touched from outside
/// that task.
#[derive(Default)]
pub struct TxBuffer {
    entries: VecDeque<Tx>,
    next_seq: u64,
    last_committed: u64,
}

impl TxBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens and immediately buffers a new transaction at the next dense
    /// sequence number.
    pub fn append(&mut self, payload: Vec<u8>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(Tx {
            seq,
            payload,
            status: TxStatus::Buffered,
        });
        seq
    }

    /// Appends a `Tx` received from a peer during catch-up/forward push,
    /// preserving its `seq`. Transactions at or below `last_committed` are
    /// tagged `Committed` on arrival.
    pub fn append_foreign(&mut self, mut tx: Tx, last_committed: u64) {
        if tx.seq < self.next_seq {
            // Already have it (or past it); ignore rather than duplicate.
            return;
        }
        if tx.seq <= last_committed {
            tx.status = TxStatus::Committed;
        }
        self.next_seq = tx.seq + 1;
        self.entries.push_back(tx);
    }

    pub fn last_buffered(&self) -> u64 {
        self.next_seq.saturating_sub(1)
    }

    pub fn last_committed(&self) -> u64 {
        self.last_committed
    }

    /// Commits every buffered transaction up to and including `upto`.
    pub fn commit_up_to(&mut self, upto: u64) {
        for tx in self.entries.iter_mut() {
            if tx.seq <= upto && tx.status == TxStatus::Buffered {
                tx.status = TxStatus::Committed;
            }
        }
        self.last_committed = self.last_committed.max(upto.min(self.last_buffered()));
    }

    /// Returns every buffered transaction with `seq` in `from..=to`.
    pub fn range(&self, from: u64, to: u64) -> Vec<Tx> {
        self.entries
            .iter()
            .filter(|tx| tx.seq >= from && tx.seq <= to)
            .cloned()
            .collect()
    }

    /// Returns every transaction with `seq > from_exclusive`, in order.
    pub fn after(&self, from_exclusive: u64) -> Vec<Tx> {
        self.entries
            .iter()
            .filter(|tx| tx.seq > from_exclusive)
            .cloned()
            .collect()
    }

    /// Advances the local sequence counter without adding entries, used
    /// when a promoted master adopts the winning peer's `last_buffered` as
    /// its own next sequence number.
    pub fn advance_to(&mut self, seq: u64) {
        self.next_seq = self.next_seq.max(seq + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_dense_sequence_numbers() {
        let mut buf = TxBuffer::new();
        assert_eq!(buf.append(vec![1]), 0);
        assert_eq!(buf.append(vec![2]), 1);
        assert_eq!(buf.last_buffered(), 1);
        assert_eq!(buf.last_committed(), 0);
    }

    #[test]
    fn commit_up_to_is_monotonic_and_caps_at_last_buffered() {
        let mut buf = TxBuffer::new();
        buf.append(vec![1]);
        buf.append(vec![2]);
        buf.commit_up_to(5);
        assert_eq!(buf.last_committed(), 1);
        buf.commit_up_to(0);
        assert_eq!(buf.last_committed(), 1, "commit_up_to must never move backwards");
    }

    #[test]
    fn append_foreign_tags_committed_transactions_on_arrival() {
        let mut buf = TxBuffer::new();
        buf.append_foreign(Tx::new(0, vec![1]), 0);
        assert_eq!(buf.range(0, 0)[0].status, TxStatus::Committed);

        buf.append_foreign(Tx::new(1, vec![2]), 0);
        assert_eq!(buf.range(1, 1)[0].status, TxStatus::Open);
    }

    #[test]
    fn append_foreign_ignores_transactions_already_seen() {
        let mut buf = TxBuffer::new();
        buf.append(vec![1]);
        buf.append(vec![2]);
        buf.append_foreign(Tx::new(0, vec![99]), 0);
        assert_eq!(buf.range(0, 0)[0].payload, vec![1], "a lower seq must not overwrite an existing entry");
    }

    #[test]
    fn after_returns_only_strictly_greater_sequences() {
        let mut buf = TxBuffer::new();
        buf.append(vec![1]);
        buf.append(vec![2]);
        buf.append(vec![3]);
        let tail = buf.after(0);
        assert_eq!(tail.len(), 2);
        assert!(tail.iter().all(|tx| tx.seq > 0));
    }

    #[test]
    fn advance_to_never_moves_the_counter_backwards() {
        let mut buf = TxBuffer::new();
        buf.append(vec![1]);
        buf.advance_to(10);
        assert_eq!(buf.last_buffered(), 10);
        buf.advance_to(2);
        assert_eq!(buf.last_buffered(), 10);
    }
}
