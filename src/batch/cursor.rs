use crate::imap::Uid;

/// Default number of UIDs per structure fetch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Cursor over a UID list yielding consecutive chunks of at most `size`.
///
/// Every UID is yielded exactly once, in input order; the last chunk holds
/// the remainder.
#[derive(Debug, Clone)]
pub struct UidBatches<'a> {
    remaining: &'a [Uid],
    size: usize,
}

impl<'a> UidBatches<'a> {
    /// A zero `size` is treated as 1.
    pub fn new(uids: &'a [Uid], size: usize) -> Self {
        Self {
            remaining: uids,
            size: size.max(1),
        }
    }

    /// UIDs not yet yielded.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

impl<'a> Iterator for UidBatches<'a> {
    type Item = &'a [Uid];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.size.min(self.remaining.len());
        let (batch, rest) = self.remaining.split_at(take);
        self.remaining = rest;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.len().div_ceil(self.size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for UidBatches<'_> {}
