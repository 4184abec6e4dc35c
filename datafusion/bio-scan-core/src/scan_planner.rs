use std::sync::atomic::{AtomicUsize, Ordering};

/// Upper bound on the number of workers an indexed parallel scan may use.
pub const MAX_SCAN_WORKERS: usize = 16;

/// Decides the degree of parallelism for a scan.
///
/// A scan runs with more than one worker only when an index is available,
/// the file declares more than one contig, and no explicit region restricts
/// the query. The worker count is capped at [`MAX_SCAN_WORKERS`].
pub fn decide_worker_count(has_index: bool, contig_count: usize, has_regions: bool) -> usize {
    if has_index && contig_count > 1 && !has_regions {
        contig_count.min(MAX_SCAN_WORKERS)
    } else {
        1
    }
}

/// Hands out contig indices to scan workers, each exactly once.
///
/// One queue is created per query and shared (behind an `Arc`) by every
/// worker thread. Claims go through a single atomic fetch-and-increment, so
/// no index is ever issued twice and none is skipped, regardless of how the
/// claimants interleave.
#[derive(Debug)]
pub struct ContigQueue {
    contigs: Vec<String>,
    next: AtomicUsize,
}

impl ContigQueue {
    /// Creates a queue over the given contig names, in header order.
    pub fn new(contigs: Vec<String>) -> Self {
        Self {
            contigs,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of contigs managed by this queue.
    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    /// Returns `true` when the queue manages no contigs at all.
    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Claims the next unscanned contig.
    ///
    /// Returns the contig's index and name, or `None` once every contig has
    /// been handed out. Callers loop on this until exhaustion; a claimed
    /// contig with no overlapping records simply yields no rows and the
    /// caller claims again.
    pub fn claim(&self) -> Option<(usize, &str)> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        self.contigs.get(idx).map(|name| (idx, name.as_str()))
    }
}
