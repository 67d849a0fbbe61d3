//! Free-space backpressure for writes.
//!
//! When a storage has a `limit_free_space` floor, a write that would leave
//! less than the floor free does not fail: it waits in a FIFO queue. Every
//! completed write or delete wakes the head of the queue, which measures
//! again and either proceeds or goes back to the head.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::Disks;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::pool::BlockingPool;

/// Measures the space available to a directory.
///
/// Called from a blocking thread.
pub trait SpaceProbe: Send + Sync {
    fn available(&self, path: &Path) -> io::Result<u64>;
}

/// Available space on the mounted disk holding a path, as reported by the
/// operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSpace;

impl SpaceProbe for DiskSpace {
    fn available(&self, path: &Path) -> io::Result<u64> {
        let path = nearest_existing(path).canonicalize()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no mounted disk holds {}", path.display()),
                )
            })
    }
}

// The root may not exist yet; measure the directory it will be created in.
fn nearest_existing(path: &Path) -> &Path {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or(Path::new("."))
}

struct Waiter {
    id: u64,
    wake: oneshot::Sender<()>,
}

/// The free-space floor and its waiter queue, shared by a storage and all
/// of its nested views.
pub(crate) struct Quota {
    limit: Option<u64>,
    probe: Arc<dyn SpaceProbe>,
    waiters: Mutex<VecDeque<Waiter>>,
    // Bumped under the waiters lock by every wake, so a writer can tell
    // whether space was released while it was measuring.
    epoch: AtomicU64,
    next_id: AtomicU64,
}

impl Quota {
    pub(crate) fn new(limit: Option<u64>, probe: Arc<dyn SpaceProbe>) -> Self {
        Self {
            limit,
            probe,
            waiters: Mutex::new(VecDeque::new()),
            epoch: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiters.lock().len()
    }

    pub(crate) async fn available(&self, root: &Path, pool: &BlockingPool) -> io::Result<u64> {
        let probe = self.probe.clone();
        let root = root.to_path_buf();
        pool.run(move || probe.available(&root)).await
    }

    /// Wait until writing `size` more bytes keeps the floor.
    ///
    /// Returns at once when no floor is configured. Dropping the future
    /// leaves the queue consistent: a queued writer is removed, and a writer
    /// that was already woken passes the wake on.
    pub(crate) async fn admit(&self, root: &Path, size: u64, pool: &BlockingPool) -> io::Result<()> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let mut ticket = Ticket {
            quota: self,
            state: TicketState::Idle,
        };
        loop {
            let seen = self.epoch.load(Ordering::Acquire);
            let free = self.available(root, pool).await?;
            if free.saturating_sub(size) >= limit {
                ticket.state = TicketState::Idle;
                return Ok(());
            }

            let (tx, rx) = oneshot::channel();
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            {
                let mut waiters = self.waiters.lock();
                if self.epoch.load(Ordering::Acquire) != seen {
                    continue;
                }
                let waiter = Waiter { id, wake: tx };
                // A writer that was already woken keeps its place.
                if ticket.state == TicketState::Woken {
                    waiters.push_front(waiter);
                } else {
                    waiters.push_back(waiter);
                }
                ticket.state = TicketState::Queued(id);
            }
            warn!(free, limit, size, waiter = id, "waiting for free space");
            let _ = rx.await;
            ticket.state = TicketState::Woken;
        }
    }

    /// Let the head of the queue measure again.
    pub(crate) fn wake_next(&self) {
        let mut waiters = self.waiters.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        while let Some(waiter) = waiters.pop_front() {
            if waiter.wake.send(()).is_ok() {
                return;
            }
            debug!(waiter = waiter.id, "skipping cancelled quota waiter");
        }
    }
}

impl fmt::Debug for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quota")
            .field("limit", &self.limit)
            .field("waiting", &self.waiting())
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TicketState {
    Idle,
    Queued(u64),
    Woken,
}

struct Ticket<'a> {
    quota: &'a Quota,
    state: TicketState,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        match self.state {
            TicketState::Idle => {}
            TicketState::Queued(id) => {
                let mut waiters = self.quota.waiters.lock();
                let before = waiters.len();
                waiters.retain(|w| w.id != id);
                if waiters.len() == before {
                    // Popped and signalled between our last poll and now.
                    drop(waiters);
                    self.quota.wake_next();
                }
            }
            TicketState::Woken => self.quota.wake_next(),
        }
    }
}
