//! Where blocking filesystem calls run.

use std::io;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Runs blocking closures off the async workers.
///
/// Unbounded by default; with a width, at most that many closures run at
/// once and the rest wait for a permit.
#[derive(Clone, Debug, Default)]
pub(crate) struct BlockingPool {
    permits: Option<Arc<Semaphore>>,
}

impl BlockingPool {
    pub(crate) fn new(width: Option<usize>) -> Self {
        Self {
            permits: width.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    pub(crate) async fn run<F, T>(&self, f: F) -> io::Result<T>
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(io::Error::other)?,
            ),
            None => None,
        };
        tokio::task::spawn_blocking(f)
            .await
            .map_err(io::Error::other)?
    }
}
