//! Bounded-concurrency fan-out over a list of items.
//!
//! Generic utility with no awareness of the layers above or below it; the
//! orchestrator exercises it with "transfer one collection" as the unit of
//! work.

use crate::error::{Result, SyncError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Results and per-item errors from one bounded run. The run always
/// processes every item; a failure never cancels siblings.
#[derive(Debug)]
pub struct ExecutorOutput<T> {
    /// Successful results in completion order (not submission order).
    pub results: Vec<T>,
    /// One entry per failed item.
    pub errors: Vec<SyncError>,
}

/// Run `worker` over `items` with at most `concurrency` invocations in
/// flight. Worker panics are caught and converted to errors. Concurrency 1
/// degenerates to strictly sequential, in-order execution; concurrency
/// beyond `items.len()` is harmless.
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    worker: F,
) -> ExecutorOutput<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for item in items {
        // Acquiring before spawning bounds in-flight work and, with a
        // single permit, forces sequential submission order.
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("executor semaphore closed");
        let fut = worker(item);
        tasks.spawn(async move {
            let _permit = permit;
            fut.await
        });
    }

    let mut output = ExecutorOutput {
        results: Vec::new(),
        errors: Vec::new(),
    };

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(value)) => output.results.push(value),
            Ok(Err(err)) => output.errors.push(err),
            Err(join_err) => output.errors.push(SyncError::TaskPanic(join_err.to_string())),
        }
    }

    output
}
