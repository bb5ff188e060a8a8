//! Batch execution utilities for parallel fan-out

use futures::{stream::FuturesUnordered, Future, StreamExt};
use tokio::sync::Semaphore;

/// Context provided to each task in a batch
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    /// Task number (1-indexed for display)
    pub task_number: usize,
    /// Total number of tasks in this batch
    pub total_tasks: usize,
}

/// Outcome of a batch: one `Result` per input, in input order
#[derive(Debug)]
pub struct BatchReport<R, E> {
    pub outcomes: Vec<Result<R, E>>,
}

impl<R, E> BatchReport<R, E> {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn into_outcomes(self) -> Vec<Result<R, E>> {
        self.outcomes
    }
}

/// Execute items concurrently with at most `limit` in flight
///
/// # Arguments
/// - `items`: Items to process
/// - `limit`: Maximum concurrent tasks (values below 1 are treated as 1)
/// - `task_executor`: Function that processes each item, receives (item, context)
///
/// # Returns
/// A [`BatchReport`] whose outcomes line up with `items`
///
/// # Error Handling
/// Never fails fast: every item runs and its error is kept in its slot
///
/// # Example
/// ```rust,ignore
/// let report = execute_batch(tasks, 4, |task, ctx| async move {
///     investigate(task, ctx).await
/// })
/// .await;
/// println!("{} ok, {} failed", report.succeeded(), report.failed());
/// ```
pub async fn execute_batch<T, F, Fut, R, E>(
    items: Vec<T>,
    limit: usize,
    task_executor: F,
) -> BatchReport<R, E>
where
    F: Fn(T, TaskContext) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let total = items.len();
    let sem = Semaphore::new(limit.max(1));
    let sem = &sem;
    let executor = &task_executor;
    let mut tasks = FuturesUnordered::new();

    for (idx, item) in items.into_iter().enumerate() {
        let ctx = TaskContext {
            task_number: idx + 1,
            total_tasks: total,
        };

        tasks.push(async move {
            // The semaphore lives for the whole call and is never closed
            let _permit = sem.acquire().await.ok();
            (idx, executor(item, ctx).await)
        });
    }

    let mut slots: Vec<Option<Result<R, E>>> = (0..total).map(|_| None).collect();
    while let Some((idx, result)) = tasks.next().await {
        slots[idx] = Some(result);
    }

    BatchReport {
        outcomes: slots.into_iter().flatten().collect(),
    }
}
