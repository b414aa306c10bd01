// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Racing a test action against its deadline.
//!
//! The action runs as an independent task so that cancelling it never
//! affects sibling tests. Cancellation comes in two flavors with very
//! different handling: the guard's own deadline abort is swallowed here,
//! while an externally-originated interrupt is surfaced as
//! [`DeadlineResult::Interrupted`] so the caller can wind the run down
//! without fabricating a result.

use crate::schedule::Deadline;
use futures::future::BoxFuture;
use std::any::Any;
use tokio::task::{JoinError, JoinHandle};

/// The outcome of racing an action against its deadline.
#[derive(Debug)]
pub(crate) enum DeadlineResult {
    /// The action ran to completion before the deadline.
    Completed,
    /// The action panicked before the deadline.
    Panicked(Box<dyn Any + Send + 'static>),
    /// The deadline fired first; the action was cancelled.
    TimedOut,
    /// An external interrupt arrived; the action was cancelled and the
    /// interrupt must be propagated, not converted into a result.
    Interrupted,
}

/// Runs `make_action`'s future under `deadline`, racing it against both the
/// deadline timer and `interrupt`.
///
/// With [`Deadline::Unbounded`] the action runs untimed. With a zero budget
/// the action is never started. Otherwise whichever of the action, the
/// timer and the interrupt completes first decides the result; once the
/// action has won, the timer's eventual firing is a no-op.
pub(crate) async fn run_with_deadline<I>(
    deadline: Deadline,
    interrupt: I,
    make_action: impl FnOnce() -> BoxFuture<'static, ()>,
) -> DeadlineResult
where
    I: Future<Output = ()>,
{
    if let Deadline::After(limit) = deadline {
        if limit.is_zero() {
            return DeadlineResult::TimedOut;
        }
    }

    let mut handle = tokio::spawn(make_action());
    let mut interrupt = std::pin::pin!(interrupt);

    match deadline {
        Deadline::Unbounded => {
            tokio::select! {
                result = &mut handle => finished(result),
                () = &mut interrupt => cancel(handle, DeadlineResult::Interrupted).await,
            }
        }
        Deadline::After(limit) => {
            let mut sleep = std::pin::pin!(tokio::time::sleep(limit));
            tokio::select! {
                result = &mut handle => finished(result),
                () = &mut sleep => cancel(handle, DeadlineResult::TimedOut).await,
                () = &mut interrupt => cancel(handle, DeadlineResult::Interrupted).await,
            }
        }
    }
}

fn finished(result: Result<(), JoinError>) -> DeadlineResult {
    match result {
        Ok(()) => DeadlineResult::Completed,
        Err(error) => match error.try_into_panic() {
            Ok(payload) => DeadlineResult::Panicked(payload),
            // This function never aborts the action itself; a cancellation
            // seen here means the whole runtime is shutting down.
            Err(_) => DeadlineResult::Interrupted,
        },
    }
}

/// Cancels the losing action and waits for it to wind down. The join error
/// observed here is the cancellation this function just issued, so it is
/// swallowed; a completion or panic that raced the cancellation lost the
/// race and is dropped with it.
async fn cancel(handle: JoinHandle<()>, outcome: DeadlineResult) -> DeadlineResult {
    handle.abort();
    let _ = handle.await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::{
        future::pending,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::{Duration, Instant},
    };

    #[tokio::test]
    async fn negative_millis_never_times_out() {
        let result = run_with_deadline(Deadline::from_millis(-1), pending(), || {
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            .boxed()
        })
        .await;
        assert!(matches!(result, DeadlineResult::Completed), "{result:?}");
    }

    #[tokio::test]
    async fn zero_millis_times_out_without_starting_the_action() {
        let started = Arc::new(AtomicBool::new(false));
        let started_ref = started.clone();
        let result = run_with_deadline(Deadline::from_millis(0), pending(), move || {
            async move {
                started_ref.store(true, Ordering::SeqCst);
            }
            .boxed()
        })
        .await;
        assert!(matches!(result, DeadlineResult::TimedOut), "{result:?}");
        assert!(!started.load(Ordering::SeqCst), "action must never start");
    }

    #[tokio::test]
    async fn deadline_cancels_a_slow_action() {
        let before = Instant::now();
        let result = run_with_deadline(Deadline::from_millis(50), pending(), || {
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            .boxed()
        })
        .await;
        assert!(matches!(result, DeadlineResult::TimedOut), "{result:?}");
        assert!(
            before.elapsed() < Duration::from_millis(400),
            "the sleep must not run to completion"
        );
    }

    #[tokio::test]
    async fn fast_action_beats_the_deadline() {
        let result = run_with_deadline(Deadline::from_millis(500), pending(), || {
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            .boxed()
        })
        .await;
        assert!(matches!(result, DeadlineResult::Completed), "{result:?}");
    }

    #[tokio::test]
    async fn action_panic_propagates() {
        let result = run_with_deadline(Deadline::Unbounded, pending(), || {
            async {
                panic!("boom");
            }
            .boxed()
        })
        .await;
        match result {
            DeadlineResult::Panicked(payload) => {
                assert_eq!(*payload.downcast::<&str>().unwrap(), "boom");
            }
            other => panic!("expected panic propagation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn external_interrupt_is_reraised() {
        let interrupt = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        let result = run_with_deadline(Deadline::from_millis(5_000), interrupt, || {
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            .boxed()
        })
        .await;
        assert!(matches!(result, DeadlineResult::Interrupted), "{result:?}");
    }
}
