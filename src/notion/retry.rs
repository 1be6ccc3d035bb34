// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded retry with a fixed backoff, shared by every phase of an export.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// What one attempt produced.
pub enum Step<T> {
    Ready(T),
    /// Nothing went wrong, but the result isn't there yet.
    Pending,
}

#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    Exhausted { attempts: u32, last: Option<E> },
    Fatal(E),
}

#[derive(Debug, PartialEq)]
pub struct Success<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `op` until it is ready, fails with an error `is_transient` rejects,
/// or the policy's attempts run out. Attempts are numbered from 1 and
/// separated by the policy's backoff.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<Success<T>, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Step<T>, E>>,
{
    let mut last = None;
    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(Step::Ready(value)) => {
                return Ok(Success {
                    value,
                    attempts: attempt,
                });
            }
            Ok(Step::Pending) => {
                log::debug!(
                    "{label}: not ready ({attempt} of {}), retrying in {:?}",
                    policy.max_attempts,
                    policy.backoff
                );
            }
            Err(e) if is_transient(&e) => {
                log::warn!(
                    "{label}: {e} ({attempt} of {}), retrying in {:?}",
                    policy.max_attempts,
                    policy.backoff
                );
                last = Some(e);
            }
            Err(e) => return Err(RetryError::Fatal(e)),
        }
        if attempt < policy.max_attempts {
            sleep(policy.backoff).await;
        }
    }
    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
        last,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Broken,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            match self {
                TestError::Flaky => write!(f, "flaky"),
                TestError::Broken => write!(f, "broken"),
            }
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_secs(1),
        }
    }

    fn is_flaky(e: &TestError) -> bool {
        *e == TestError::Flaky
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_with_backoff() {
        let start = Instant::now();
        let seen = Cell::new(Vec::new());
        let result = retry(policy(10), "test", is_flaky, |attempt| {
            let mut times = seen.take();
            times.push(start.elapsed());
            seen.set(times);
            async move {
                if attempt <= 3 {
                    Err(TestError::Flaky)
                } else {
                    Ok(Step::Ready("done"))
                }
            }
        })
        .await;
        assert_eq!(
            result,
            Ok(Success {
                value: "done",
                attempts: 4
            })
        );
        let times = seen.take();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_is_retried() {
        let result = retry(policy(10), "test", is_flaky, |attempt| async move {
            if attempt < 6 {
                Ok(Step::Pending)
            } else {
                Ok(Step::Ready(attempt))
            }
        })
        .await;
        assert_eq!(
            result,
            Ok(Success {
                value: 6,
                attempts: 6
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let calls = Cell::new(0);
        let result: Result<Success<()>, _> = retry(policy(10), "test", is_flaky, |_| {
            calls.set(calls.get() + 1);
            async { Err(TestError::Broken) }
        })
        .await;
        assert_eq!(result, Err(RetryError::Fatal(TestError::Broken)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_exhausted() {
        let start = Instant::now();
        let result: Result<Success<()>, _> =
            retry(policy(3), "test", is_flaky, |_| async { Err(TestError::Flaky) }).await;
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: Some(TestError::Flaky)
            })
        );
        // No sleep after the last attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_until_exhausted() {
        let result: Result<Success<()>, RetryError<TestError>> =
            retry(policy(5), "test", is_flaky, |_| async { Ok(Step::Pending) }).await;
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 5,
                last: None
            })
        );
    }
}
