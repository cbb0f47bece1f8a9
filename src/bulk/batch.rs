//! Chunking, bounded fan-out, and retry with backoff.

use std::future::Future;
use std::time::Duration;

use futures::future::try_join_all;
use rand::Rng;
use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::CosmoResult;

/// Maximum jitter added on top of the exponential delay, as a fraction.
const JITTER_FRACTION: f64 = 0.3;

/// Split `items` into slices of `size`; the last one may be shorter.
/// A zero size or empty input yields no chunks.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    if size == 0 || items.is_empty() {
        return Vec::new();
    }
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// Run `worker` over `chunks` in waves of at most `max_concurrency`.
///
/// A wave is awaited in full before the next one starts; completion order
/// inside a wave is unspecified. The first worker error fails the whole call
/// and no further waves are started. Results come back in chunk order.
pub async fn process_with_concurrency<T, R, E, F, Fut>(
    chunks: Vec<T>,
    max_concurrency: usize,
    worker: F,
) -> Result<Vec<R>, E>
where
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let width = max_concurrency.max(1);
    let mut results = Vec::with_capacity(chunks.len());
    let mut chunks = chunks.into_iter().enumerate().peekable();

    while chunks.peek().is_some() {
        let wave: Vec<Fut> = chunks
            .by_ref()
            .take(width)
            .map(|(index, chunk)| worker(chunk, index))
            .collect();
        results.extend(try_join_all(wave).await?);
    }

    Ok(results)
}

/// Delay before retry number `attempt` (0-based): `base * 2^attempt` plus up
/// to 30% jitter, never less than the service's retry-after hint.
pub fn backoff_delay(base: Duration, attempt: u32, hint: Option<Duration>) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter = exponential.mul_f64(rand::thread_rng().gen_range(0.0..JITTER_FRACTION));
    let delay = exponential.saturating_add(jitter);
    match hint {
        Some(hint) if hint > delay => hint,
        _ => delay,
    }
}

/// Run `operation`, retrying retriable failures up to `policy.max_retries`
/// times. Non-retriable errors return after the first attempt; when retries
/// run out the last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(mut operation: F, policy: &RetryPolicy) -> CosmoResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CosmoResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt < policy.max_retries => {
                let delay = backoff_delay(policy.base_delay(), attempt, err.retry_after());
                warn!(
                    "Attempt {} failed with retriable error ({}), retrying in {:?}",
                    attempt + 1,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
