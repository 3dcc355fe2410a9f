//! Bounded OS round-trips
//!
//! Native call UI and notification APIs may hang on permission prompts or
//! an unresponsive system service. Every such await in the call core goes
//! through [`with_timeout`] so a stuck platform call degrades to the
//! fallback path instead of stalling call admission.

use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::error::{CallError, CallResult};

/// Run `future` with a deadline, mapping expiry to
/// [`CallError::OperationTimeout`]
///
/// ```rust
/// # use callsync_client_core::recovery::with_timeout;
/// # use callsync_client_core::error::CallResult;
/// # use std::time::Duration;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let result: CallResult<u8> =
///     with_timeout("display_incoming_call", Duration::from_millis(50), async { Ok(7) }).await;
/// assert_eq!(result.unwrap(), 7);
/// # }
/// ```
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, future: F) -> CallResult<T>
where
    F: Future<Output = CallResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(CallError::OperationTimeout {
                operation: operation.to_string(),
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
