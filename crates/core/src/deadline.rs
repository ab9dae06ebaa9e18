//! Deadlines for calls to external dependencies.

use std::future::Future;
use std::time::Duration;

use crate::error::{Dependency, Error, Result};

/// Run `future`, failing with a timed-out [`Error`] for `dependency` if it
/// does not finish within `deadline`.
pub async fn with_deadline<T, F>(
    dependency: Dependency,
    operation: &str,
    deadline: Duration,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(dependency, operation, deadline)),
    }
}
