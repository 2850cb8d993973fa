//! Shared utilities.
//!
//! Hashing, concurrent fan-out, and test helpers.

use std::future::Future;

use futures_util::future::join_all;

pub mod hash;

#[cfg(test)]
pub mod testutil;

/// Drive every future to completion, then return the first error in input order.
///
/// Unlike `try_join_all`, a failing branch does not drop its siblings; all of
/// them are observed before the error surfaces.
pub async fn run_all<T, E, F>(futures: impl IntoIterator<Item = F>) -> Result<Vec<T>, E>
where
  F: Future<Output = Result<T, E>>,
{
  join_all(futures).await.into_iter().collect()
}
