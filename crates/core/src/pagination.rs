//! Cursor-paginated query runner with rate-limit pacing.
//!
//! One runner instance walks one query's result pages in backend order.
//! Every remote call is admitted through the shared token bucket first; a
//! rejected call backs off for a fixed interval and re-attempts the same
//! call, so throttling slows the walk without losing the cursor position.
//! A finished or failed runner stays exhausted — re-running a query takes a
//! fresh runner.

use std::sync::Arc;
use std::time::Duration;

use atlas_common::resilience::{Clock, SystemClock, TokenBucket};
use atlas_domain::ChangeRecord;
use tracing::debug;

use crate::ports::{GraphQueryExecutor, QueryError};

/// Default pause after a rate-limit rejection.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Async pull-iterator over the pages of one graph query.
pub struct PagedQueryRunner<C: Clock = SystemClock> {
    executor: Arc<dyn GraphQueryExecutor>,
    limiter: TokenBucket<C>,
    query: String,
    subscriptions: Vec<String>,
    cursor: Option<String>,
    exhausted: bool,
    backoff: Duration,
}

impl<C: Clock> PagedQueryRunner<C> {
    /// Create a runner for one query over one subscription batch.
    pub fn new(
        executor: Arc<dyn GraphQueryExecutor>,
        limiter: TokenBucket<C>,
        query: String,
        subscriptions: Vec<String>,
    ) -> Self {
        Self {
            executor,
            limiter,
            query,
            subscriptions,
            cursor: None,
            exhausted: false,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the rate-limit backoff interval (tests use short waits).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fetch the next page, or `None` once the backend stops returning a
    /// continuation token.
    ///
    /// # Errors
    ///
    /// Any [`QueryError`] is fatal: the sequence is marked exhausted and the
    /// error propagates to the caller. Rate-limit rejections are handled
    /// internally and never surface here.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ChangeRecord>>, QueryError> {
        if self.exhausted {
            return Ok(None);
        }

        while !self.limiter.consume(1) {
            debug!(backoff_ms = self.backoff.as_millis() as u64, "query rate limited, backing off");
            tokio::time::sleep(self.backoff).await;
        }

        let page = match self
            .executor
            .execute(&self.query, &self.subscriptions, self.cursor.as_deref())
            .await
        {
            Ok(page) => page,
            Err(err) => {
                self.exhausted = true;
                return Err(err);
            }
        };

        self.cursor = page.next_cursor;
        if self.cursor.is_none() {
            self.exhausted = true;
        }

        Ok(Some(page.records))
    }
}
