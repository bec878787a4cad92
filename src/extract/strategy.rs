//! Ordered fallback chains of extraction strategies.

use tracing::debug;

use crate::error::{Result, ScrapeError};

/// One way of recovering a record from a fragment.
///
/// `extract` checks its own structural marker and returns `None` when the
/// marker is absent or the record cannot be recovered in full. It never
/// returns a partially populated record.
pub struct Strategy<T> {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<T>,
}

/// Strategies for one record type, tried in declared order.
pub struct StrategyChain<T: 'static> {
    record: &'static str,
    strategies: &'static [Strategy<T>],
}

impl<T: 'static> StrategyChain<T> {
    #[must_use]
    pub const fn new(record: &'static str, strategies: &'static [Strategy<T>]) -> Self {
        Self { record, strategies }
    }

    /// Return the first strategy's record, or `None` if every strategy missed.
    pub fn try_run(&self, input: &str) -> Option<T> {
        self.strategies.iter().find_map(|strategy| {
            let found = (strategy.extract)(input);
            if found.is_some() {
                debug!(record = self.record, strategy = strategy.name, "Strategy matched");
            }
            found
        })
    }

    /// Like [`StrategyChain::try_run`], but a full miss is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ExtractionFailed`] naming the record type once
    /// every strategy has been exhausted.
    pub fn run(&self, input: &str) -> Result<T> {
        self.try_run(input).ok_or_else(|| {
            debug!(record = self.record, tried = self.strategies.len(), "No strategy matched");
            ScrapeError::ExtractionFailed(self.record)
        })
    }
}
