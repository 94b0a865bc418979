//! Resource adapters: one importer per entity kind.
//!
//! Every adapter follows the same contract. It reads the progress offset,
//! queries its source rows from that offset, handles them one by one and
//! consults the [`ContinuationScheduler`] after each row. A returned
//! [`Invocation`] is either still running (call again), done, or failed.

pub mod category;
pub mod customer;
pub mod fields;
pub mod price;
pub mod product;

#[cfg(test)]
pub(crate) mod test_support;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{error, warn};

use crate::config::StepConfig;
use crate::connectors::{RowCursor, SourceProfile, SourceQuery, TargetProfile};
use crate::error::{Error, Result};
use crate::mapping::MappingStore;
use crate::progress::{Budget, ContinuationScheduler, Progress};
use crate::retry::{with_retry, RetryConfig};

pub use category::CategoryAdapter;
pub use customer::CustomerAdapter;
pub use price::PriceAdapter;
pub use product::ProductAdapter;

/// A migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Articles and variants.
    Products,
    /// Category tree.
    Categories,
    /// Article to category assignments.
    ArticleCategories,
    /// Customer group prices.
    Prices,
    /// Customer accounts.
    Customers,
}

impl Step {
    /// Order used when a job does not list its steps.
    pub const DEFAULT_ORDER: [Step; 5] = [
        Step::Products,
        Step::Categories,
        Step::ArticleCategories,
        Step::Prices,
        Step::Customers,
    ];

    /// Name used in configs, checkpoints and carried parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Categories => "categories",
            Self::ArticleCategories => "article_categories",
            Self::Prices => "prices",
            Self::Customers => "customers",
        }
    }

    /// Steps whose mappings this step reads.
    #[must_use]
    pub const fn depends_on(self) -> &'static [Step] {
        match self {
            Self::ArticleCategories => &[Step::Products, Step::Categories],
            Self::Prices => &[Step::Products],
            Self::Products | Self::Categories | Self::Customers => &[],
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::DEFAULT_ORDER
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown step '{}'", s)))
    }
}

/// A skipped row and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Offset of the row.
    pub offset: u64,
    /// Reason.
    pub message: String,
}

/// Result of one adapter invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Updated continuation token.
    pub progress: Progress,
    /// Rows skipped during this invocation.
    pub diagnostics: Vec<Diagnostic>,
    /// Rows handled during this invocation.
    pub rows: u64,
}

/// Everything an adapter needs besides its progress.
pub struct StepContext<'a> {
    /// Source profile.
    pub source: &'a dyn SourceProfile,
    /// Target profile.
    pub target: &'a dyn TargetProfile,
    /// Identifier mapping store.
    pub mappings: &'a dyn MappingStore,
    /// Job settings.
    pub config: &'a StepConfig,
    /// Per-invocation budget.
    pub budget: Budget,
    /// Retry policy for source queries.
    pub retry: RetryConfig,
}

impl StepContext<'_> {
    /// Queries the source, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted.
    pub async fn query(&self, query: SourceQuery, offset: u64) -> Result<RowCursor> {
        let source = self.source;
        with_retry(&self.retry, query.as_str(), || source.query(query, offset)).await
    }
}

/// How an adapter left its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Budget used up; call again with the returned progress.
    Yield,
    /// Every row handled.
    Done,
    /// Step stopped on a row it must not skip.
    Failed(String),
}

/// Bookkeeping of one invocation: cursor, budget and diagnostics.
#[derive(Debug)]
pub struct StepRun {
    step: Step,
    progress: Progress,
    scheduler: ContinuationScheduler,
    diagnostics: Vec<Diagnostic>,
}

impl StepRun {
    fn start(step: Step, progress: Progress, budget: Budget) -> Self {
        Self {
            step,
            progress,
            scheduler: ContinuationScheduler::start(budget),
            diagnostics: Vec::new(),
        }
    }

    /// Offset of the next row.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.progress.offset
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Sets the total from the rows left in the cursor.
    pub fn set_remaining(&mut self, remaining: u64) {
        self.progress.count = remaining + self.progress.offset;
    }

    /// Records a skipped row. The caller still finishes the row.
    pub fn skip(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{} row {}: {}", self.step, self.progress.offset, message);
        self.diagnostics.push(Diagnostic {
            offset: self.progress.offset,
            message,
        });
    }

    /// Advances past the current row and reports whether to yield.
    pub fn row_done(&mut self) -> bool {
        self.progress.advance();
        self.scheduler.row_done()
    }

    /// Records a parameter for later steps.
    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.progress.add_param(key, value);
    }

    fn finish(self, outcome: Result<Outcome>) -> Invocation {
        let rows = self.scheduler.rows();
        let progress = match outcome {
            Ok(Outcome::Yield) => self.progress,
            Ok(Outcome::Done) => self.progress.done(),
            Ok(Outcome::Failed(message)) => {
                error!("{} stopped at row {}: {}", self.step, self.progress.offset, message);
                self.progress.error(message)
            }
            Err(e) => {
                error!("{} failed at row {}: {}", self.step, self.progress.offset, e);
                self.progress.error(e.to_string())
            }
        };
        Invocation {
            progress,
            diagnostics: self.diagnostics,
            rows,
        }
    }
}

/// Trait for resource adapters.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Step this adapter runs.
    fn step(&self) -> Step;

    /// Handles rows from `run.offset()` until done, failed or out of budget.
    ///
    /// Errors returned here end the step in the error state.
    async fn execute(&self, ctx: &StepContext<'_>, run: &mut StepRun) -> Result<Outcome>;

    /// Runs one invocation. Never fails: faults end up in the returned progress.
    async fn run(&self, ctx: &StepContext<'_>, progress: Progress) -> Invocation {
        let mut run = StepRun::start(self.step(), progress, ctx.budget);
        let outcome = self.execute(ctx, &mut run).await;
        run.finish(outcome)
    }
}

/// Create the adapter for a step.
#[must_use]
pub fn create_adapter(step: Step) -> Box<dyn ResourceAdapter> {
    match step {
        Step::Categories => Box::new(CategoryAdapter::categories()),
        Step::ArticleCategories => Box::new(CategoryAdapter::article_categories()),
        Step::Prices => Box::new(PriceAdapter),
        Step::Products => Box::new(ProductAdapter),
        Step::Customers => Box::new(CustomerAdapter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names_round_trip() {
        for step in Step::DEFAULT_ORDER {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
            assert_eq!(create_adapter(step).step(), step);
        }
        assert!("orders".parse::<Step>().is_err());
    }

    #[test]
    fn test_step_serde_name() {
        assert_eq!(
            serde_json::to_string(&Step::ArticleCategories).unwrap(),
            "\"article_categories\""
        );
    }

    #[test]
    fn test_step_run_counts_and_skips() {
        let mut progress = Progress::new();
        progress.offset = 4;
        let mut run = StepRun::start(Step::Prices, progress, Budget::unlimited());
        run.set_remaining(6);
        run.skip("no mapping");
        assert!(!run.row_done());

        let invocation = run.finish(Ok(Outcome::Yield));
        assert_eq!(invocation.progress.count, 10);
        assert_eq!(invocation.progress.offset, 5);
        assert_eq!(invocation.rows, 1);
        assert_eq!(
            invocation.diagnostics,
            vec![Diagnostic {
                offset: 4,
                message: "no mapping".to_string()
            }]
        );
    }

    #[test]
    fn test_step_run_error_keeps_offset() {
        let mut progress = Progress::new();
        progress.offset = 2;
        let run = StepRun::start(Step::Products, progress, Budget::unlimited());
        let invocation = run.finish(Err(Error::Target("lost connection".to_string())));
        assert_eq!(invocation.progress.offset, 2);
        assert!(invocation
            .progress
            .error_message
            .unwrap()
            .contains("lost connection"));
    }
}
