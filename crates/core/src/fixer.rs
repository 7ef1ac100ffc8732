//! Operation orchestration.
//!
//! [`BidsFixer`] owns the resolved configuration and the current [`BidsLayout`] snapshot. It
//! asks an operation for its [`Plan`], logs what was skipped, and applies the plan when the
//! run mode is live. The snapshot is rebuilt after every applied rename-class plan so later
//! query-class operations see the renamed tree.

use crate::config::CoreConfig;
use crate::layout::BidsLayout;
use crate::operations::{self, Operation};
use crate::plan::{ApplyReport, Plan};
use crate::source::HeaderReader;
use crate::BidsResult;
use std::sync::Arc;

/// What one operation planned and, in live mode, what applying it did.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: Plan,
    /// `None` in dry-run mode.
    pub report: Option<ApplyReport>,
}

/// Runs the dataset operations against one dataset root.
pub struct BidsFixer {
    cfg: Arc<CoreConfig>,
    layout: BidsLayout,
    reader: Box<dyn HeaderReader>,
}

impl BidsFixer {
    /// Creates a fixer and indexes the dataset.
    ///
    /// # Arguments
    ///
    /// * `cfg` - Configuration resolved at startup.
    /// * `reader` - Source header reader used by the scans operation.
    ///
    /// # Errors
    ///
    /// Returns `BidsError` if the dataset cannot be indexed.
    pub fn new(cfg: Arc<CoreConfig>, reader: Box<dyn HeaderReader>) -> BidsResult<Self> {
        let layout = BidsLayout::index(cfg.dataset_root())?;
        Ok(Self {
            cfg,
            layout,
            reader,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn layout(&self) -> &BidsLayout {
        &self.layout
    }

    /// Rebuilds the layout snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns `BidsError` if the dataset cannot be indexed.
    pub fn reindex(&mut self) -> BidsResult<()> {
        self.layout = BidsLayout::index(self.cfg.dataset_root())?;
        Ok(())
    }

    /// Plans `operation` against the current snapshot without touching the dataset.
    ///
    /// # Errors
    ///
    /// Returns the operation's fatal error, if any.
    pub fn plan(&self, operation: Operation) -> BidsResult<Plan> {
        let root = self.cfg.dataset_root();
        match operation {
            Operation::PrefixSubjects => {
                operations::prefix_subjects(root, self.cfg.subject_filter())
            }
            Operation::NormaliseUnderscores => operations::normalise_underscores(root),
            Operation::ScanTables => {
                operations::scan_tables(&self.layout, self.cfg.dicom_dir(), self.reader.as_ref())
            }
            Operation::TaskNames => operations::task_names(&self.layout, self.cfg.task_filter()),
            Operation::Fieldmaps => operations::fieldmaps(&self.layout, self.cfg.intended_for()),
        }
    }

    /// Plans `operation` and applies it in live mode.
    ///
    /// Skipped items are logged as warnings. After a live rename-class operation the snapshot
    /// is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `BidsError` if planning or applying fails. Changes applied before the failure
    /// stay applied.
    pub fn run(&mut self, operation: Operation) -> BidsResult<RunOutcome> {
        tracing::info!("running {operation}");
        let plan = self.plan(operation)?;

        for skipped in plan.skipped() {
            tracing::warn!("{operation}: {skipped}");
        }

        if !self.cfg.run_mode().is_live() {
            return Ok(RunOutcome { plan, report: None });
        }

        let report = plan.apply()?;
        if operation.renames() && report.renamed > 0 {
            self.reindex()?;
        }

        Ok(RunOutcome {
            plan,
            report: Some(report),
        })
    }

    /// Runs every operation in menu order, stopping at the first fatal error.
    pub fn run_all(&mut self) -> BidsResult<Vec<RunOutcome>> {
        Operation::ALL.iter().map(|op| self.run(*op)).collect()
    }
}
