/// Background difference computation
///
/// Rows are captured as `(position, identity, left path, right path)` before
/// the run starts; results travel back as [`DiffEvent`]s and are written by
/// whoever owns the table. The worker never touches the table itself.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::metric::{mean_abs_difference, WORKING_WIDTH};
use crate::error::{ImcompError, Result};
use crate::image_io::ImageReader;
use crate::state::{CellValue, ComparisonTable, DiffPair};

/// One row of one diff column, resolved at capture time
#[derive(Debug, Clone, PartialEq)]
pub struct DiffJob {
    /// Row position when the run was captured
    pub row_index: usize,
    pub identity: String,
    pub left: PathBuf,
    pub right: PathBuf,
}

/// Every row to compute for one diff column
#[derive(Debug, Clone, PartialEq)]
pub struct DiffPlan {
    pub pair: DiffPair,
    pub jobs: Vec<DiffJob>,
}

impl DiffPlan {
    /// Snapshot the two source columns of `pair` for every row.
    ///
    /// Fails with [`ImcompError::Config`] when a source or target column is
    /// not part of the table.
    pub fn capture(table: &ComparisonTable, pair: &DiffPair) -> Result<Self> {
        let column = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                ImcompError::Config(format!("diff '{}': unknown column '{}'", pair.name, name))
            })
        };
        let left = column(&pair.left_column)?;
        let right = column(&pair.right_column)?;
        column(&pair.name)?;

        let path_at = |cells: &[CellValue], index: usize| {
            PathBuf::from(cells.get(index).and_then(|c| c.as_text()).unwrap_or(""))
        };

        let jobs = table
            .identities()
            .enumerate()
            .filter_map(|(row_index, identity)| {
                let cells = table.row(identity)?;
                Some(DiffJob {
                    row_index,
                    identity: identity.to_string(),
                    left: path_at(cells, left),
                    right: path_at(cells, right),
                })
            })
            .collect();

        Ok(Self {
            pair: pair.clone(),
            jobs,
        })
    }

    pub fn capture_all(table: &ComparisonTable, pairs: &[DiffPair]) -> Result<Vec<Self>> {
        pairs.iter().map(|pair| Self::capture(table, pair)).collect()
    }
}

/// A row whose difference could not be computed
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub identity: String,
    pub column: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffSummary {
    pub columns: Vec<String>,
    pub computed: usize,
    pub failures: Vec<RowFailure>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffEvent {
    /// Percentage of the current column, back to 0 when the run ends
    Progress(u8),
    /// Result for one row, `None` when the row failed
    Cell {
        identity: String,
        column: String,
        value: Option<f64>,
    },
    Finished(DiffSummary),
}

/// A started run
#[derive(Debug)]
pub struct DiffRun {
    pub events: UnboundedReceiver<DiffEvent>,
    task: JoinHandle<()>,
}

impl DiffRun {
    /// Wait for the worker thread to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("diff worker ended abnormally: {}", e);
        }
    }
}

/// Clears the busy flag when the run ends, panics included
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Computes diff columns one run at a time
#[derive(Clone)]
pub struct DiffWorker {
    reader: Arc<dyn ImageReader>,
    busy: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    working_width: u32,
}

impl DiffWorker {
    pub fn new(reader: Arc<dyn ImageReader>) -> Self {
        Self {
            reader,
            busy: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            working_width: WORKING_WIDTH,
        }
    }

    pub fn with_working_width(mut self, width: u32) -> Self {
        self.working_width = width.max(1);
        self
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Ask the active run to stop after the current row
    pub fn cancel(&self) {
        if self.is_running() {
            self.cancel.store(true, Ordering::Release);
        }
    }

    /// Start computing `plans` on the blocking pool.
    ///
    /// A second call while a run is active is rejected with
    /// [`ImcompError::DiffBusy`]. Must be called from within a tokio runtime.
    pub fn start(&self, plans: Vec<DiffPlan>) -> Result<DiffRun> {
        let runtime = Handle::try_current()
            .map_err(|e| ImcompError::Config(format!("diff worker needs an async runtime: {}", e)))?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ImcompError::DiffBusy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));
        self.cancel.store(false, Ordering::Release);

        let (tx, events) = mpsc::unbounded_channel();
        let reader = Arc::clone(&self.reader);
        let cancel = Arc::clone(&self.cancel);
        let width = self.working_width;

        let task = runtime.spawn_blocking(move || {
            let summary = run_plans(&plans, reader.as_ref(), width, &cancel, &tx);
            drop(guard);
            let _ = tx.send(DiffEvent::Finished(summary));
        });

        Ok(DiffRun { events, task })
    }
}

fn run_plans(
    plans: &[DiffPlan],
    reader: &dyn ImageReader,
    width: u32,
    cancel: &AtomicBool,
    tx: &UnboundedSender<DiffEvent>,
) -> DiffSummary {
    let start = Instant::now();
    let mut computed = 0;
    let mut failures = Vec::new();
    let mut cancelled = false;

    'plans: for plan in plans {
        let column = &plan.pair.name;
        let total = plan.jobs.len();
        debug!("computing {} over {} rows", column, total);
        let mut last_progress = None;

        for (position, job) in plan.jobs.iter().enumerate() {
            if cancel.load(Ordering::Acquire) {
                cancelled = true;
                break 'plans;
            }

            let value = match diff_row(reader, job, width) {
                Ok(value) => {
                    computed += 1;
                    Some(value)
                }
                Err(reason) => {
                    warn!("{} / {}: {}", column, job.identity, reason);
                    failures.push(RowFailure {
                        identity: job.identity.clone(),
                        column: column.clone(),
                        reason,
                    });
                    None
                }
            };

            let _ = tx.send(DiffEvent::Cell {
                identity: job.identity.clone(),
                column: column.clone(),
                value,
            });

            let progress = (position * 100 / total) as u8;
            if last_progress != Some(progress) {
                last_progress = Some(progress);
                let _ = tx.send(DiffEvent::Progress(progress));
            }
        }
    }

    let _ = tx.send(DiffEvent::Progress(0));
    let elapsed = start.elapsed();
    info!(
        "Image diff took: {:.1} sec ({} rows, {} failed{})",
        elapsed.as_secs_f64(),
        computed,
        failures.len(),
        if cancelled { ", cancelled" } else { "" }
    );

    DiffSummary {
        columns: plans.iter().map(|p| p.pair.name.clone()).collect(),
        computed,
        failures,
        cancelled,
        elapsed,
    }
}

fn diff_row(reader: &dyn ImageReader, job: &DiffJob, width: u32) -> std::result::Result<f64, String> {
    if job.left.as_os_str().is_empty() || job.right.as_os_str().is_empty() {
        return Err("missing image path".to_string());
    }
    let left = reader.read(&job.left).map_err(|e| e.to_string())?;
    let right = reader.read(&job.right).map_err(|e| e.to_string())?;
    mean_abs_difference(&left, &right, width)
}
