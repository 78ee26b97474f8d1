/// Application context and table session
///
/// `AppContext` is built once per run and owns what used to be process-wide:
/// the file cache and the verbosity. `Session` drives the foreground sequence
/// (scan, align, build, reconcile, recolor) and is the only writer of the
/// comparison table; diff results reach the table through [`Session::apply_event`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheSize, CacheStats, FileCache};
use crate::config::{ComparisonConfig, DEFAULT_CONFIG_NAME};
use crate::diff::{DiffEvent, DiffPlan, DiffRun, DiffSummary, DiffWorker};
use crate::error::{ImcompError, Result};
use crate::image_io::{FileImageReader, ImageReader};
use crate::scan::{align, scan_or_empty, ScanFilter};
use crate::state::params::{locate_directories, REPORT_KEY};
use crate::state::{
    self, merge_loaded_params, resolve_image_sets, CellValue, ColumnLayout, ComparisonTable, ImageSet, Params,
    Report,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    pub quiet: bool,
    pub debug: bool,
    pub trace: bool,
    /// Elapsed time of each phase
    pub timing: bool,
    /// Elapsed time of each set scan
    pub detailed_timing: bool,
}

impl Verbosity {
    /// Default `tracing` filter directive, `RUST_LOG` takes precedence
    pub fn filter_directive(&self) -> &'static str {
        if self.trace {
            "imcomp=trace"
        } else if self.debug {
            "imcomp=debug"
        } else if self.quiet {
            "warn"
        } else {
            "imcomp=info"
        }
    }
}

/// Per-run shared state
#[derive(Debug, Clone)]
pub struct AppContext {
    cache: Arc<FileCache>,
    verbosity: Verbosity,
}

impl AppContext {
    pub fn new(cache_size: CacheSize, verbosity: Verbosity) -> Self {
        Self {
            cache: Arc::new(FileCache::new(cache_size)),
            verbosity,
        }
    }

    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Image reader going through the shared cache
    pub fn image_reader(&self) -> Arc<dyn ImageReader> {
        Arc::new(FileImageReader::with_cache(Arc::clone(&self.cache)))
    }

    /// Release the cached files
    pub fn shutdown(&self) {
        debug!("{}", self.cache.stats());
        self.cache.reset();
    }

    fn timed<T>(&self, phase: &str, f: impl FnOnce() -> T) -> T {
        if !self.verbosity.timing {
            return f();
        }
        let start = Instant::now();
        let result = f();
        info!("{} took {:.3} sec", phase, start.elapsed().as_secs_f64());
        result
    }
}

pub struct Session {
    context: AppContext,
    params: Params,
    /// Parameter keys given explicitly on this invocation
    explicit: HashSet<String>,
    config: ComparisonConfig,
    image_sets: Vec<ImageSet>,
    table: ComparisonTable,
    worker: DiffWorker,
    progress: u8,
    last_diff: Option<DiffSummary>,
}

impl Session {
    pub fn new(context: AppContext, params: Params, explicit: HashSet<String>) -> Result<Self> {
        let config = ComparisonConfig::load(config_name(&params))?;
        let worker = DiffWorker::new(context.image_reader());
        let table = ComparisonTable::empty(ColumnLayout::new(
            &[],
            &ComparisonConfig {
                diff: Vec::new(),
                ..config.clone()
            },
        ));

        Ok(Self {
            context,
            params,
            explicit,
            config,
            image_sets: Vec::new(),
            table,
            worker,
            progress: 0,
            last_diff: None,
        })
    }

    /// Replace the diff worker, e.g. to change the working width or the reader
    pub fn with_worker(mut self, worker: DiffWorker) -> Self {
        self.worker = worker;
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn image_sets(&self) -> &[ImageSet] {
        &self.image_sets
    }

    pub fn table(&self) -> &ComparisonTable {
        &self.table
    }

    /// Progress of the active diff run, 0 when idle
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn last_diff(&self) -> Option<&DiffSummary> {
        self.last_diff.as_ref()
    }

    pub fn is_diff_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Build the table from the parameters.
    ///
    /// When the parameters name an existing report, its parameters are
    /// merged first and its values fill the blank cells afterwards. A report
    /// that cannot be read is logged and the table is built from the scan only.
    /// Returns the number of rows.
    pub fn fill_data(&mut self) -> Result<usize> {
        let loaded = match self.params.report_path().filter(|p| p.is_file()) {
            Some(path) => {
                info!("Reading report {}", path.display());
                match state::read_report(&path) {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!("{}, using the scanned sets only", e);
                        None
                    }
                }
            }
            None => None,
        };

        if let Some(report) = &loaded {
            self.merge_params(&report.params);
        }
        self.rebuild(loaded.as_ref())
    }

    /// Rescan the sets and rebuild the table from scratch.
    ///
    /// Column statistics start over; values already in the table are carried
    /// into the rows that still exist.
    pub fn reload(&mut self) -> Result<usize> {
        let snapshot = self.table.to_report(&self.params, None);
        self.image_sets.clear();
        self.rebuild(Some(&snapshot))
    }

    /// Load a report file, merge its parameters and rebuild the table with
    /// its values. A malformed report leaves the session untouched.
    pub fn read_report(&mut self, path: &Path) -> Result<usize> {
        info!("Reading report {}", path.display());
        let report = state::read_report(path)?;
        self.merge_params(&report.params);
        self.params.set(REPORT_KEY, path.to_string_lossy().to_string());
        self.image_sets.clear();
        self.rebuild(Some(&report))
    }

    /// Save the table (or the rows at `selection`) with the current
    /// parameters. Without a path, the `report` parameter is used, then the
    /// default report name of the layout. Returns the path written.
    pub fn write_report(&mut self, path: Option<&Path>, compress: bool, selection: Option<&[usize]>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self
                .params
                .report_path()
                .unwrap_or_else(|| PathBuf::from(&self.table.layout().default_report_file)),
        };

        self.params.set("saved_at", chrono::Local::now().to_rfc3339());
        self.params.set("version", env!("CARGO_PKG_VERSION"));
        let report = self.table.to_report(&self.params, selection);

        let written = state::write_report(&report, &path, compress)?;
        info!("Saved {} rows to {}", report.rows.len(), written.display());
        Ok(written)
    }

    /// Start computing every diff column of the layout.
    ///
    /// Rows are captured now; feed the events of the returned run to
    /// [`Session::apply_event`].
    pub fn compute_differences(&mut self) -> Result<DiffRun> {
        let pairs = &self.table.layout().diff_pairs;
        if pairs.is_empty() {
            return Err(ImcompError::Config("no difference column is configured".to_string()));
        }
        let plans = DiffPlan::capture_all(&self.table, pairs)?;
        let run = self.worker.start(plans)?;
        self.last_diff = None;
        Ok(run)
    }

    /// Stop the active diff run after its current row
    pub fn cancel_differences(&self) {
        self.worker.cancel();
    }

    /// Compute the diff columns and wait for the result
    pub async fn run_differences(&mut self) -> Result<DiffSummary> {
        let mut run = self.compute_differences()?;
        let mut summary = None;
        while let Some(event) = run.events.recv().await {
            if let DiffEvent::Finished(s) = &event {
                summary = Some(s.clone());
            }
            self.apply_event(event);
        }
        run.join().await;
        summary.ok_or_else(|| ImcompError::Config("diff worker stopped without a summary".to_string()))
    }

    /// Apply one worker event to the table. Returns true on `Finished`.
    pub fn apply_event(&mut self, event: DiffEvent) -> bool {
        match event {
            DiffEvent::Progress(progress) => {
                self.progress = progress;
                false
            }
            DiffEvent::Cell {
                identity,
                column,
                value,
            } => {
                let value = value.map(CellValue::Float).unwrap_or_else(|| CellValue::from(""));
                if !self.table.write_cell(&identity, &column, value) {
                    debug!("diff result for {} / {} has no cell", identity, column);
                }
                false
            }
            DiffEvent::Finished(summary) => {
                self.progress = 0;
                for column in &summary.columns {
                    if let Some(index) = self.table.column_index(column) {
                        self.table.recolor_column(index);
                    }
                }
                if !summary.failures.is_empty() {
                    warn!("{} rows could not be compared", summary.failures.len());
                }
                self.last_diff = Some(summary);
                true
            }
        }
    }

    /// Prefetch every image of the table into the cache
    pub fn load_files_in_cache(&self) -> usize {
        let paths = self.table.image_paths();
        let cache = self.context.cache();
        let added = self.context.timed("cache prefetch", || cache.add_files(&paths));
        cache.check_size_limit();
        info!("{}", cache.stats());
        added
    }

    /// Toggling the cache drops what it holds
    pub fn set_cache_enabled(&self, enabled: bool) {
        let cache = self.context.cache();
        cache.set_enabled(enabled);
        cache.reset();
        cache.check_size_limit();
        info!("file cache {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn set_max_cache_size(&self, size: CacheSize) {
        self.context.cache().set_max_cache_size(size);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.context.cache().stats()
    }

    fn merge_params(&mut self, loaded: &Params) {
        let previous = config_name(&self.params).to_string();
        self.params = merge_loaded_params(&self.params, loaded, &self.explicit);
        if !loaded.contains("image_sets") {
            // Legacy report: sets come from the flat directory/suffix keys
            self.params.0.remove("image_sets");
            self.image_sets.clear();
        }
        if config_name(&self.params) != previous {
            match ComparisonConfig::load(config_name(&self.params)) {
                Ok(config) => self.config = config,
                Err(e) => warn!("{}, keeping configuration '{}'", e, self.config.config_name),
            }
        }
    }

    fn resolve_sets(&mut self) {
        let mut sets = self
            .params
            .image_sets()
            .unwrap_or_else(|| resolve_image_sets(&self.params));

        let search_path = self
            .params
            .report_path()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        locate_directories(&mut sets, &search_path);

        self.params.set_image_sets(&sets);
        self.image_sets = sets;
    }

    fn rebuild(&mut self, report: Option<&Report>) -> Result<usize> {
        if self.image_sets.is_empty() {
            self.resolve_sets();
        }
        if self.image_sets.is_empty() {
            warn!("no image set to compare");
        }
        self.params.set("config_name", self.config.config_name.clone());

        let filter = ScanFilter::new(&self.params.extensions(), &self.params.filters(), self.params.recursive());
        let context = self.context.clone();
        let sets = &self.image_sets;

        let scans = context.timed("scan", || {
            sets.iter()
                .map(|set| {
                    let scan = || scan_or_empty(&set.directory, &filter, &set.suffix);
                    let output = if context.verbosity.detailed_timing {
                        context.timed(&format!("scan {}", set.directory.display()), scan)
                    } else {
                        scan()
                    };
                    if output.collisions > 0 {
                        warn!("{}: {} identity collisions", set.directory.display(), output.collisions);
                    }
                    output
                })
                .collect::<Vec<_>>()
        });
        let aligned = context.timed("align", || align(&scans));

        let layout = ColumnLayout::new(sets, &self.config);
        self.table = context.timed("build", || {
            ComparisonTable::build_from_alignment(sets, &aligned, layout, self.config.guess_input)
        });

        if let Some(report) = report {
            let filled = context.timed("reconcile", || self.table.reconcile(report));
            debug!("{} cells filled from the report", filled);
        }
        context.timed("recolor", || self.table.recolor_all());

        info!("{} rows in {} sets", self.table.len(), self.image_sets.len());
        Ok(self.table.len())
    }
}

fn config_name(params: &Params) -> &str {
    [params.str("config"), params.str("config_name")]
        .into_iter()
        .find(|name| !name.is_empty())
        .unwrap_or(DEFAULT_CONFIG_NAME)
}
