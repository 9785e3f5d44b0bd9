use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::RwLock;

use crate::company::{Cnpj, RejectReason, SearchParams};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,    // Only errors, progress bar and final summary
    Summary = 1,   // Per-candidate progress lines (default)
    Detailed = 2,  // Warnings and scroll passes
    Debug = 3,     // Everything
}

impl VerbosityLevel {
    /// `--quiet` wins over any number of `-v`
    pub fn from_flags(quiet: bool, verbose_count: u8) -> Self {
        if quiet {
            VerbosityLevel::Silent
        } else {
            Self::from_verbose_count(verbose_count)
        }
    }

    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

#[derive(Clone)]
pub struct CollectionLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    search: String,
    entries_seen: usize,
    accepted: usize,
    rejected: BTreeMap<&'static str, usize>,
    scroll_passes: u32,
    stop_reason: String,
    output_file: String,
}

impl CollectionLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        // errors are shown at every verbosity
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Self::timestamp(), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Print above the progress bar when one is active
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    fn timestamp() -> String {
        Local::now().format("%H:%M:%S%.3f").to_string()
    }

    fn with_metadata(&self, update: impl FnOnce(&mut RunMetadata)) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            update(&mut metadata);
        }
    }

    // Progress bar tracks accepted records against the target count
    pub async fn start_progress(&self, target: u64) {
        let pb = ProgressBar::new(target);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} empresas {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Searching...");

        *self.progress_bar.write().await = Some(pb);
        self.with_metadata(|m| m.start_time = Some(SystemTime::now()));
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        if let Some(pb) = self.progress_bar.write().await.take() {
            pb.finish_and_clear();
        }
        self.with_metadata(|m| m.end_time = Some(SystemTime::now()));
        self.info(final_message);
    }

    pub fn log_run_start(&self, params: &SearchParams) {
        let search = format!(
            "{} perto de {} {} (target: {}, regime: {})",
            params.category, params.city, params.state, params.target_count, params.regime_filter
        );
        self.info(&format!("Starting collection: {}", search));
        self.with_metadata(|m| {
            m.search = search;
            if m.start_time.is_none() {
                m.start_time = Some(SystemTime::now());
            }
        });
    }

    pub fn log_feed_ready(&self) {
        self.debug("Results feed located");
    }

    pub fn log_entry_seen(&self, name: &str) {
        self.with_metadata(|m| m.entries_seen += 1);
        self.debug(&format!("Processing entry: {}", name));
    }

    pub fn log_candidate_accepted(&self, name: &str, cnpj: &Cnpj, collected: usize, target: usize) {
        self.with_metadata(|m| m.accepted += 1);
        self.info(&format!(
            "✔ Accepted '{}' - {} ({}/{})",
            name,
            cnpj.formatted(),
            collected,
            target
        ));
    }

    pub fn log_candidate_rejected(&self, name: &str, reason: &RejectReason) {
        self.with_metadata(|m| *m.rejected.entry(reason.kind()).or_insert(0) += 1);
        self.info(&format!("✘ Skipped '{}': {}", name, reason));
    }

    pub fn log_scroll_pass(&self, pass: u32) {
        self.with_metadata(|m| m.scroll_passes = pass);
        self.info(&format!("Scrolling results (pass {})", pass));
    }

    pub fn log_stop(&self, reason: &str) {
        self.with_metadata(|m| m.stop_reason = reason.to_string());
        self.debug(&format!("Collection stopped: {}", reason));
    }

    pub fn log_export_success(&self, path: &str) {
        self.with_metadata(|m| m.output_file = path.to_string());
        self.info(&format!("Export completed: {}", path));
    }

    pub fn print_final_summary(&self) {
        let Ok(metadata) = self.run_metadata.lock() else {
            return;
        };

        println!("\n=== COLLECTION SUMMARY ===");
        if !metadata.search.is_empty() {
            println!("Search: {}", metadata.search);
        }
        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            let duration = end.duration_since(start).unwrap_or_default();
            println!("Duration: {:.2}s", duration.as_secs_f64());
        }
        println!("Entries Examined: {}", metadata.entries_seen);
        println!("Companies Collected: {}", metadata.accepted);
        for (kind, count) in &metadata.rejected {
            println!("  Skipped ({}): {}", kind, count);
        }
        println!("Scroll Passes: {}", metadata.scroll_passes);
        if !metadata.stop_reason.is_empty() {
            println!("Stopped Because: {}", metadata.stop_reason);
        }
        if !metadata.output_file.is_empty() {
            println!("Results Exported: {}", metadata.output_file);
        }
        println!("==========================\n");
    }

    /// Write every buffered message to the log file, if one was requested
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(ref log_file_path) = self.log_file_path else {
            return Ok(());
        };
        let Ok(buffer) = self.log_buffer.lock() else {
            return Ok(());
        };

        if let Some(parent) = Path::new(log_file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        for log_entry in buffer.iter() {
            writeln!(file, "{}", log_entry)?;
        }

        file.flush()
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn rejected_count(&self, kind: &str) -> usize {
        self.run_metadata
            .lock()
            .map(|m| m.rejected.get(kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}
