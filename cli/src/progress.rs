use indicatif::{ProgressBar, ProgressStyle};
use shardcas_core::{FileOutcome, FileReport, FileToProcess, ProgressSink};

/// Progress bar over the number of files processed.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("Files processed");
    }
}

impl ProgressSink for BarProgress {
    fn file_started(&self, file: &FileToProcess) {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.bar.set_message(format!("Processing {}", name));
    }

    fn file_finished(&self, report: &FileReport) {
        if let FileOutcome::Failed { error } = &report.outcome {
            self.bar
                .println(format!("failed: {} ({})", report.path.display(), error));
        }
        self.bar.inc(1);
    }
}
