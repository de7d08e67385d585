use crate::FileToProcess;
use crate::orchestrator::FileReport;
use serde::Serialize;

/// Running totals at a point where the integer percentage of files or bytes
/// processed changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub files_done: u64,
    pub files_total: u64,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub files_percent: u8,
    pub bytes_percent: u8,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    files_total: u64,
    bytes_total: u64,
    files_done: u64,
    bytes_done: u64,
    last_percent: (u8, u8),
}

impl ProgressTracker {
    pub fn new(files_total: u64, bytes_total: u64) -> Self {
        Self {
            files_total,
            bytes_total,
            files_done: 0,
            bytes_done: 0,
            last_percent: (0, 0),
        }
    }

    /// Counts one finished file of `size` bytes and returns a milestone when
    /// either percentage moved.
    pub fn advance(&mut self, size: u64) -> Option<Milestone> {
        self.files_done += 1;
        self.bytes_done += size;

        let current = (
            percent(self.files_done, self.files_total),
            percent(self.bytes_done, self.bytes_total),
        );
        if current == self.last_percent {
            return None;
        }
        self.last_percent = current;

        Some(Milestone {
            files_done: self.files_done,
            files_total: self.files_total,
            bytes_done: self.bytes_done,
            bytes_total: self.bytes_total,
            files_percent: current.0,
            bytes_percent: current.1,
        })
    }

    pub fn files_done(&self) -> u64 {
        self.files_done
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (u128::from(done.min(total)) * 100 / u128::from(total)) as u8
}

/// Observer for batch progress. Purely informational; it cannot influence
/// control flow.
pub trait ProgressSink: Send + Sync {
    fn file_started(&self, _file: &FileToProcess) {}

    fn file_finished(&self, _report: &FileReport) {}

    fn milestone(&self, _milestone: &Milestone) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {}
