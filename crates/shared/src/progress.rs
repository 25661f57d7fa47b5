use tracing::info;

/// Receives `(completed, total)` updates while a long running step makes progress.
///
/// Units are chosen by the caller: archive entries while compressing, bytes while uploading.
pub trait Progress {
    /// Record that `completed` out of `total` units are done.
    fn update(&mut self, completed: u64, total: u64);
}

impl<F: FnMut(u64, u64)> Progress for F {
    fn update(&mut self, completed: u64, total: u64) {
        self(completed, total);
    }
}

/// Ignores all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _completed: u64, _total: u64) {}
}

/// Logs progress at every whole ten percent.
#[derive(Debug)]
pub struct LogProgress {
    label: &'static str,
    last_step: Option<u64>,
}

impl LogProgress {
    /// Create a progress logger that prefixes each line with `label`.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            last_step: None,
        }
    }

    /// The ten percent step `completed` falls in, `10` once finished.
    fn step(completed: u64, total: u64) -> u64 {
        if total == 0 {
            return 10;
        }

        (completed.min(total).saturating_mul(10)) / total
    }
}

impl Progress for LogProgress {
    fn update(&mut self, completed: u64, total: u64) {
        let step = Self::step(completed, total);
        if self.last_step == Some(step) {
            return;
        }

        self.last_step = Some(step);
        info!("{}: {}% ({completed}/{total})", self.label, step * 10);
    }
}

#[cfg(test)]
mod tests {
    use super::LogProgress;

    #[test]
    fn steps_are_whole_tens() {
        assert_eq!(LogProgress::step(0, 200), 0);
        assert_eq!(LogProgress::step(19, 200), 0);
        assert_eq!(LogProgress::step(20, 200), 1);
        assert_eq!(LogProgress::step(199, 200), 9);
        assert_eq!(LogProgress::step(200, 200), 10);
    }

    #[test]
    fn empty_total_is_finished() {
        assert_eq!(LogProgress::step(0, 0), 10);
    }

    #[test]
    fn overshoot_is_clamped() {
        assert_eq!(LogProgress::step(300, 200), 10);
    }
}
