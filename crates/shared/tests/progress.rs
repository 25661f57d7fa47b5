#![allow(missing_docs)]

use shared::{LogProgress, NoProgress, Progress};

#[test]
fn closure_receives_updates() {
    let mut seen = Vec::new();
    {
        let mut progress = |completed: u64, total: u64| seen.push((completed, total));
        progress.update(1, 3);
        progress.update(3, 3);
    }
    assert_eq!(seen, vec![(1, 3), (3, 3)]);
}

#[test]
fn no_progress_is_silent() {
    let mut progress = NoProgress;
    progress.update(5, 10);
}

#[test]
fn log_progress_accepts_any_order() {
    let mut progress = LogProgress::new("Upload");
    progress.update(0, 0);
    progress.update(10, 5);
    progress.update(2, 5);
}
