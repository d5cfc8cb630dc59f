use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mission_core::{GradePaths, GradeRecord, GradeStore};

#[test]
fn readers_never_observe_partial_grade_files() {
    let workdir = tempfile::tempdir().unwrap();
    let store = GradeStore::new(GradePaths::for_workdir(workdir.path()), 500);
    store.try_init().unwrap();

    let grade_file = store.paths().grade_file.clone();
    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let grade_file = grade_file.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0usize;
                let mut last_completed = 0usize;
                loop {
                    let raw = std::fs::read(&grade_file).expect("grade file always exists");
                    let record: GradeRecord =
                        serde_json::from_slice(&raw).expect("grade file always well-formed");
                    assert!(record.score >= 0.0 && record.score <= 1.0);
                    assert!(record.feedback.completed_missions >= last_completed);
                    last_completed = record.feedback.completed_missions;
                    observed += 1;
                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                }
                observed
            })
        })
        .collect();

    for completed in 1..=500 {
        store.try_update(completed).unwrap();
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    let last = store.read().unwrap();
    assert_eq!(last.feedback.completed_missions, 500);
    assert_eq!(last.score, 1.0);
}
