//! Integration tests for latest/since queries and history window resolution.

use std::fs;

use hygrolog::query::{self, HistoryParams, SECONDS_PER_DAY};
use hygrolog::{AppendLog, Record, compact};
use tempfile::tempdir;

#[test]
fn test_reference_scenario() {
    let temp_dir = tempdir().unwrap();
    let log = AppendLog::open(temp_dir.path().join("aht30.csv")).unwrap();

    // Empty log: no data.
    assert_eq!(query::latest(&log).unwrap(), None);

    log.append(&Record::new(1_700_000_100, 21.50, 55.25)).unwrap();
    assert_eq!(
        query::latest(&log).unwrap(),
        Some(Record::new(1_700_000_100, 21.50, 55.25))
    );

    // One hour later.
    log.append(&Record::new(1_700_003_700, 22.00, 50.00)).unwrap();
    let recent: Vec<_> = query::since(&log, 1_700_002_000).unwrap().collect();
    assert_eq!(recent, vec![Record::new(1_700_003_700, 22.00, 50.00)]);

    compact::compact_older_than(&log, 1_700_003_700).unwrap();
    let all: Vec<_> = query::since(&log, 0).unwrap().collect();
    assert_eq!(all, vec![Record::new(1_700_003_700, 22.00, 50.00)]);
}

#[test]
fn test_since_zero_is_append_order() {
    let temp_dir = tempdir().unwrap();
    let log = AppendLog::open(temp_dir.path().join("log.csv")).unwrap();

    // Deliberately not monotonic: the log never re-sorts.
    let order = [1_700_000_500, 1_700_000_100, 1_700_000_900, 1_700_000_300];
    for ts in order {
        log.append(&Record::new(ts, 20.0, 50.0)).unwrap();
    }

    let seen: Vec<_> = query::since(&log, 0).unwrap().map(|r| r.timestamp).collect();
    assert_eq!(seen, order);
}

#[test]
fn test_since_matches_filter_for_every_threshold() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("log.csv");

    let mut contents = String::new();
    let mut valid = Vec::new();
    for i in 0..50i64 {
        // Interleave garbage every seventh line.
        if i % 7 == 3 {
            contents.push_str("##corrupt##\n");
        }
        let record = Record::new(1_700_000_000 + (i * 37) % 500, 20.0, 40.0 + i as f64 / 10.0);
        contents.push_str(&record.encode());
        valid.push(Record::decode(&record.encode()).unwrap());
    }
    fs::write(&path, contents).unwrap();
    let log = AppendLog::open(&path).unwrap();

    for threshold in (1_699_999_990..1_700_000_510).step_by(13) {
        let expected: Vec<_> = valid.iter().copied().filter(|r| r.timestamp >= threshold).collect();
        let actual: Vec<_> = query::since(&log, threshold).unwrap().collect();
        assert_eq!(actual, expected, "threshold {threshold}");
    }
}

#[test]
fn test_since_is_lazy_over_appends() {
    let temp_dir = tempdir().unwrap();
    let log = AppendLog::open(temp_dir.path().join("log.csv")).unwrap();
    log.append(&Record::new(1_700_000_100, 21.0, 50.0)).unwrap();

    let mut iter = query::since(&log, 0).unwrap();
    assert_eq!(iter.next().map(|r| r.timestamp), Some(1_700_000_100));
    assert_eq!(iter.next(), None);
    // Exhausted iterators stay exhausted.
    log.append(&Record::new(1_700_000_160, 21.0, 50.0)).unwrap();
    assert_eq!(iter.next(), None);
}

#[test]
fn test_history_windows_end_to_end() {
    let temp_dir = tempdir().unwrap();
    let log = AppendLog::open(temp_dir.path().join("log.csv")).unwrap();

    let now = 1_700_900_000;
    for days_ago in (0..10).rev() {
        log.append(&Record::new(now - days_ago * SECONDS_PER_DAY, 20.0, 50.0))
            .unwrap();
    }
    let retention = 7 * SECONDS_PER_DAY;

    let count = |query_string: &str, now: i64| {
        let params = HistoryParams::from_query(query_string);
        let threshold = query::resolve_threshold(&params, now, retention);
        query::since(&log, threshold).unwrap().count()
    };

    // Inclusive boundary: records at now, now-1d, now-2d.
    assert_eq!(count("days=2", now), 3);
    // Default window is the retention horizon.
    assert_eq!(count("", now), 8);
    // Non-positive days fall back to a week.
    assert_eq!(count("days=0", now), 8);
    // Explicit since is verbatim.
    assert_eq!(count(&format!("since={now}"), now), 1);
    // Unsynchronized clock: everything.
    assert_eq!(count("days=1", 0), 10);
    assert_eq!(count("", 0), 10);
}
