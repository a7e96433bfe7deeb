//! Integration tests for the tracking core with the SQLite backend.
//!
//! Uses file-backed SQLite in a tempdir (no Postgres required). Each test
//! gets its own database so the global queries (eviction, overload) stay
//! deterministic.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, TimeDelta, Utc};
use tempfile::TempDir;

use loadstone::config::DatabaseConfig;
use loadstone::store::Store;
use loadstone::tracking::{
    ActivityRecorder, AssignmentReconciler, AssignmentRow, LoadMonitor, ShiftManager,
    ShiftOutcome, ShiftState,
};

async fn fresh_store() -> (Arc<Store>, TempDir) {
    let temp = tempfile::tempdir().expect("tempdir");
    let url = temp.path().join("loadstone.db").to_string_lossy().to_string();
    let config = DatabaseConfig::for_test(&url);
    let store = Store::new(&config).await.expect("Store::new");
    store.run_migrations().await.expect("run_migrations");
    (Arc::new(store), temp)
}

fn components(
    store: &Arc<Store>,
) -> (ActivityRecorder, AssignmentReconciler, ShiftManager, LoadMonitor) {
    let recorder = ActivityRecorder::new(store.clone(), Duration::from_secs(600));
    let reconciler = AssignmentReconciler::new(store.clone());
    let shifts = ShiftManager::new(store.clone());
    let monitor = LoadMonitor::new(store.clone(), recorder.clone(), 3);
    (recorder, reconciler, shifts, monitor)
}

#[tokio::test]
async fn test_reassign_keeps_one_row_per_traveler() {
    let (store, _tmp) = fresh_store().await;
    let (_, reconciler, shifts, _) = components(&store);

    shifts.set_shift("w1", ShiftState::On).await.expect("shift on");
    shifts.set_shift("w2", ShiftState::On).await.expect("shift on");

    reconciler.reassign("t1", "w1").await.expect("reassign");
    reconciler.reassign("t1", "w2").await.expect("reassign");
    reconciler.reassign("t1", "w1").await.expect("reassign");

    let owner = store
        .find_assignment_by_traveler("t1")
        .await
        .expect("find")
        .expect("t1 has an owner");
    assert_eq!(owner.wizard_id, "w1");
    assert_eq!(owner.shift, ShiftState::On);

    // The loser holds no row for the traveler.
    let w2_rows = store.find_assignments_by_wizard("w2").await.expect("find");
    assert!(w2_rows.iter().all(|r| r.traveler_id.as_deref() != Some("t1")));

    // The winner holds exactly one.
    let w1_rows = store.find_assignments_by_wizard("w1").await.expect("find");
    assert_eq!(
        w1_rows
            .iter()
            .filter(|r| r.traveler_id.as_deref() == Some("t1"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_message_takeover_moves_ownership() {
    let (store, _tmp) = fresh_store().await;
    let (recorder, reconciler, shifts, _) = components(&store);

    shifts.set_shift("w1", ShiftState::On).await.expect("shift on");
    reconciler.reassign("t1", "w1").await.expect("reassign");

    // w2 messages t1 directly: activity is recorded, then ownership moves.
    recorder
        .record("w2", "t1", Utc::now())
        .await
        .expect("record");
    reconciler.reassign("t1", "w2").await.expect("takeover");

    let owner = store
        .find_assignment_by_traveler("t1")
        .await
        .expect("find")
        .expect("t1 has an owner");
    assert_eq!(owner.wizard_id, "w2");

    // The takeover forced w2 on-shift even though they never toggled.
    assert_eq!(owner.shift, ShiftState::On);
}

#[tokio::test]
async fn test_reassignment_forces_receiving_wizard_on_shift() {
    let (store, _tmp) = fresh_store().await;
    let (_, reconciler, shifts, _) = components(&store);

    // w1 never shifted on; the assignment alone activates them.
    reconciler.reassign("t1", "w1").await.expect("reassign");

    let rows = store.find_assignments_by_wizard("w1").await.expect("find");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].shift, ShiftState::On);

    // A later explicit shift-on sees the active row and declines.
    let outcome = shifts.set_shift("w1", ShiftState::On).await.expect("shift on");
    assert_eq!(outcome, ShiftOutcome::AlreadyActive);
}

#[tokio::test]
async fn test_activity_ttl_boundary() {
    let (store, _tmp) = fresh_store().await;
    let (recorder, _, _, _) = components(&store);

    let now = Utc::now();
    store
        .upsert_activity("t_stale", "w1", now - TimeDelta::minutes(11))
        .await
        .expect("upsert");
    store
        .upsert_activity("t_fresh", "w1", now - TimeDelta::minutes(9))
        .await
        .expect("upsert");

    recorder.evict_expired(now).await.expect("evict");

    let live = store
        .travelers_active_with(&["w1".to_string()])
        .await
        .expect("query");
    assert_eq!(live, vec!["t_fresh".to_string()]);

    // Eviction is idempotent.
    recorder.evict_expired(now).await.expect("evict");
    let live = store
        .travelers_active_with(&["w1".to_string()])
        .await
        .expect("query");
    assert_eq!(live, vec!["t_fresh".to_string()]);
}

#[tokio::test]
async fn test_activity_upsert_keeps_one_entry_per_traveler() {
    let (store, _tmp) = fresh_store().await;
    let (recorder, _, _, _) = components(&store);

    recorder.record("w1", "t1", Utc::now()).await.expect("record");
    recorder.record("w2", "t1", Utc::now()).await.expect("record");

    // The entry followed the latest wizard; w1 no longer shows t1.
    let with_w1 = store
        .travelers_active_with(&["w1".to_string()])
        .await
        .expect("query");
    assert!(with_w1.is_empty());
    let with_w2 = store
        .travelers_active_with(&["w2".to_string()])
        .await
        .expect("query");
    assert_eq!(with_w2, vec!["t1".to_string()]);

    let entry = store
        .find_activity_by_traveler("t1")
        .await
        .expect("find")
        .expect("t1 has a live entry");
    assert_eq!(entry.wizard_id, "w2");
}

#[tokio::test]
async fn test_stale_timestamp_is_adopted() {
    let (store, _tmp) = fresh_store().await;
    let (recorder, _, _, _) = components(&store);

    recorder.record("w1", "t1", Utc::now()).await.expect("record");

    // An older timestamp overwrites the newer one; the recorder adopts
    // whatever the caller supplies.
    let stale = Utc::now() - TimeDelta::minutes(5);
    recorder.record("w1", "t1", stale).await.expect("record");

    let entry = store
        .find_activity_by_traveler("t1")
        .await
        .expect("find")
        .expect("t1 has a live entry");
    assert_eq!(entry.occurred_at, stale.trunc_subsecs(6));
}

#[tokio::test]
async fn test_store_assignment_crud() {
    let (store, _tmp) = fresh_store().await;

    store
        .insert_assignment(&AssignmentRow {
            wizard_id: "w1".to_string(),
            traveler_id: Some("t1".to_string()),
            shift: ShiftState::On,
        })
        .await
        .expect("insert");

    let row = store
        .find_assignment_by_traveler("t1")
        .await
        .expect("find")
        .expect("row exists");
    assert_eq!(row.wizard_id, "w1");
    assert_eq!(row.traveler_id.as_deref(), Some("t1"));

    store
        .delete_assignment_by_traveler("t1")
        .await
        .expect("delete");
    assert!(store
        .find_assignment_by_traveler("t1")
        .await
        .expect("find")
        .is_none());
}

#[tokio::test]
async fn test_shift_on_is_idempotent() {
    let (store, _tmp) = fresh_store().await;
    let (_, _, shifts, _) = components(&store);

    let first = shifts.set_shift("w1", ShiftState::On).await.expect("shift on");
    assert_eq!(first, ShiftOutcome::Activated);

    let second = shifts.set_shift("w1", ShiftState::On).await.expect("shift on");
    assert_eq!(second, ShiftOutcome::AlreadyActive);

    let rows = store.find_assignments_by_wizard("w1").await.expect("find");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].traveler_id, None);
    assert_eq!(rows[0].shift, ShiftState::On);
}

#[tokio::test]
async fn test_shift_off_is_absorbing() {
    let (store, _tmp) = fresh_store().await;
    let (_, reconciler, shifts, _) = components(&store);

    shifts.set_shift("w1", ShiftState::On).await.expect("shift on");
    reconciler.reassign("t1", "w1").await.expect("reassign");

    let first = shifts.set_shift("w1", ShiftState::Off).await.expect("shift off");
    assert_eq!(first, ShiftOutcome::Deactivated);
    assert!(store
        .find_assignments_by_wizard("w1")
        .await
        .expect("find")
        .is_empty());

    // Going off again is a no-op, not an error.
    let second = shifts.set_shift("w1", ShiftState::Off).await.expect("shift off");
    assert_eq!(second, ShiftOutcome::Deactivated);
    assert!(store
        .find_assignments_by_wizard("w1")
        .await
        .expect("find")
        .is_empty());
}

#[tokio::test]
async fn test_overload_threshold_boundary() {
    let (store, _tmp) = fresh_store().await;
    let (recorder, reconciler, shifts, monitor) = components(&store);

    shifts.set_shift("w1", ShiftState::On).await.expect("shift on");

    // Exactly 3 owned travelers: not overloaded.
    for traveler in ["t1", "t2", "t3"] {
        recorder.record("w1", traveler, Utc::now()).await.expect("record");
        reconciler.reassign(traveler, "w1").await.expect("reassign");
    }
    assert!(monitor.compute_overload().await.expect("overload").is_empty());

    // A fourth pushes the count past the threshold.
    recorder.record("w1", "t4", Utc::now()).await.expect("record");
    reconciler.reassign("t4", "w1").await.expect("reassign");

    let overloaded = monitor.compute_overload().await.expect("overload");
    assert_eq!(
        overloaded,
        vec!["t1".to_string(), "t2".to_string(), "t3".to_string(), "t4".to_string()]
    );
}

#[tokio::test]
async fn test_shift_off_clears_overload() {
    let (store, _tmp) = fresh_store().await;
    let (recorder, reconciler, shifts, monitor) = components(&store);

    for traveler in ["t1", "t2", "t3", "t4"] {
        recorder.record("w1", traveler, Utc::now()).await.expect("record");
        reconciler.reassign(traveler, "w1").await.expect("reassign");
    }
    assert!(!monitor.compute_overload().await.expect("overload").is_empty());

    shifts.set_shift("w1", ShiftState::Off).await.expect("shift off");
    assert!(monitor.compute_overload().await.expect("overload").is_empty());
}

#[tokio::test]
async fn test_full_scenario() {
    let (store, _tmp) = fresh_store().await;
    let (recorder, reconciler, shifts, monitor) = components(&store);

    // A shifts on and T1 messages them.
    shifts.set_shift("wa", ShiftState::On).await.expect("shift on");
    recorder.record("wa", "t1", Utc::now()).await.expect("record");
    reconciler.reassign("t1", "wa").await.expect("takeover");

    // Admin reassigns T1 to B.
    reconciler.reassign("t1", "wb").await.expect("reassign");
    let owner = store
        .find_assignment_by_traveler("t1")
        .await
        .expect("find")
        .expect("t1 owned");
    assert_eq!(owner.wizard_id, "wb");

    // A keeps their unassigned on-shift row.
    let wa_rows = store.find_assignments_by_wizard("wa").await.expect("find");
    assert_eq!(wa_rows.len(), 1);
    assert_eq!(wa_rows[0].traveler_id, None);

    // B exchanges messages with four more travelers while on-shift.
    for traveler in ["t2", "t3", "t4", "t5"] {
        recorder.record("wb", traveler, Utc::now()).await.expect("record");
        reconciler.reassign(traveler, "wb").await.expect("takeover");
    }

    // B owns five travelers; only the four with recent activity against B
    // are reported (T1's activity entry still names A).
    let overloaded = monitor.compute_overload().await.expect("overload");
    assert_eq!(
        overloaded,
        vec!["t2".to_string(), "t3".to_string(), "t4".to_string(), "t5".to_string()]
    );
}

#[tokio::test]
async fn test_in_memory_store() {
    let config = DatabaseConfig::for_test("sqlite://");
    let store = Store::new(&config).await.expect("Store::new");
    store.run_migrations().await.expect("run_migrations");

    let store = Arc::new(store);
    let reconciler = AssignmentReconciler::new(store.clone());
    reconciler.reassign("mem_t1", "mem_w1").await.expect("reassign");

    let owner = store
        .find_assignment_by_traveler("mem_t1")
        .await
        .expect("find")
        .expect("owned");
    assert_eq!(owner.wizard_id, "mem_w1");
}
