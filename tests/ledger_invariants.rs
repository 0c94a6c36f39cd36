//! Ledger invariant tests
//!
//! The one hard guarantee in this system: for any student, after any sequence
//! of record/amend/expunge calls, the aggregate total equals the sum of
//! points over their live violations. These tests pin that property, the
//! reversal and delta laws, and the cascade accounting, against a real
//! on-disk database.

use proptest::prelude::*;
use tatib::db::{Database, DbError};
use tatib::ledger::ViolationUpdate;
use tatib::query::SearchFilter;
use tatib::EntityKind;
use tempfile::TempDir;

/// Fresh database in a temp dir, plus one category/type/student fixture
struct Fixture {
    _dir: TempDir,
    db: Database,
    category_id: i32,
    type_id: i32,
    student_id: i32,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let db = Database::open_at(dir.path().join("tatib.db")).expect("open db");

    let category_id = db.create_category("Discipline", None).unwrap();
    let type_id = db
        .create_type(category_id, "Terlambat", Some("Late for class"), 5)
        .unwrap();
    let student_id = db.add_student("1024", "Aminah", Some("7A")).unwrap();

    Fixture {
        _dir: dir,
        db,
        category_id,
        type_id,
        student_id,
    }
}

/// Recompute the sum the slow way and compare with the stored aggregate
fn assert_sum_invariant(db: &Database, student_id: i32) {
    let from_rows: i32 = db
        .list_for_student(student_id)
        .unwrap()
        .iter()
        .map(|v| v.points)
        .sum();
    let aggregate = db.points_for_student(student_id).unwrap();
    assert_eq!(
        aggregate, from_rows,
        "aggregate must equal sum of live violations"
    );
}

// =============================================================================
// Concrete scenarios
// =============================================================================

#[test]
fn test_record_defaults_points_from_type() {
    let f = fixture();

    let v = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-17", None, None, None)
        .unwrap();
    assert_eq!(v.points, 5);
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 5);
    assert_sum_invariant(&f.db, f.student_id);
}

#[test]
fn test_explicit_points_override_default() {
    let f = fixture();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-17", None, None, None)
        .unwrap();
    let v2 = f
        .db
        .record_violation(
            f.student_id,
            f.type_id,
            "2026-08-18",
            Some(10),
            Some("Parent called"),
            None,
        )
        .unwrap();
    assert_eq!(v2.points, 10);
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 15);
}

#[test]
fn test_amend_applies_delta() {
    let f = fixture();
    let v1 = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-17", None, None, None)
        .unwrap();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-18", Some(10), None, None)
        .unwrap();

    // 5 -> 2: total moves by exactly -3
    let amended = f
        .db
        .amend_violation(
            v1.id,
            ViolationUpdate {
                points: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(amended.points, 2);
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 12);
    assert_sum_invariant(&f.db, f.student_id);
}

#[test]
fn test_expunge_reverses_recorded_points() {
    let f = fixture();
    let v1 = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-17", Some(2), None, None)
        .unwrap();
    let v2 = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-18", Some(10), None, None)
        .unwrap();

    f.db.expunge_violation(v2.id).unwrap();
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 2);

    f.db.expunge_violation(v1.id).unwrap();
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 0);
    assert_sum_invariant(&f.db, f.student_id);
}

#[test]
fn test_record_unknown_type_leaves_no_partial_effect() {
    let f = fixture();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-17", Some(2), None, None)
        .unwrap();

    let err = f
        .db
        .record_violation(f.student_id, 9999, "2026-08-19", None, None, None)
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));

    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 2);
    assert_eq!(f.db.list_for_student(f.student_id).unwrap().len(), 1);
}

#[test]
fn test_record_unknown_student_leaves_no_partial_effect() {
    let f = fixture();
    let err = f
        .db
        .record_violation(9999, f.type_id, "2026-08-19", None, None, None)
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
    assert!(f.db.points_for_student(9999).is_err());
}

// =============================================================================
// Laws
// =============================================================================

#[test]
fn test_reversal_law() {
    let f = fixture();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-01", Some(7), None, None)
        .unwrap();
    let before = f.db.points_for_student(f.student_id).unwrap();

    let v = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-02", Some(13), None, None)
        .unwrap();
    f.db.expunge_violation(v.id).unwrap();

    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), before);
}

#[test]
fn test_delta_law_ignores_current_default() {
    let f = fixture();
    let v = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-17", None, None, None)
        .unwrap();
    assert_eq!(v.points, 5);

    // Drift the taxonomy before the amend
    f.db.update_type(f.type_id, None, None, Some(50)).unwrap();

    f.db.amend_violation(
        v.id,
        ViolationUpdate {
            points: Some(8),
            ..Default::default()
        },
    )
    .unwrap();

    // 5 -> 8 is +3 regardless of the new default of 50
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 8);
}

#[test]
fn test_recorded_points_immune_to_taxonomy_drift() {
    let f = fixture();
    let v = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-17", None, None, None)
        .unwrap();

    f.db.update_type(f.type_id, Some("Terlambat Berat"), None, Some(25))
        .unwrap();

    let reloaded = f.db.get_violation(v.id).unwrap();
    assert_eq!(reloaded.points, 5);
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 5);

    // New recordings pick up the drifted default
    f.db.record_violation(f.student_id, f.type_id, "2026-08-18", None, None, None)
        .unwrap();
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 30);
}

#[test]
fn test_double_expunge_reports_not_found_not_double_decrement() {
    let f = fixture();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-01", Some(4), None, None)
        .unwrap();
    let v = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-02", Some(6), None, None)
        .unwrap();

    f.db.expunge_violation(v.id).unwrap();
    let err = f.db.expunge_violation(v.id).unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 4);
}

#[test]
fn test_amend_non_point_fields_leaves_aggregate_alone() {
    let f = fixture();
    let v = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-17", Some(5), None, None)
        .unwrap();

    let amended = f
        .db
        .amend_violation(
            v.id,
            ViolationUpdate {
                violation_date: Some("2026-08-20".to_string()),
                action_taken: Some(Some("Warned".to_string())),
                notes: Some(Some("Second time this month".to_string())),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(amended.violation_date, "2026-08-20");
    assert_eq!(amended.action_taken.as_deref(), Some("Warned"));
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 5);
}

#[test]
fn test_amend_clears_action_and_notes() {
    let f = fixture();
    let v = f
        .db
        .record_violation(
            f.student_id,
            f.type_id,
            "2026-08-17",
            None,
            Some("Warned"),
            Some("First offense"),
        )
        .unwrap();

    // Clearing one field leaves the other untouched
    let amended = f
        .db
        .amend_violation(
            v.id,
            ViolationUpdate {
                notes: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(amended.action_taken.as_deref(), Some("Warned"));
    assert!(amended.notes.is_none());

    let amended = f
        .db
        .amend_violation(
            v.id,
            ViolationUpdate {
                action_taken: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(amended.action_taken.is_none());
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 5);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_validation_errors() {
    let f = fixture();

    let err = f
        .db
        .record_violation(f.student_id, f.type_id, "17/08/2026", None, None, None)
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));

    let err = f
        .db
        .record_violation(f.student_id, f.type_id, "2026-08-17", Some(-5), None, None)
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));

    let err = f.db.create_category("   ", None).unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));

    let err = f.db.create_type(f.category_id, "Bolos", None, -1).unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
}

// =============================================================================
// Cascade accounting
// =============================================================================

#[test]
fn test_delete_category_cascades_and_rewinds_aggregates() {
    let f = fixture();
    let other_student = f.db.add_student("1025", "Budi", Some("7B")).unwrap();
    let bolos = f.db.create_type(f.category_id, "Bolos", None, 10).unwrap();

    let keep_category = f.db.create_category("Uniform", None).unwrap();
    let keep_type = f.db.create_type(keep_category, "No tie", None, 1).unwrap();

    f.db.record_violation(f.student_id, f.type_id, "2026-08-01", None, None, None)
        .unwrap(); // 5
    f.db.record_violation(f.student_id, bolos, "2026-08-02", None, None, None)
        .unwrap(); // 10
    f.db.record_violation(other_student, bolos, "2026-08-03", Some(12), None, None)
        .unwrap();
    f.db.record_violation(f.student_id, keep_type, "2026-08-04", None, None, None)
        .unwrap(); // survives

    let summary = f.db.delete_category(f.category_id).unwrap();
    assert_eq!(summary.types_removed, 2);
    assert_eq!(summary.violations_removed, 3);

    // Only the surviving category's violation still counts
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 1);
    assert_eq!(f.db.points_for_student(other_student).unwrap(), 0);
    assert_sum_invariant(&f.db, f.student_id);
    assert_sum_invariant(&f.db, other_student);

    assert!(f.db.get_category(f.category_id).is_err());
    assert!(f.db.get_type(f.type_id).is_err());
    assert!(f.db.get_type(keep_type).is_ok());
}

#[test]
fn test_delete_empty_category() {
    let f = fixture();
    let empty = f.db.create_category("Unused", None).unwrap();
    let summary = f.db.delete_category(empty).unwrap();
    assert_eq!(summary.types_removed, 0);
    assert_eq!(summary.violations_removed, 0);

    let err = f.db.delete_category(empty).unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[test]
fn test_delete_type_cascades_its_violations_only() {
    let f = fixture();
    let bolos = f.db.create_type(f.category_id, "Bolos", None, 10).unwrap();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-01", None, None, None)
        .unwrap(); // 5
    f.db.record_violation(f.student_id, bolos, "2026-08-02", None, None, None)
        .unwrap(); // 10

    let summary = f.db.delete_type(bolos).unwrap();
    assert_eq!(summary.violations_removed, 1);
    assert_eq!(f.db.points_for_student(f.student_id).unwrap(), 5);
    assert_sum_invariant(&f.db, f.student_id);
}

#[test]
fn test_remove_student_drops_their_ledger() {
    let f = fixture();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-01", None, None, None)
        .unwrap();
    let removed = f.db.remove_student(f.student_id).unwrap();
    assert_eq!(removed, 1);
    assert!(f.db.points_for_student(f.student_id).is_err());
    assert!(f.db.list_students().unwrap().is_empty());

    let err = f.db.remove_student(f.student_id).unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_list_for_student_orders_by_date_desc() {
    let f = fixture();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-02", Some(1), None, None)
        .unwrap();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-10", Some(2), None, None)
        .unwrap();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-05", Some(3), None, None)
        .unwrap();

    let dates: Vec<String> = f
        .db
        .list_for_student(f.student_id)
        .unwrap()
        .into_iter()
        .map(|v| v.violation_date)
        .collect();
    assert_eq!(dates, vec!["2026-08-10", "2026-08-05", "2026-08-02"]);
}

#[test]
fn test_search_filters_and_paginates() {
    let f = fixture();
    let budi = f.db.add_student("1025", "Budi", None).unwrap();
    let bolos = f.db.create_type(f.category_id, "Bolos", None, 10).unwrap();

    for day in 1..=7 {
        f.db.record_violation(
            f.student_id,
            f.type_id,
            &format!("2026-08-{:02}", day),
            None,
            None,
            None,
        )
        .unwrap();
    }
    f.db.record_violation(budi, bolos, "2026-08-09", None, None, None)
        .unwrap();

    // Pagination over everything
    let page1 = f
        .db
        .search_violations(&SearchFilter::default(), 1, 5)
        .unwrap();
    assert_eq!(page1.meta.total_items, 8);
    assert_eq!(page1.meta.total_pages, 2);
    assert_eq!(page1.items.len(), 5);

    let page2 = f
        .db
        .search_violations(&SearchFilter::default(), 2, 5)
        .unwrap();
    assert_eq!(page2.items.len(), 3);
    assert_eq!(page2.meta.current_page, 2);

    // Free text matches student name or type name
    let by_student = f
        .db
        .search_violations(
            &SearchFilter {
                q: Some("Budi".to_string()),
                ..Default::default()
            },
            1,
            20,
        )
        .unwrap();
    assert_eq!(by_student.meta.total_items, 1);
    assert_eq!(by_student.items[0].type_name, "Bolos");

    let by_type = f
        .db
        .search_violations(
            &SearchFilter {
                q: Some("Terlambat".to_string()),
                ..Default::default()
            },
            1,
            20,
        )
        .unwrap();
    assert_eq!(by_type.meta.total_items, 7);

    // Date range is inclusive on both ends
    let ranged = f
        .db
        .search_violations(
            &SearchFilter {
                from: Some("2026-08-03".to_string()),
                to: Some("2026-08-05".to_string()),
                ..Default::default()
            },
            1,
            20,
        )
        .unwrap();
    assert_eq!(ranged.meta.total_items, 3);
}

#[test]
fn test_recap_ranks_by_total() {
    let f = fixture();
    let budi = f.db.add_student("1025", "Budi", None).unwrap();
    f.db.record_violation(f.student_id, f.type_id, "2026-08-01", Some(3), None, None)
        .unwrap();
    f.db.record_violation(budi, f.type_id, "2026-08-01", Some(9), None, None)
        .unwrap();

    let recap = f.db.point_recap().unwrap();
    assert_eq!(recap.len(), 2);
    assert_eq!(recap[0].student_name, "Budi");
    assert_eq!(recap[0].total, 9);
    assert_eq!(recap[1].total, 3);
}

// =============================================================================
// Account linking
// =============================================================================

#[test]
fn test_account_link_uniqueness_both_directions() {
    let f = fixture();
    f.db.link_account(EntityKind::Student, f.student_id, 77).unwrap();

    // Same entity, second account
    let err = f
        .db
        .link_account(EntityKind::Student, f.student_id, 88)
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));

    // Same account, second entity
    let err = f.db.link_account(EntityKind::Employee, 5, 77).unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));

    let link = f
        .db
        .account_for(EntityKind::Student, f.student_id)
        .unwrap()
        .expect("link exists");
    assert_eq!(link.account_id, 77);

    f.db.unlink_account(EntityKind::Student, f.student_id).unwrap();
    assert!(f
        .db
        .account_for(EntityKind::Student, f.student_id)
        .unwrap()
        .is_none());
}

// =============================================================================
// Property: the sum invariant survives arbitrary op sequences
// =============================================================================

#[derive(Debug, Clone)]
enum LedgerOp {
    Record(i32),
    Amend(usize, i32),
    Expunge(usize),
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (0..50i32).prop_map(LedgerOp::Record),
        ((0..16usize), (0..50i32)).prop_map(|(i, p)| LedgerOp::Amend(i, p)),
        (0..16usize).prop_map(LedgerOp::Expunge),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_sum_invariant_over_op_sequences(ops in proptest::collection::vec(ledger_op(), 1..24)) {
        let f = fixture();
        let mut live: Vec<i32> = Vec::new();

        for op in ops {
            match op {
                LedgerOp::Record(points) => {
                    let v = f
                        .db
                        .record_violation(f.student_id, f.type_id, "2026-08-17", Some(points), None, None)
                        .unwrap();
                    live.push(v.id);
                }
                LedgerOp::Amend(idx, points) => {
                    if !live.is_empty() {
                        let id = live[idx % live.len()];
                        f.db.amend_violation(
                            id,
                            ViolationUpdate { points: Some(points), ..Default::default() },
                        )
                        .unwrap();
                    }
                }
                LedgerOp::Expunge(idx) => {
                    if !live.is_empty() {
                        let id = live.remove(idx % live.len());
                        f.db.expunge_violation(id).unwrap();
                    }
                }
            }

            assert_sum_invariant(&f.db, f.student_id);
        }
    }
}
