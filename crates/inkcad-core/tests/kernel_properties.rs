//! End-to-end behaviour of the kernel over a real SQLite backend.

use inkcad_core::{
    Entity, EntityKind, EntityState, HistoryStep, Kernel, KernelConfig, KernelError, Layer, Point,
    Segment, Style, VersionRow,
};
use std::cell::RefCell;
use std::rc::Rc;

fn point(x: f64, y: f64) -> Entity {
    Entity::from(Point::new(x, y))
}

fn current_point(kernel: &Kernel, id: i64) -> Option<(f64, f64)> {
    kernel
        .load_entity(id)
        .unwrap()
        .and_then(|entity| entity.as_point().map(|p| (p.x, p.y)))
}

fn visible_rows(kernel: &Kernel) -> usize {
    EntityKind::ALL
        .iter()
        .map(|kind| kernel.entities_of_kind(*kind).unwrap().len())
        .sum()
}

#[test]
fn test_save_then_get_roundtrips_payload() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let mut entities = vec![
        point(1.5, -2.0),
        Entity::from(Segment::new(kurbo::Point::new(0.0, 0.0), kurbo::Point::new(3.0, 4.0))),
        Entity::from(Style::new("dashed").with_line_width(0.25)),
        Entity::from(Layer::new("walls")),
    ];

    for entity in &mut entities {
        let row = kernel.save(entity).unwrap();
        let fetched = kernel.get_entity(row.entity_id).unwrap().unwrap();
        assert_eq!(fetched.payload, entity.to_payload().unwrap());
        assert_eq!(fetched.kind, entity.kind());
        assert_eq!(kernel.load_entity(row.entity_id).unwrap().as_ref(), Some(&*entity));
    }
}

#[test]
fn test_undo_walks_back_through_saves() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let mut p = point(0.0, 0.0);
    let n = 6;
    for i in 0..n {
        if let Entity::Point(inner) = &mut p {
            inner.x = i as f64;
        }
        kernel.save(&mut p).unwrap();
    }
    let id = p.id().unwrap();

    for expected in (0..n - 1).rev() {
        assert!(kernel.undo().unwrap().moved());
        let (x, _) = current_point(&kernel, id).unwrap();
        assert!((x - expected as f64).abs() < f64::EPSILON);
    }
    assert_eq!(kernel.undo().unwrap(), HistoryStep::Exhausted);
    assert_eq!(kernel.active_generation(), 1);
}

#[test]
fn test_undo_then_redo_restores_version() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let mut p = point(0.0, 0.0);
    kernel.save(&mut p).unwrap();
    if let Entity::Point(inner) = &mut p {
        inner.y = 9.0;
    }
    kernel.save(&mut p).unwrap();
    kernel.save(&mut point(4.0, 4.0)).unwrap();

    let id = p.id().unwrap();
    let before = kernel.get_entity(id).unwrap();
    kernel.undo().unwrap();
    kernel.redo().unwrap();
    assert_eq!(kernel.get_entity(id).unwrap(), before);
    assert_eq!(kernel.redo().unwrap(), HistoryStep::Exhausted);
}

#[test]
fn test_save_after_undo_discards_undone_branch() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let mut a = point(1.0, 0.0);
    kernel.save(&mut a).unwrap();
    if let Entity::Point(inner) = &mut a {
        inner.x = 2.0;
    }
    kernel.save(&mut a).unwrap();
    let id_a = a.id().unwrap();
    kernel.undo().unwrap();

    let mut b = point(9.0, 9.0);
    assert_eq!(kernel.save(&mut b).unwrap().generation, 3);
    let id_b = b.id().unwrap();

    assert_eq!(kernel.undo().unwrap(), HistoryStep::Moved { from: 3, to: 1 });
    assert_eq!(current_point(&kernel, id_a), Some((1.0, 0.0)));
    assert_eq!(current_point(&kernel, id_b), None);

    assert_eq!(kernel.redo().unwrap(), HistoryStep::Moved { from: 1, to: 3 });
    assert_eq!(current_point(&kernel, id_a), Some((1.0, 0.0)));
    assert_eq!(current_point(&kernel, id_b), Some((9.0, 9.0)));
    assert_eq!(kernel.redo().unwrap(), HistoryStep::Exhausted);

    // The abandoned x=2 version never comes back.
    assert_eq!(kernel.show_entity(id_a).unwrap().generation, 1);
    assert_eq!(current_point(&kernel, id_a), Some((1.0, 0.0)));
}

#[test]
fn test_show_and_hide_leave_deleted_entity_deleted() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let saved = kernel.save(&mut point(3.0, 3.0)).unwrap();
    let tombstone = kernel.delete_entity(saved.entity_id).unwrap();

    assert!(matches!(
        kernel.hide_entity(saved.entity_id),
        Err(KernelError::UnknownEntity(_))
    ));
    let current = kernel.get_entity(saved.entity_id).unwrap().unwrap();
    assert_eq!(current.version_id, tombstone.version_id);
    assert!(current.is_tombstone());

    assert!(matches!(
        kernel.show_entity(saved.entity_id),
        Err(KernelError::UnknownEntity(_))
    ));
    assert!(kernel.load_entity(saved.entity_id).unwrap().is_none());
    assert!(kernel.history(saved.entity_id).unwrap().iter().all(|row| row.visible));
}

#[test]
fn test_entity_ids_never_repeat_across_kinds() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let mut seen = Vec::new();
    for i in 0..4 {
        let f = i as f64;
        let mut batch = [
            point(f, f),
            Entity::from(Layer::new(format!("layer-{i}"))),
            Entity::from(Segment::new(kurbo::Point::new(f, 0.0), kurbo::Point::new(0.0, f))),
            Entity::from(Style::new(format!("style-{i}"))),
        ];
        for entity in &mut batch {
            seen.push(kernel.save(entity).unwrap().entity_id);
        }
    }

    let mut unique = seen.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), seen.len());
    assert_eq!(seen.first(), Some(&0));
}

#[test]
fn test_bulk_failure_leaves_no_visible_rows() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    kernel.save(&mut point(0.0, 0.0)).unwrap();
    let baseline = visible_rows(&kernel);
    kernel
        .backend()
        .execute_batch(
            "CREATE TEMP TRIGGER reject_far_points BEFORE INSERT ON entity_versions
             WHEN NEW.bbox_xmin > 100
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();

    kernel.start_bulk().unwrap();
    kernel.save(&mut point(1.0, 1.0)).unwrap();
    kernel.save(&mut point(2.0, 2.0)).unwrap();
    let err = kernel.save(&mut point(500.0, 500.0)).unwrap_err();
    assert!(matches!(err, KernelError::Storage(_)));

    assert!(!kernel.is_bulk_open());
    assert!(matches!(kernel.end_bulk(), Err(KernelError::NoBulkOpen)));
    assert_eq!(visible_rows(&kernel), baseline);
    assert_eq!(kernel.max_generation(), 1);
    assert!(!kernel.backend().in_transaction());
}

#[test]
fn test_bulk_success_shares_one_generation_and_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bulk.sqlite");
    let mut kernel = Kernel::open(KernelConfig::with_database(&path)).unwrap();
    let observer = rusqlite::Connection::open(&path).unwrap();
    let committed = |conn: &rusqlite::Connection| -> i64 {
        conn.query_row("SELECT COUNT(*) FROM entity_versions", [], |row| row.get(0))
            .unwrap()
    };

    let generation = kernel.start_bulk().unwrap();
    for i in 0..5 {
        kernel.save(&mut point(i as f64, 0.0)).unwrap();
    }
    assert_eq!(committed(&observer), 0);

    let rows = kernel.end_bulk().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row.generation == generation));
    assert_eq!(committed(&observer), 5);

    // The whole batch undoes as one unit.
    assert_eq!(kernel.undo().unwrap(), HistoryStep::Exhausted);
    kernel.save(&mut point(9.0, 9.0)).unwrap();
    kernel.undo().unwrap();
    assert_eq!(kernel.entities_of_kind(EntityKind::Point).unwrap().len(), 5);
}

#[test]
fn test_two_point_undo_redo_scenario() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let mut p1 = point(1.0, 1.0);
    let mut p2 = point(2.0, 2.0);
    assert_eq!(kernel.save(&mut p1).unwrap().generation, 1);
    assert_eq!(kernel.save(&mut p2).unwrap().generation, 2);
    let (id1, id2) = (p1.id().unwrap(), p2.id().unwrap());

    assert_eq!(kernel.undo().unwrap(), HistoryStep::Moved { from: 2, to: 1 });
    assert_eq!(current_point(&kernel, id1), Some((1.0, 1.0)));
    assert_eq!(current_point(&kernel, id2), None);
    assert!(kernel.history(id2).unwrap().iter().all(|row| !row.visible));

    assert_eq!(kernel.undo().unwrap(), HistoryStep::Exhausted);

    assert_eq!(kernel.redo().unwrap(), HistoryStep::Moved { from: 1, to: 2 });
    assert_eq!(current_point(&kernel, id2), Some((2.0, 2.0)));
}

#[test]
fn test_delete_scenario() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    assert!(matches!(kernel.delete_entity(42), Err(KernelError::UnknownEntity(42))));

    let mut p = point(3.0, 3.0);
    let saved = kernel.save(&mut p).unwrap();
    let tombstone = kernel.delete_entity(saved.entity_id).unwrap();
    assert_eq!(tombstone.state, EntityState::Deleted);
    assert_eq!(tombstone.payload, saved.payload);

    let current = kernel.get_entity(saved.entity_id).unwrap().unwrap();
    assert!(current.is_tombstone());
    assert_eq!(current.version_id, tombstone.version_id);
    assert!(kernel.load_entity(saved.entity_id).unwrap().is_none());
    assert!(kernel.entities_of_kind(EntityKind::Point).unwrap().is_empty());

    // Deleting again writes nothing new.
    let again = kernel.delete_entity(saved.entity_id).unwrap();
    assert_eq!(again.version_id, tombstone.version_id);

    kernel.undo().unwrap();
    assert_eq!(current_point(&kernel, saved.entity_id), Some((3.0, 3.0)));
}

#[test]
fn test_delete_notifies_deleted_then_hidden() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let mut p = point(0.0, 0.0);
    kernel.save(&mut p).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let deleted = Rc::clone(&events);
    kernel.on_deleted(move |_, row: &VersionRow| {
        deleted.borrow_mut().push(("deleted", row.state));
        Ok(())
    });
    let hidden = Rc::clone(&events);
    kernel.on_hidden(move |_, row: &VersionRow| {
        hidden.borrow_mut().push(("hidden", row.state));
        Ok(())
    });

    kernel.delete_entity(p.id().unwrap()).unwrap();
    assert_eq!(
        *events.borrow(),
        vec![("deleted", EntityState::Deleted), ("hidden", EntityState::Deleted)]
    );
}

#[test]
fn test_panicking_observer_is_isolated() {
    let mut kernel = Kernel::open_in_memory().unwrap();
    let delivered = Rc::new(RefCell::new(0));
    kernel.on_saved(|_, _| panic!("observer crashed"));
    let sink = Rc::clone(&delivered);
    kernel.on_saved(move |_, _| {
        *sink.borrow_mut() += 1;
        Ok(())
    });

    let row = kernel.save(&mut point(1.0, 1.0)).unwrap();
    assert_eq!(*delivered.borrow(), 1);
    assert!(kernel.get_entity(row.entity_id).unwrap().is_some());
}

#[test]
fn test_reopen_restores_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("drawing.sqlite");

    let (id, style_id) = {
        let mut kernel = Kernel::open(KernelConfig::with_database(&path)).unwrap();
        let style = kernel.save(&mut Entity::from(Style::new("red"))).unwrap();
        let mut p = point(1.0, 1.0);
        kernel.save(&mut p).unwrap();
        if let Entity::Point(inner) = &mut p {
            inner.x = 5.0;
        }
        kernel.save(&mut p).unwrap();
        kernel.undo().unwrap();
        (p.id().unwrap(), style.entity_id)
    };

    let mut kernel = Kernel::open(KernelConfig::with_database(&path)).unwrap();
    assert_eq!(kernel.active_generation(), 2);
    assert_eq!(kernel.max_generation(), 3);
    assert_eq!(current_point(&kernel, id), Some((1.0, 1.0)));

    kernel.redo().unwrap();
    assert_eq!(current_point(&kernel, id), Some((5.0, 1.0)));

    let mut fresh = point(0.0, 0.0);
    kernel.save(&mut fresh).unwrap();
    assert!(fresh.id().unwrap() > id.max(style_id));
    assert_eq!(kernel.save(&mut point(0.0, 0.0)).unwrap().generation, 5);
}

#[test]
fn test_sessions_are_independent() {
    let mut a = Kernel::open_in_memory().unwrap();
    let mut b = Kernel::open_in_memory().unwrap();
    a.save(&mut point(0.0, 0.0)).unwrap();
    a.save(&mut point(1.0, 0.0)).unwrap();

    assert_eq!(b.save(&mut point(0.0, 0.0)).unwrap().generation, 1);
    assert_eq!(a.max_generation(), 2);
    assert_eq!(b.max_generation(), 1);
}
