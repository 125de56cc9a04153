//! Id hash integration tests

use weakling::{Heap, IdHash, ObjectId};

/// Ids map back to their objects.
#[test]
fn test_holds_mappings_from_id_to_object() {
    let heap = Heap::new();
    let mut hash = IdHash::new();
    let objects: Vec<_> = (0..10).map(|i| heap.alloc(format!("object-{}", i))).collect();
    let mut ids: Vec<ObjectId> = objects.iter().map(|o| hash.add(o)).collect();

    ids.sort();
    let mut expected: Vec<_> = objects.iter().map(|o| o.id()).collect();
    expected.sort();
    assert_eq!(ids, expected);

    let entries: Vec<_> = hash
        .entries()
        .into_iter()
        .map(|(id, object)| (id, (*object).clone()))
        .collect();
    let mut expected: Vec<_> = objects.iter().map(|o| (o.id(), (**o).clone())).collect();
    expected.sort();
    assert_eq!(entries, expected);
}

/// The hash does not keep its objects alive.
#[test]
fn test_weakly_references_the_objects() {
    let heap = Heap::new();
    let mut hash = IdHash::new();
    let objects: Vec<_> = (0..10).map(|i| heap.alloc(i)).collect();
    let ids: Vec<_> = objects.iter().map(|o| hash.add(o)).collect();
    drop(objects);

    heap.collect();

    assert!(hash.entries().is_empty());
    assert!(hash.is_empty());
    for id in ids {
        assert!(hash.get(id).is_none());
    }
}

/// Survivors stay while dead neighbours are cleaned up.
#[test]
fn test_partial_reclaim() {
    let heap = Heap::new();
    let mut hash = IdHash::new();
    let keep = heap.alloc(1);
    let lose = heap.alloc(2);
    let keep_id = hash.add(&keep);
    let lose_id = hash.add(&lose);

    drop(lose);
    heap.collect();

    assert_eq!(hash.cleanup(), 1);
    assert_eq!(hash.len(), 1);
    assert_eq!(hash.get(keep_id).map(|o| *o), Some(1));
    assert!(hash.get(lose_id).is_none());
}
