//! Shared references and cycles.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use gencodec::{EncodeOptions, EncodeSession, Error};
use gencodec_integration_test::{
    Address, Counters, Household, Node, registry_v1, roundtrip,
};

fn shared_household() -> Household {
    let address = Rc::new(RefCell::new(Address {
        street: "Elm".to_owned(),
        number: 12,
    }));
    Household { first: Some(address.clone()), second: Some(address) }
}

#[test]
fn ring_roundtrips_with_tracking() {
    let registry = registry_v1();
    let ring = Node::ring(3);

    let decoded = roundtrip(&registry, true, &ring).unwrap();

    let mut values = Vec::new();
    let mut current = decoded.clone();
    for _ in 0..4 {
        values.push(current.borrow().value);
        let next = current.borrow().next.clone().unwrap();
        current = next;
    }
    assert_eq!(values, [0, 1, 2, 0]);
    assert!(Rc::ptr_eq(&current, &decoded.borrow().next.clone().unwrap()));

    Node::break_ring(&ring);
    Node::break_ring(&decoded);
}

#[test]
fn self_loop_roundtrips_with_tracking() {
    let registry = registry_v1();
    let node = Node::ring(1);

    let decoded = roundtrip(&registry, true, &node).unwrap();
    let next = decoded.borrow().next.clone().unwrap();
    assert!(Rc::ptr_eq(&next, &decoded));

    Node::break_ring(&node);
    Node::break_ring(&decoded);
}

#[test]
fn ring_without_tracking_hits_the_depth_limit() {
    let registry = registry_v1();
    let ring = Node::ring(2);

    let options = EncodeOptions::builder().max_depth(64).build();
    let mut session =
        EncodeSession::with_options(Vec::new(), &registry, options);
    let result = session.encode(&ring);

    assert!(matches!(result, Err(Error::DepthLimitExceeded { max_depth: 64 })));
    assert!(session.get_ref().is_empty());

    Node::break_ring(&ring);
}

#[test]
fn sharing_is_preserved_with_tracking() {
    let registry = registry_v1();

    let decoded = roundtrip(&registry, true, &shared_household()).unwrap();
    let first = decoded.first.unwrap();
    let second = decoded.second.unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    first.borrow_mut().number = 13;
    assert_eq!(second.borrow().number, 13);
}

#[test]
fn sharing_is_dropped_without_tracking() {
    let registry = registry_v1();

    let decoded = roundtrip(&registry, false, &shared_household()).unwrap();
    let first = decoded.first.unwrap();
    let second = decoded.second.unwrap();
    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(*first.borrow(), *second.borrow());
}

#[test]
fn tracked_stream_is_smaller() {
    let registry = registry_v1();
    let household = shared_household();

    let encode = |track_pointers| {
        let options =
            EncodeOptions::builder().track_pointers(track_pointers).build();
        let mut session =
            EncodeSession::with_options(Vec::new(), &registry, options);
        session.encode(&household).unwrap();
        session.into_inner().len()
    };

    assert!(encode(true) < encode(false));
}

#[test]
fn arc_rwlock_sharing() {
    let registry = registry_v1();
    let shared = Arc::new(parking_lot::RwLock::new(7));
    let counters = Counters { hits: shared.clone(), misses: shared };

    let decoded = roundtrip(&registry, true, &counters).unwrap();
    assert!(Arc::ptr_eq(&decoded.hits, &decoded.misses));
    assert_eq!(*decoded.hits.read(), 7);

    let decoded = roundtrip(&registry, false, &counters).unwrap();
    assert!(!Arc::ptr_eq(&decoded.hits, &decoded.misses));
}
