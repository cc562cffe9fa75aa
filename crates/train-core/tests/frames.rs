//! Cross-frame scenarios on the in-memory page.
//!
//! Tests cover:
//! - Catalog handshake, same-origin and cross-origin
//! - Handshake idempotence
//! - Forwarding in both directions
//! - Private names at the frame boundary
//! - FAILED status reporting

use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use train_core::testing::Page;
use train_core::{HandshakeState, Listener, Train, TrainConfig};
use train_proto::{Error, EventEnvelope, EventSource, EventStatus};

const PORTAL: &str = "https://portal.example";
const WIDGETS: &str = "https://widgets.example";

fn recorder() -> (Listener, Rc<RefCell<Vec<EventEnvelope>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = Rc::clone(&seen);
    let listener: Listener = Rc::new(move |envelope: &EventEnvelope| {
        seen_clone.borrow_mut().push(envelope.clone());
        Ok(())
    });
    (listener, seen)
}

fn config(public: &[&str], private: &[&str], selectors: &[&str]) -> TrainConfig {
    let owned = |names: &[&str]| names.iter().map(|name| (*name).to_string()).collect();
    TrainConfig {
        public_events: owned(public),
        private_events: owned(private),
        frame_selectors: owned(selectors),
        ..TrainConfig::default()
    }
}

#[test]
fn test_same_origin_handshake_syncs_immediately() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(top.clone(), &config(&[], &[], &["cart-frame"])).unwrap();

    let frame = page.embed(&top, "cart-frame", PORTAL);
    let child = Train::bootstrap(frame, &config(&["shop/cart/item/add"], &[], &[])).unwrap();

    assert_eq!(child.handshake_state(), HandshakeState::Synced);
    assert_eq!(parent.handshake_state(), HandshakeState::Synced);
    assert!(parent.is_event_registered("shop/cart/item/add"));
    assert_eq!(page.pending(), 0);
}

#[test]
fn test_cross_origin_handshake_completes_through_messages() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(top.clone(), &config(&["portal/user/login"], &[], &["cart-frame"]))
        .unwrap();

    let frame = page.embed(&top, "cart-frame", WIDGETS);
    let child = Train::bootstrap(frame, &config(&["shop/cart/item/add"], &[], &[])).unwrap();

    assert_eq!(child.handshake_state(), HandshakeState::AwaitingAck);
    assert_eq!(page.pending(), 1);

    // frame catalog to parent, then the parent's acknowledgement
    assert_eq!(page.run_until_idle().unwrap(), 2);

    assert_eq!(child.handshake_state(), HandshakeState::Synced);
    assert!(parent.is_event_registered("shop/cart/item/add"));
    assert!(child.is_event_registered("portal/user/login"));
}

#[test]
fn test_repeated_catalog_does_not_duplicate_names() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(top.clone(), &config(&[], &[], &["cart-frame"])).unwrap();
    let frame = page.embed(&top, "cart-frame", WIDGETS);
    let child = Train::bootstrap(frame, &config(&["shop/cart/item/add"], &[], &[])).unwrap();
    page.run_until_idle().unwrap();

    child.register_public_events(["shop/cart/item/add"]).unwrap();
    page.run_until_idle().unwrap();

    let occurrences = parent
        .lookup_registered_event()
        .iter()
        .filter(|name| *name == "shop/cart/item/add")
        .count();
    assert_eq!(occurrences, 1);
    assert_eq!(parent.handshake_state(), HandshakeState::Synced);
}

#[test]
fn test_frame_event_reaches_parent_subscriber_once() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(top.clone(), &config(&[], &[], &["cart-frame"])).unwrap();
    let frame = page.embed(&top, "cart-frame", WIDGETS);
    let child = Train::bootstrap(frame, &config(&["shop/cart/item/add"], &[], &[])).unwrap();
    page.run_until_idle().unwrap();

    let (listener, seen) = recorder();
    parent.subscribe("shop/cart/item/add", listener).unwrap();
    child.publish("shop/cart/item/add", json!({"sku": "X"})).unwrap();
    page.run_until_idle().unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_source, EventSource::Iframe);
    assert_eq!(seen[0].payload, Some(json!({"sku": "X"})));
}

#[test]
fn test_parent_event_reaches_only_selected_frames() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent =
        Train::bootstrap(top.clone(), &config(&["portal/user/login"], &[], &["cart-frame"])).unwrap();

    let cart = Train::bootstrap(page.embed(&top, "cart-frame", PORTAL), &config(&[], &[], &[]))
        .unwrap();
    let ads = Train::bootstrap(page.embed(&top, "ads-frame", PORTAL), &config(&[], &[], &[]))
        .unwrap();

    let (cart_listener, cart_seen) = recorder();
    cart.subscribe("portal/user/login", cart_listener).unwrap();
    // the ads frame never received the catalog, so it enlists the name itself
    ads.register_public_events(["portal/user/login"]).unwrap();
    let (ads_listener, ads_seen) = recorder();
    ads.subscribe("portal/user/login", ads_listener).unwrap();

    parent.publish("portal/user/login", json!({"user": "u1"})).unwrap();
    assert_eq!(cart_seen.borrow().len(), 1);
    assert!(ads_seen.borrow().is_empty());

    parent.register_iframe_selectors([".ads-frame"]);
    parent.publish("portal/user/login", json!({"user": "u2"})).unwrap();
    assert_eq!(cart_seen.borrow().len(), 2);
    assert_eq!(ads_seen.borrow().len(), 1);
}

#[test]
fn test_raw_private_name_cannot_cross_origins() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(
        top.clone(),
        &config(&[], &["portal/session/token"], &["cart-frame"]),
    )
    .unwrap();
    let frame = page.embed(&top, "cart-frame", WIDGETS);
    let _child = Train::bootstrap(frame, &config(&[], &[], &[])).unwrap();
    page.run_until_idle().unwrap();

    let err = parent
        .forward(&EventEnvelope::new("portal/session/token", None))
        .unwrap_err();
    assert!(matches!(err, Error::PrivacyFault { ref event_name } if event_name == "portal/session/token"));
    assert_eq!(page.pending(), 0);
}

#[test]
fn test_private_publish_leaves_only_the_token() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(
        top.clone(),
        &config(&[], &["portal/session/token"], &["cart-frame"]),
    )
    .unwrap();
    let frame = page.embed(&top, "cart-frame", WIDGETS);
    let child = Train::bootstrap(frame, &config(&[], &[], &[])).unwrap();
    page.run_until_idle().unwrap();

    let (local, seen_local) = recorder();
    parent.subscribe("portal/session/token", local).unwrap();
    parent.publish("portal/session/token", json!("secret")).unwrap();

    let token = parent.resolve_token("portal/session/token").unwrap();
    assert_eq!(seen_local.borrow().len(), 1);
    assert_eq!(seen_local.borrow()[0].event_name, token);

    assert!(page.pending() > 0);
    page.run_until_idle().unwrap();
    assert!(!child.is_event_registered("portal/session/token"));
    assert!(!child.lookup_registered_event().contains(&token));
}

#[test]
fn test_unknown_publish_reports_failed_status() {
    let page = Page::new(PORTAL);
    let train = Train::bootstrap(page.top(), &config(&["shop/promo/apply/status"], &[], &[])).unwrap();

    let (listener, seen) = recorder();
    train.subscribe("shop/promo/apply/status", listener).unwrap();

    let err = train.publish("shop/promo/apply", json!(1)).unwrap_err();
    assert!(matches!(err, Error::AccessFault { .. }));

    let statuses: Vec<EventStatus> = seen
        .borrow()
        .iter()
        .filter_map(|envelope| envelope.payload.as_ref().and_then(EventStatus::from_payload))
        .collect();
    assert_eq!(statuses, vec![EventStatus::Loading, EventStatus::Failed]);
}

#[test]
fn test_unsubscribe_all_drops_handshake_listener() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(top.clone(), &config(&[], &[], &["cart-frame"])).unwrap();
    parent.unsubscribe_all().unwrap();

    let frame = page.embed(&top, "cart-frame", PORTAL);
    let child = Train::bootstrap(frame, &config(&["shop/cart/item/add"], &[], &[])).unwrap();

    assert!(!parent.is_event_registered("shop/cart/item/add"));
    assert_eq!(child.handshake_state(), HandshakeState::AwaitingAck);
}

#[test]
fn test_status_subscription_announced_to_parent() {
    let page = Page::new(PORTAL);
    let top = page.top();
    let parent = Train::bootstrap(top.clone(), &config(&[], &[], &["cart-frame"])).unwrap();
    let frame = page.embed(&top, "cart-frame", PORTAL);
    let child = Train::bootstrap(frame, &config(&["shop/cart/item/add"], &[], &[])).unwrap();

    let (listener, _) = recorder();
    child.subscribe_status("shop/cart/item/add", listener).unwrap();

    assert!(parent.is_event_registered("shop/cart/item/add/status"));
}
