//! Integration tests for bridge connection lifecycle
//!
//! These tests validate bridge behavior through the runtime:
//! - Status sequences on connect, refusal and read failure
//! - Inbound Firmata reports reaching object properties
//! - Outbound writes following the settled graph
//! - The threaded runtime end to end

mod common;

use common::builders::{BridgeBuilder, SliderBuilder};
use common::mock_helpers::{create_test_runtime, create_test_runtime_with, drain_statuses, wait_for_snapshot};
use common::{numeric_of, test_timeout};
use std::time::{Duration, Instant};
use wirecanvas::bridge::{MemoryFactory, TransportFactory};
use wirecanvas::config::{AppConfig, Document};
use wirecanvas::firmata::codec;
use wirecanvas::graph::{OutputMode, ShapeKind};
use wirecanvas::runtime::{self, RuntimeHandle, RuntimeMessage};
use wirecanvas::types::{ConnectionStatus, Theme};
use wirecanvas::{Object, ObjectId, PropertyMap};

fn id(s: &str) -> ObjectId {
    ObjectId::new(s)
}

/// Collect `count` status changes from a threaded runtime.
fn wait_for_statuses(handle: &RuntimeHandle, count: usize) -> Vec<ConnectionStatus> {
    let deadline = Instant::now() + test_timeout();
    let mut statuses = Vec::new();
    while statuses.len() < count {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        match handle.recv_timeout(remaining) {
            Some(RuntimeMessage::ConnectionStatus { status, .. }) => statuses.push(status),
            Some(_) => continue,
            None => break,
        }
    }
    statuses
}

#[test]
fn test_digital_port_report_through_runtime() {
    let (mut rt, _handle, _factory) = create_test_runtime();
    let now = Instant::now();
    let mut bridge = BridgeBuilder::new("br").port("mem0");
    for pin in 8..16 {
        rt.insert(Object::switch(format!("p{}", pin)), now);
        bridge = bridge.digital_input(pin, &format!("p{}", pin), "currentState");
    }
    rt.insert(bridge.build(), now);
    rt.connect(&id("br"), now).unwrap();
    let generation = rt.generation(&id("br")).unwrap();

    rt.ingest_serial(&id("br"), generation, &[0x91, 0b0000_0101, 0x00], now);
    let state = |rt: &wirecanvas::Runtime, pin: u8| {
        rt.get(&id(&format!("p{}", pin)))
            .and_then(|o| o.numeric("currentState"))
    };
    assert_eq!(state(&rt, 8), Some(1.0));
    assert_eq!(state(&rt, 10), Some(1.0));
    for pin in [9, 11, 12, 13, 14, 15] {
        assert_eq!(state(&rt, pin), Some(0.0), "pin {}", pin);
    }
}

#[test]
fn test_split_analog_report_is_reassembled() {
    let (mut rt, _handle, _factory) = create_test_runtime();
    let now = Instant::now();
    rt.insert(SliderBuilder::new("s").range(0.0, 5.0).build(), now);
    rt.insert(
        BridgeBuilder::new("br")
            .port("mem0")
            .analog_input(15, "s", "value", 0.0, 5.0)
            .build(),
        now,
    );
    rt.connect(&id("br"), now).unwrap();
    let generation = rt.generation(&id("br")).unwrap();

    let bytes = codec::analog_message(1, 1023);
    rt.ingest_serial(&id("br"), generation, &bytes[..1], now);
    assert_eq!(rt.get(&id("s")).and_then(|s| s.numeric("value")), Some(50.0));
    rt.ingest_serial(&id("br"), generation, &bytes[1..], now);
    assert_eq!(rt.get(&id("s")).and_then(|s| s.numeric("value")), Some(5.0));
}

#[test]
fn test_digital_outputs_share_port_register() {
    let (mut rt, _handle, factory) = create_test_runtime();
    let now = Instant::now();
    rt.insert(SliderBuilder::new("a").value(0.0).build(), now);
    rt.insert(SliderBuilder::new("b").value(0.0).build(), now);
    rt.insert(
        BridgeBuilder::new("br")
            .port("mem0")
            .output(2, OutputMode::Digital, "a", "value")
            .output(3, OutputMode::Digital, "b", "value")
            .build(),
        now,
    );
    rt.connect(&id("br"), now).unwrap();
    let peer = factory.peer("mem0").unwrap();
    peer.take_writes();

    rt.apply(&id("a"), PropertyMap::single("value", 1.0), now).unwrap();
    rt.apply(&id("b"), PropertyMap::single("value", 1.0), now).unwrap();
    rt.apply(&id("a"), PropertyMap::single("value", 0.0), now).unwrap();
    assert_eq!(
        peer.take_writes(),
        vec![
            codec::digital_message(0, 0b0100).to_vec(),
            codec::digital_message(0, 0b1100).to_vec(),
            codec::digital_message(0, 0b1000).to_vec(),
        ]
    );
}

#[test]
fn test_refused_transport_lifecycle() {
    let (mut rt, handle, _factory) =
        create_test_runtime_with(AppConfig::default(), MemoryFactory::refusing("port busy"));
    let t0 = Instant::now();
    rt.insert(BridgeBuilder::new("br").port("mem0").build(), t0);

    assert!(rt.connect(&id("br"), t0).is_err());
    rt.tick(t0 + Duration::from_secs(3));
    assert_eq!(
        drain_statuses(&handle),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
            ConnectionStatus::Disconnected
        ]
    );
    assert!(!rt.is_connected(&id("br")));
}

#[test]
fn test_read_failure_drops_connection() {
    let (mut rt, handle, factory) = create_test_runtime();
    let now = Instant::now();
    rt.insert(SliderBuilder::new("s").build(), now);
    rt.insert(
        BridgeBuilder::new("br")
            .port("mem0")
            .output(9, OutputMode::Pwm, "s", "value")
            .build(),
        now,
    );
    rt.connect(&id("br"), now).unwrap();
    drain_statuses(&handle);

    let peer = factory.peer("mem0").unwrap();
    peer.fail_reads("cable pulled");
    assert_eq!(rt.process_serial_events(test_timeout(), now), 1);
    assert_eq!(drain_statuses(&handle), vec![ConnectionStatus::Error]);
    assert_eq!(rt.status(&id("br")), Some(ConnectionStatus::Error));

    // Nothing is written once the session is gone
    peer.take_writes();
    rt.apply(&id("s"), PropertyMap::single("value", 10.0), now).unwrap();
    assert!(!rt.is_connected(&id("br")));
    assert!(peer.take_writes().is_empty());
}

#[test]
fn test_threaded_runtime_round_trip() {
    let factory = MemoryFactory::new();
    let document = Document::new(
        Theme::default(),
        vec![
            Object::shape("lamp", ShapeKind::Circle),
            SliderBuilder::new("knob").range(0.0, 1023.0).target("lamp", "opacity").build(),
            BridgeBuilder::new("br")
                .port("mem0")
                .analog_input(14, "knob", "value", 0.0, 1023.0)
                .output(9, OutputMode::Pwm, "knob", "value")
                .build(),
        ],
    );
    let boxed: Box<dyn TransportFactory> = Box::new(factory.clone());
    let (handle, join) = runtime::spawn(AppConfig::default(), Some(boxed), document).unwrap();

    handle.connect("br");
    assert_eq!(
        wait_for_statuses(&handle, 2),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );

    let peer = factory.peer("mem0").unwrap();
    peer.send(&codec::analog_message(0, 1023));
    let snapshot = wait_for_snapshot(&handle, test_timeout(), |s| {
        numeric_of(&s.objects, "knob", "value") == Some(1023.0)
    })
    .expect("board input reached the knob");
    assert_eq!(numeric_of(&snapshot.objects, "lamp", "opacity"), Some(1023.0));

    // The PWM output follows the knob
    let deadline = Instant::now() + test_timeout();
    let mut writes = Vec::new();
    while Instant::now() < deadline && !writes.contains(&codec::analog_message(9, 255).to_vec()) {
        writes.extend(peer.take_writes());
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(writes.contains(&codec::analog_message(9, 255).to_vec()));

    handle.disconnect("br");
    assert_eq!(wait_for_statuses(&handle, 1), vec![ConnectionStatus::Disconnected]);
    assert!(peer.is_closed());

    handle.shutdown();
    join.join().unwrap();
    assert!(handle.drain().contains(&RuntimeMessage::Shutdown));
}
