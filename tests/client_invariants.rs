// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction lifecycle invariants of the client engine: one terminal
//! callback per transaction, bounded retries, jittered backoff windows,
//! conserved accounting.

#![cfg(all(feature = "client", feature = "rtu"))]

mod common;

use std::sync::{Arc, Mutex};

use modbuscore::{
    client::{self, CallOptions, Callback, ClientConfig},
    observer::Status,
    prelude::{Request, Unit},
    transport::MockTransport,
};

fn counting_callback() -> (Arc<Mutex<Vec<Status>>>, Callback) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&seen);
    let callback: Callback = Box::new(move |completion| {
        capture.lock().unwrap().push(completion.status);
    });
    (seen, callback)
}

#[test]
fn retry_ladder_timeline() {
    // Scenario: timeout 50 ms, two retries, no response at all.
    // Attempt 1 at t=0 (deadline 50), retry 1 within (50, 125],
    // attempt 2 timeout 100 ms, retry 2 within a further jitter
    // window, attempt 3 timeout 200 ms, TIMEOUT at roughly t=350.
    let (transport, handle) = MockTransport::new();
    let mut client = client::rtu::attach_with_config(
        transport,
        ClientConfig {
            default_timeout_ms: 50,
            default_backoff_ms: 50,
            default_max_retries: 2,
            ..ClientConfig::default()
        },
    );

    let (seen, callback) = counting_callback();
    client
        .submit(
            Unit(1),
            Request::ReadHoldingRegisters(0, 1),
            CallOptions::default(),
            callback,
        )
        .unwrap();

    let mut attempts = Vec::new();
    let mut now = 0u32;
    for _ in 0..700 {
        let sent = handle.take_tx();
        if !sent.is_empty() {
            attempts.push(now);
        }
        if !seen.lock().unwrap().is_empty() {
            break;
        }
        handle.advance(1);
        now += 1;
        client.poll();
    }

    assert_eq!(attempts.len(), 3, "attempts at {attempts:?}");
    assert_eq!(attempts[0], 0);
    // Retry 1: deadline t=50 plus jitter of the 50 ms backoff
    // (25..=75 ms).
    assert!(attempts[1] > 50 && attempts[1] <= 50 + 76, "{attempts:?}");
    // Retry 2: previous attempt + 100 ms timeout + jitter of the
    // doubled 100 ms backoff (50..=150 ms).
    let second_deadline = attempts[1] + 100;
    assert!(
        attempts[2] > second_deadline && attempts[2] <= second_deadline + 151,
        "{attempts:?}"
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[Status::Timeout]);
    assert_eq!(client.metrics().retries, 2);
    assert_eq!(client.metrics().timeouts, 1);
    // The terminal timeout fires after the third attempt's 200 ms
    // window.
    assert_eq!(client.metrics().completed, 1);
}

#[test]
fn exactly_one_terminal_callback() {
    let (transport, handle) = MockTransport::new();
    let mut client = client::rtu::attach_with_config(
        transport,
        ClientConfig {
            default_timeout_ms: 20,
            default_max_retries: 0,
            ..ClientConfig::default()
        },
    );

    let (seen, callback) = counting_callback();
    let token = client
        .submit(
            Unit(1),
            Request::ReadHoldingRegisters(0, 1),
            CallOptions::default(),
            callback,
        )
        .unwrap();
    handle.take_tx();

    // Cancel, then let the deadline pass, then deliver a response:
    // none of the later events may produce a second callback.
    client.cancel(token).unwrap();
    handle.advance(100);
    client.poll();
    handle.push_rx(&common::rtu_frame(&[0x01, 0x03, 0x02, 0x00, 0x01]));
    client.poll();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[Status::Cancelled]);
}

#[test]
fn accounting_is_conserved() {
    let (transport, handle) = MockTransport::new();
    let mut client = client::rtu::attach_with_config(
        transport,
        ClientConfig {
            queue_capacity: 4,
            default_timeout_ms: 10,
            default_max_retries: 0,
            ..ClientConfig::default()
        },
    );

    let mut submitted_ok = 0u64;
    for i in 0..6u16 {
        let (_seen, callback) = counting_callback();
        if client
            .submit(
                Unit(1),
                Request::ReadHoldingRegisters(i, 1),
                CallOptions::default(),
                callback,
            )
            .is_ok()
        {
            submitted_ok += 1;
        }
    }
    // Two rejected by the capacity check.
    assert_eq!(submitted_ok, 4);
    assert_eq!(
        client.metrics().submitted,
        client.metrics().completed + client.in_flight() as u64
    );

    // Let everything time out.
    for _ in 0..200 {
        handle.advance(5);
        client.poll();
        handle.take_tx();
    }
    assert_eq!(client.metrics().submitted, 4);
    assert_eq!(client.metrics().completed, 4);
    assert_eq!(client.in_flight(), 0);
}

#[test]
fn high_priority_jumps_the_queue() {
    let (transport, handle) = MockTransport::new();
    let mut client = client::rtu::attach(transport);

    let order: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));
    let mut submit = |client: &mut modbuscore::client::Client<MockTransport>,
                      address: u16,
                      high_priority: bool| {
        let capture = Arc::clone(&order);
        client
            .submit(
                Unit(1),
                Request::ReadHoldingRegisters(address, 1),
                CallOptions {
                    high_priority,
                    ..CallOptions::default()
                },
                Box::new(move |_| capture.lock().unwrap().push(address)),
            )
            .unwrap();
    };

    // The first submission is already on the wire; the urgent one must
    // run before the other queued ones.
    submit(&mut client, 1, false);
    submit(&mut client, 2, false);
    submit(&mut client, 3, false);
    submit(&mut client, 9, true);

    for _ in 0..8 {
        let sent = handle.take_tx();
        if !sent.is_empty() {
            // Answer whatever was asked.
            let address = u16::from_be_bytes([sent[2], sent[3]]);
            handle.push_rx(&common::rtu_frame(&[
                0x01,
                0x03,
                0x02,
                (address >> 8) as u8,
                (address & 0xFF) as u8,
            ]));
        }
        client.poll();
    }

    assert_eq!(*order.lock().unwrap(), vec![1, 9, 2, 3]);
}

#[test]
fn poison_completes_queued_work_is_left_alone() {
    let (transport, handle) = MockTransport::new();
    let mut client = client::rtu::attach(transport);

    let (seen_a, callback_a) = counting_callback();
    client
        .submit(
            Unit(1),
            Request::ReadHoldingRegisters(0, 1),
            CallOptions::default(),
            callback_a,
        )
        .unwrap();
    handle.take_tx();

    let (seen_p, callback_p) = counting_callback();
    client.poison(Some(callback_p)).unwrap();
    assert_eq!(client.metrics().submitted, 2);

    // Drain the current transaction; the poison pill then fires.
    client.cancel_current().unwrap();
    assert_eq!(seen_a.lock().unwrap().as_slice(), &[Status::Cancelled]);
    assert_eq!(seen_p.lock().unwrap().as_slice(), &[Status::Cancelled]);
    assert_eq!(client.metrics().poison_triggers, 1);
    assert_eq!(client.in_flight(), 0);
}
