// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end RTU scenarios: a client engine and a server pipeline
//! wired back to back over a simulated serial link.

#![cfg(all(feature = "client", feature = "server", feature = "rtu"))]

mod common;

use std::sync::{Arc, Mutex};

use common::{rtu_frame, Link};
use modbuscore::{
    client::{self, CallOptions, Callback, Client},
    observer::Status,
    prelude::{Region, Request, Response, ServerConfig, Unit, BROADCAST},
    server::rtu::RtuServer,
    transport::MockTransport,
};

type Seen = Arc<Mutex<Vec<(Status, Option<Vec<u16>>)>>>;

fn recording_callback() -> (Seen, Callback) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&seen);
    let callback: Callback = Box::new(move |completion| {
        let words = completion.response.and_then(|rsp| match rsp {
            Response::ReadHoldingRegisters(words) => Some(words.iter().collect()),
            _ => None,
        });
        capture.lock().unwrap().push((completion.status, words));
    });
    (seen, callback)
}

struct Bench {
    client: Client<MockTransport>,
    server: RtuServer<MockTransport>,
    link: Link,
}

fn bench() -> Bench {
    let (client_transport, client_handle) = MockTransport::new();
    let (server_transport, server_handle) = MockTransport::new();
    let client = client::rtu::attach(client_transport);
    let mut server = RtuServer::new(server_transport, ServerConfig::default(), 19_200);
    server
        .core_mut()
        .add_region(Region::holding(0, (0u16..10).collect()))
        .unwrap();
    Bench {
        client,
        server,
        link: Link::new(client_handle, server_handle),
    }
}

impl Bench {
    /// One full request/response round: enough polls and silence for
    /// the server to promote the frame and answer.
    fn run_round(&mut self) {
        for _ in 0..4 {
            self.client.poll();
            self.link.shuttle();
            self.server.poll();
            self.link.advance(self.server.silence_ms() + 1);
            self.server.poll();
            self.link.shuttle();
            self.client.poll();
        }
    }
}

#[test]
fn read_holding_registers_round_trip() {
    let mut bench = bench();

    let (seen, callback) = recording_callback();
    bench
        .client
        .submit(
            Unit(1),
            Request::ReadHoldingRegisters(0, 10),
            CallOptions::default(),
            callback,
        )
        .unwrap();

    // The exact request bytes of the wire exchange.
    let wire = bench.link.client.sent();
    assert_eq!(wire, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);

    bench.run_round();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Status::Ok);
    assert_eq!(seen[0].1, Some((0u16..10).collect::<Vec<_>>()));

    assert_eq!(bench.client.metrics().completed, 1);
    assert_eq!(bench.client.in_flight(), 0);
}

#[test]
fn unmapped_write_returns_illegal_data_address() {
    let mut bench = bench();

    let (seen, callback) = recording_callback();
    bench
        .client
        .submit(
            Unit(1),
            Request::WriteSingleRegister(0x9999, 1),
            CallOptions::default(),
            callback,
        )
        .unwrap();
    bench.run_round();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].0,
        Status::Exception(modbuscore::frame::Exception::IllegalDataAddress)
    );
}

#[test]
fn noise_on_the_line_is_resynchronized() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut bench = bench();

    let (seen, callback) = recording_callback();
    bench.client.submit(
        Unit(1),
        Request::ReadHoldingRegisters(0, 1),
        CallOptions::default(),
        callback,
    )?;

    // Corrupt the line in front of the request.
    let request = bench.link.client.take_tx();
    let mut noisy = vec![0xFF, 0xFF];
    noisy.extend_from_slice(&request);
    noisy.push(0x00);
    bench.link.server.push_rx(&noisy);

    bench.run_round();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Status::Ok);

    let stats = bench.server.resync_stats();
    assert!(stats.bytes_discarded >= 2);
    assert_eq!(stats.frames_recovered, 1);
    Ok(())
}

#[test]
fn duplicate_request_is_executed_once() {
    let mut bench = bench();

    // Deliver the same write twice within the duplicate window.
    let increments = Arc::new(Mutex::new(0u32));
    let capture = Arc::clone(&increments);
    bench
        .server
        .core_mut()
        .add_region(
            Region::holding(0x100, vec![0]).on_write_word(Box::new(move |_, _| {
                *capture.lock().unwrap() += 1;
                Ok(())
            })),
        )
        .unwrap();

    let request = rtu_frame(&[0x01, 0x06, 0x01, 0x00, 0x00, 0x2A]);
    bench.link.server.push_rx(&request);
    bench.server.poll();
    bench.link.advance(bench.server.silence_ms() + 1);
    bench.server.poll();

    bench.link.advance(5);
    bench.link.server.push_rx(&request);
    bench.server.poll();
    bench.link.advance(bench.server.silence_ms() + 1);
    bench.server.poll();

    assert_eq!(*increments.lock().unwrap(), 1);
    assert_eq!(bench.server.duplicates(), 1);

    // Past the window the same bytes are a fresh command.
    bench.link.advance(200);
    bench.link.server.push_rx(&request);
    bench.server.poll();
    bench.link.advance(bench.server.silence_ms() + 1);
    bench.server.poll();
    assert_eq!(*increments.lock().unwrap(), 2);
}

#[test]
fn broadcast_write_reaches_storage_without_answer() {
    let mut bench = bench();

    let (seen, callback) = recording_callback();
    bench
        .client
        .submit(
            BROADCAST,
            Request::WriteSingleRegister(0x0000, 0x4242),
            CallOptions::default(),
            callback,
        )
        .unwrap();

    // Broadcasts complete immediately on the client side.
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(seen.lock().unwrap()[0].0, Status::Ok);

    bench.run_round();
    assert_eq!(
        bench.server.core_mut().map_mut().read_word(0).unwrap(),
        0x4242
    );
    // And the server stayed silent.
    assert!(bench.link.server.take_tx().is_empty());
}

#[test]
fn back_to_back_requests_keep_order() {
    let mut bench = bench();

    let order: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));
    for address in [3u16, 5, 7] {
        let capture = Arc::clone(&order);
        bench
            .client
            .submit(
                Unit(1),
                Request::ReadHoldingRegisters(address, 1),
                CallOptions::default(),
                Box::new(move |completion| {
                    if let Some(Response::ReadHoldingRegisters(words)) = completion.response {
                        capture.lock().unwrap().push(words.get(0).unwrap());
                    }
                }),
            )
            .unwrap();
    }

    for _ in 0..3 {
        bench.run_round();
    }

    // Submission order is delivery order, and values match addresses.
    assert_eq!(*order.lock().unwrap(), vec![3, 5, 7]);
    assert_eq!(bench.client.metrics().completed, 3);
}
