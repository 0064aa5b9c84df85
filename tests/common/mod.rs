// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for the scenario tests: CRC framing and a simulated
//! serial link between two mock transports.

use modbuscore::codec::rtu::crc16;
use modbuscore::transport::{Millis, MockHandle};

/// Append the Modbus CRC to a frame body, low byte first.
#[allow(dead_code)]
pub fn rtu_frame(body: &[u8]) -> Vec<u8> {
    let mut out = body.to_vec();
    let crc = crc16(body);
    out.push((crc & 0xFF) as u8);
    out.push((crc >> 8) as u8);
    out
}

/// A point-to-point link between a client-side and a server-side mock
/// transport with a shared notion of time.
#[allow(dead_code)]
pub struct Link {
    pub client: MockHandle,
    pub server: MockHandle,
}

#[allow(dead_code)]
impl Link {
    pub fn new(client: MockHandle, server: MockHandle) -> Self {
        Self { client, server }
    }

    /// Move pending bytes both ways, like a cable would.
    pub fn shuttle(&self) {
        let to_server = self.client.take_tx();
        if !to_server.is_empty() {
            self.server.push_rx(&to_server);
        }
        let to_client = self.server.take_tx();
        if !to_client.is_empty() {
            self.client.push_rx(&to_client);
        }
    }

    /// Advance both clocks in lockstep.
    pub fn advance(&self, ms: Millis) {
        self.client.advance(ms);
        self.server.advance(ms);
    }
}
