// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server glue: per-connection slot management over any
//! number of byte-stream transports.
//!
//! Each accepted connection gets its own reassembly buffer and send
//! queue; all connections share one [`ServerCore`] and therefore one
//! register map. A framing violation or transport failure closes the
//! offending connection without disturbing the others.

use bytes::{Buf, BytesMut};

use crate::{
    codec::tcp::{self, StreamDecoder},
    error::{Error, ErrorSlot, Result},
    frame::tcp::Header,
    observer::Observer,
    transport::Transport,
    unit::{Unit, UnitId, TCP_DIRECT},
};

use super::{ServerConfig, ServerCore};

/// Identifies an accepted connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(usize);

#[derive(Debug)]
struct Connection<T> {
    transport: T,
    decoder: StreamDecoder,
    outbox: BytesMut,
}

impl<T: Transport> Connection<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: StreamDecoder::new(),
            outbox: BytesMut::new(),
        }
    }

    /// Push buffered response bytes. `Ok(true)` when fully drained.
    fn pump_tx(&mut self) -> Result<bool> {
        while !self.outbox.is_empty() {
            match self.transport.send(&self.outbox) {
                Ok(0) => return Ok(false),
                Ok(n) => self.outbox.advance(n),
                Err(Error::Timeout) => return Ok(false),
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    }

    fn pump_rx(&mut self) -> Result<()> {
        let mut chunk = [0u8; 512];
        loop {
            match self.transport.recv(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => self.decoder.feed(&chunk[..n]),
                Err(Error::Timeout) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
}

/// A Modbus TCP server multiplexing a fixed number of connections.
#[derive(Debug)]
pub struct TcpServer<T> {
    core: ServerCore,
    slots: Vec<Option<Connection<T>>>,
}

impl<T: Transport> TcpServer<T> {
    /// Create a server with room for `max_connections` concurrent
    /// connections.
    #[must_use]
    pub fn new(config: ServerConfig, max_connections: usize) -> Self {
        let mut slots = Vec::with_capacity(max_connections.max(1));
        slots.resize_with(max_connections.max(1), || None);
        Self {
            core: ServerCore::new(config),
            slots,
        }
    }

    /// The shared core (mapping, diagnostics, observer).
    pub fn core_mut(&mut self) -> &mut ServerCore {
        &mut self.core
    }

    #[must_use]
    pub fn core(&self) -> &ServerCore {
        &self.core
    }

    /// Register an observer for structured server events.
    pub fn set_observer(&mut self, observer: Observer) {
        self.core.set_observer(observer);
    }

    /// Place a freshly accepted connection into a free slot.
    ///
    /// Fails with [`Error::NoResources`] when every slot is taken.
    pub fn accept(&mut self, transport: T) -> Result<ConnId> {
        let Some(idx) = self.slots.iter().position(Option::is_none) else {
            self.core
                .diagnostics_mut()
                .count_error_slot(ErrorSlot::NoResources);
            return Err(Error::NoResources);
        };
        self.slots[idx] = Some(Connection::new(transport));
        log::debug!("Accepted connection into slot {idx}");
        Ok(ConnId(idx))
    }

    /// Close a connection, handing the transport back.
    pub fn disconnect(&mut self, id: ConnId) -> Option<T> {
        let connection = self.slots.get_mut(id.0).and_then(Option::take);
        connection.map(|connection| connection.transport)
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether a connection is still alive.
    #[must_use]
    pub fn is_connected(&self, id: ConnId) -> bool {
        self.slots.get(id.0).is_some_and(Option::is_some)
    }

    fn accepts_unit(&self, unit_id: UnitId) -> Option<bool> {
        // A directly connected TCP peer may use the reserved 0xFF
        // instead of the configured unit id.
        self.core
            .accepts_unit(unit_id)
            .or((Unit(unit_id) == TCP_DIRECT).then_some(false))
    }

    /// Drive every connection once: pump pending responses, read and
    /// process complete frames. Round-robin, non-blocking.
    pub fn poll(&mut self) {
        for idx in 0..self.slots.len() {
            let Some(mut connection) = self.slots[idx].take() else {
                continue;
            };
            match self.poll_connection(&mut connection) {
                Ok(()) => {
                    self.slots[idx] = Some(connection);
                }
                Err(_) => {
                    log::debug!("Closing connection in slot {idx}");
                    self.core
                        .diagnostics_mut()
                        .count_error_slot(ErrorSlot::Transport);
                }
            }
        }
    }

    fn poll_connection(&mut self, connection: &mut Connection<T>) -> Result<()> {
        connection.pump_tx()?;
        connection.pump_rx()?;

        loop {
            let frame = match connection.decoder.try_decode() {
                Ok(frame) => frame,
                Err(err) => {
                    // A malformed MBAP header is unrecoverable for the
                    // stream.
                    self.core
                        .diagnostics_mut()
                        .count_error_slot(ErrorSlot::InvalidRequest);
                    return Err(err);
                }
            };
            let Some((header, pdu)) = frame else {
                break;
            };
            let Some(broadcast) = self.accepts_unit(header.unit_id) else {
                self.core
                    .diagnostics_mut()
                    .count_error_slot(ErrorSlot::OtherUnit);
                continue;
            };
            if let Some(rsp) = self.core.handle(header.unit_id, broadcast, &pdu) {
                // Responses are staged and flushed in arrival order.
                tcp::append_frame(
                    Header {
                        transaction_id: header.transaction_id,
                        unit_id: header.unit_id,
                    },
                    &rsp,
                    &mut connection.outbox,
                )?;
                connection.pump_tx()?;
            }
        }
        Ok(())
    }

    /// Drive connections until nothing is in flight, bounded by
    /// `max_rounds`. Convenience for tests and simple applications.
    pub fn poll_rounds(&mut self, max_rounds: usize) {
        for _ in 0..max_rounds {
            self.poll();
        }
    }
}
