// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP client engine over any [`Transport`].

use crate::{codec::tcp::StreamDecoder, transport::Transport};

use super::{Client, ClientConfig, Link};

/// Attach a client engine with MBAP framing to a transport.
pub fn attach<T: Transport>(transport: T) -> Client<T> {
    attach_with_config(transport, ClientConfig::default())
}

/// Attach a client engine with MBAP framing and a custom configuration.
pub fn attach_with_config<T: Transport>(transport: T, config: ClientConfig) -> Client<T> {
    Client::attach(
        transport,
        Link::Tcp {
            decoder: StreamDecoder::new(),
            next_transaction_id: 0,
        },
        config,
    )
}
