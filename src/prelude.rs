// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common imports, re-exported for convenience.
//!
//! ```
//! use modbuscore::prelude::*;
//! ```

pub use crate::error::{Error, ErrorSlot, Result};
pub use crate::frame::{
    Address, Coil, Coils, DeviceIdCode, Exception, ExceptionResponse, FunctionCode, Quantity,
    Request, Response, Word, Words,
};
pub use crate::observer::{ClientState, Event, Status};
pub use crate::transport::{millis_since, Millis, MockTransport, Transport};
pub use crate::unit::{AddressKind, Unit, UnitId, BROADCAST, TCP_DIRECT};

#[cfg(feature = "client")]
pub use crate::client::{self, CallOptions, Client, ClientConfig, Completion};

#[cfg(feature = "server")]
pub use crate::server::{
    map::{Region, RegionKind, RegisterMap},
    DeviceIdObjectDef, ServerConfig, ServerCore,
};

#[cfg(all(feature = "server", feature = "rtu"))]
pub use crate::server::rtu::RtuServer;

#[cfg(all(feature = "server", feature = "tcp"))]
pub use crate::server::tcp::TcpServer;
