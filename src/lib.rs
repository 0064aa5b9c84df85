// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::explicit_deref_methods)]
#![warn(clippy::explicit_into_iter_loop)]
#![warn(clippy::explicit_iter_loop)]
#![cfg_attr(not(test), warn(clippy::panic_in_result_fn))]
#![warn(rustdoc::broken_intra_doc_links)]
#![doc = include_str!("../README.md")]

pub mod prelude;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

pub mod codec;
pub mod diag;
pub mod error;
pub mod frame;
pub mod fsm;
pub mod isr;
pub mod observer;
pub mod pool;
pub mod queue;
pub mod sync;
pub mod transport;
pub mod unit;

pub use error::{Error, ErrorSlot, Result};

#[cfg(all(feature = "client", not(any(feature = "rtu", feature = "tcp"))))]
compile_error!("the client engine needs at least one framing: enable \"rtu\" or \"tcp\"");

#[cfg(all(feature = "server", not(any(feature = "rtu", feature = "tcp"))))]
compile_error!("the server needs at least one framing: enable \"rtu\" or \"tcp\"");
