// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Machine API Core
//!
//! Policy-gated management of client machines and the token bindings that
//! authenticate them.
//!
//! # Architecture
//!
//! - **domain** - machines, bindings, identity, policy and store contracts
//! - **application** - the request pipeline (context, handlers, finalizer)
//! - **infrastructure** - stores, token directories, audit sinks, JWT, policy engine
//! - **presentation** - HTTP routes

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
