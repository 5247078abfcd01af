// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! The request pipeline: pre-phase context construction, operation
//! handlers, and the audit/commit finalizer, composed by
//! [`lifecycle::RequestLifecycle`].

pub mod context;
pub mod envelope;
pub mod finalizer;
pub mod handlers;
pub mod lifecycle;
pub mod params;
pub mod transaction;

pub use envelope::{ApiResponse, OperationError, OperationOutput};
pub use lifecycle::RequestLifecycle;
