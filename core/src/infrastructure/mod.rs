// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit;
pub mod db;
pub mod identity;
pub mod policy_engine;
pub mod repositories;

pub use audit::{PostgresAuditSink, TracingAuditSink};
pub use identity::JwtIdentityResolver;
pub use policy_engine::RulePolicyEngine;
