// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Entities, value objects and the interfaces of every external
//! collaborator the request pipeline talks to. No I/O lives here.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`machine`] | `Machine`, `Binding`, `CredentialItem` |
//! | [`action`] | The named operations and their wire names |
//! | [`request`] | Transport-neutral inbound request |
//! | [`identity`] | Caller identity and `IdentityResolver` |
//! | [`policy`] | Per-request `PolicyContext`, `PolicyDecisionPoint`, `PolicyRule` |
//! | [`audit`] | `AuditRecord` and `AuditSink` |
//! | [`repository`] | `DomainStore`, `StoreSession`, `TokenDirectory` |
//! | [`service_config`] | Configuration manifest |

pub mod action;
pub mod audit;
pub mod identity;
pub mod machine;
pub mod policy;
pub mod repository;
pub mod request;
pub mod service_config;
