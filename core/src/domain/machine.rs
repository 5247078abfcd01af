// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Machine & Binding Aggregates
//!
//! A [`Machine`] is a registered client endpoint identified by its unique
//! `name` (usually the FQDN). A [`Binding`] attaches one token (by `serial`)
//! to one machine for one client-side `application` such as `"ssh"` or
//! `"luks"`.
//!
//! Token records are owned by the token subsystem; a `serial` is an opaque
//! foreign reference here. There is no in-place update for machines:
//! changing one means delete + create.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Application-specific binding options. Interpreted by the store, never by
/// the request pipeline.
pub type BindingOptions = BTreeMap<String, String>;

/// A registered client machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    pub ip: Option<IpAddr>,
    #[serde(rename = "desc")]
    pub description: Option<String>,
    /// After this date the machine is no longer valid for authentication.
    pub decommission: Option<NaiveDate>,
}

impl Machine {
    /// A machine is active on `today` unless its decommission date has passed.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        match self.decommission {
            Some(date) => today <= date,
            None => true,
        }
    }
}

/// Input for machine registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMachine {
    pub name: String,
    pub ip: Option<IpAddr>,
    pub description: Option<String>,
    pub decommission: Option<NaiveDate>,
}

impl From<NewMachine> for Machine {
    fn from(new: NewMachine) -> Self {
        Self {
            name: new.name,
            ip: new.ip,
            description: new.description,
            decommission: new.decommission,
        }
    }
}

/// Association of (machine, serial, application). The triple is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub id: i64,
    pub machine: String,
    pub serial: String,
    pub application: String,
    #[serde(default)]
    pub options: BindingOptions,
}

impl Binding {
    pub fn matches(&self, filter: &BindingFilter) -> bool {
        filter.machine.as_deref().map_or(true, |m| m == self.machine)
            && filter.serial.as_deref().map_or(true, |s| s == self.serial)
            && filter
                .application
                .as_deref()
                .map_or(true, |a| a == self.application)
    }
}

/// Optional constraints for binding lookups. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingFilter {
    pub machine: Option<String>,
    pub serial: Option<String>,
    pub application: Option<String>,
}

/// Per-application authentication material handed to a client machine.
///
/// `auth_item` is produced by the store and is opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialItem {
    pub machine: String,
    pub serial: String,
    pub application: String,
    pub auth_item: serde_json::Value,
}
