// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Typed Operation Parameters
//!
//! Each operation declares its parameter schema once (`SCHEMA`) and is built
//! from the flat transport bag by [`OperationParams::from_params`]. The
//! schema check runs first, so a missing required parameter is reported
//! before any value is parsed and before the store is touched.
//!
//! | Operation | Required | Optional |
//! |-----------|----------|----------|
//! | `create` | `name` | `ip`, `desc`, `decommission` |
//! | `delete` | `name` | |
//! | `show` | | `name` |
//! | `addtoken` | `name`, `serial`, `application` | `option_*` |
//! | `deltoken` | `name`, `serial`, `application` | |
//! | `showtoken` | | `name`, `serial`, `application` |
//! | `gettokenapps` | | `name`, `application` |

use chrono::NaiveDate;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::machine::{BindingFilter, BindingOptions, NewMachine};
use crate::domain::request::RequestParams;

/// Prefix of free-form binding options accepted by `addtoken`.
pub const OPTION_PREFIX: &str = "option_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
}

const fn required(name: &'static str) -> ParamSpec {
    ParamSpec { name, required: true }
}

const fn optional(name: &'static str) -> ParamSpec {
    ParamSpec { name, required: false }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("Missing parameter: '{0}'")]
    Missing(&'static str),

    #[error("Invalid parameter '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A typed request built from a validated parameter bag.
pub trait OperationParams: Sized {
    const SCHEMA: &'static [ParamSpec];

    fn extract(params: &RequestParams) -> Result<Self, ParamError>;

    fn from_params(params: &RequestParams) -> Result<Self, ParamError> {
        check_schema(Self::SCHEMA, params)?;
        Self::extract(params)
    }
}

/// Blank values count as absent for required parameters.
pub fn check_schema(schema: &[ParamSpec], params: &RequestParams) -> Result<(), ParamError> {
    for spec in schema.iter().filter(|s| s.required) {
        match params.get(spec.name) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(ParamError::Missing(spec.name)),
        }
    }
    Ok(())
}

fn required_str(params: &RequestParams, name: &'static str) -> Result<String, ParamError> {
    optional_str(params, name).ok_or(ParamError::Missing(name))
}

/// Values are passed on as received; only blank values are dropped.
fn optional_str(params: &RequestParams, name: &str) -> Option<String> {
    params
        .get(name)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

fn optional_parsed<T>(params: &RequestParams, name: &'static str) -> Result<Option<T>, ParamError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_str(params, name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ParamError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMachineParams {
    pub name: String,
    pub ip: Option<IpAddr>,
    pub desc: Option<String>,
    pub decommission: Option<NaiveDate>,
}

impl OperationParams for CreateMachineParams {
    const SCHEMA: &'static [ParamSpec] = &[
        required("name"),
        optional("ip"),
        optional("desc"),
        optional("decommission"),
    ];

    fn extract(params: &RequestParams) -> Result<Self, ParamError> {
        Ok(Self {
            name: required_str(params, "name")?,
            ip: optional_parsed(params, "ip")?,
            desc: optional_str(params, "desc"),
            decommission: optional_parsed(params, "decommission")?,
        })
    }
}

impl From<CreateMachineParams> for NewMachine {
    fn from(p: CreateMachineParams) -> Self {
        NewMachine {
            name: p.name,
            ip: p.ip,
            description: p.desc,
            decommission: p.decommission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMachineParams {
    pub name: String,
}

impl OperationParams for DeleteMachineParams {
    const SCHEMA: &'static [ParamSpec] = &[required("name")];

    fn extract(params: &RequestParams) -> Result<Self, ParamError> {
        Ok(Self {
            name: required_str(params, "name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowMachineParams {
    pub name: Option<String>,
}

impl OperationParams for ShowMachineParams {
    const SCHEMA: &'static [ParamSpec] = &[optional("name")];

    fn extract(params: &RequestParams) -> Result<Self, ParamError> {
        Ok(Self {
            name: optional_str(params, "name"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTokenParams {
    pub name: String,
    pub serial: String,
    pub application: String,
    pub options: BindingOptions,
}

impl OperationParams for AddTokenParams {
    const SCHEMA: &'static [ParamSpec] = &[
        required("name"),
        required("serial"),
        required("application"),
    ];

    fn extract(params: &RequestParams) -> Result<Self, ParamError> {
        let options = params
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(OPTION_PREFIX)
                    .filter(|k| !k.is_empty())
                    .map(|k| (k.to_string(), value.to_string()))
            })
            .collect();

        Ok(Self {
            name: required_str(params, "name")?,
            serial: required_str(params, "serial")?,
            application: required_str(params, "application")?,
            options,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelTokenParams {
    pub name: String,
    pub serial: String,
    pub application: String,
}

impl OperationParams for DelTokenParams {
    const SCHEMA: &'static [ParamSpec] = &[
        required("name"),
        required("serial"),
        required("application"),
    ];

    fn extract(params: &RequestParams) -> Result<Self, ParamError> {
        Ok(Self {
            name: required_str(params, "name")?,
            serial: required_str(params, "serial")?,
            application: required_str(params, "application")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowTokenParams {
    pub name: Option<String>,
    pub serial: Option<String>,
    pub application: Option<String>,
}

impl OperationParams for ShowTokenParams {
    const SCHEMA: &'static [ParamSpec] = &[
        optional("name"),
        optional("serial"),
        optional("application"),
    ];

    fn extract(params: &RequestParams) -> Result<Self, ParamError> {
        Ok(Self {
            name: optional_str(params, "name"),
            serial: optional_str(params, "serial"),
            application: optional_str(params, "application"),
        })
    }
}

impl From<ShowTokenParams> for BindingFilter {
    fn from(p: ShowTokenParams) -> Self {
        BindingFilter {
            machine: p.name,
            serial: p.serial,
            application: p.application,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTokenAppsParams {
    pub name: Option<String>,
    pub application: Option<String>,
}

impl OperationParams for GetTokenAppsParams {
    const SCHEMA: &'static [ParamSpec] = &[optional("name"), optional("application")];

    fn extract(params: &RequestParams) -> Result<Self, ParamError> {
        Ok(Self {
            name: optional_str(params, "name"),
            application: optional_str(params, "application"),
        })
    }
}
