// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy scope every machine operation is checked against.
pub const MACHINE_SCOPE: &str = "machine";

/// The named operations of the machine API.
///
/// The wire names (`as_str`) are part of the external contract and must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Delete,
    Show,
    AddToken,
    DelToken,
    ShowToken,
    GetTokenApps,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Create,
        Action::Delete,
        Action::Show,
        Action::AddToken,
        Action::DelToken,
        Action::ShowToken,
        Action::GetTokenApps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Show => "show",
            Action::AddToken => "addtoken",
            Action::DelToken => "deltoken",
            Action::ShowToken => "showtoken",
            Action::GetTokenApps => "gettokenapps",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown machine action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
