// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Transport-neutral inbound request.
//!
//! Every transport binding (HTTP today) reduces its request to an
//! [`InboundRequest`] before handing it to the request pipeline, so the
//! lifecycle contract does not depend on any web framework.

use std::collections::BTreeMap;
use std::net::IpAddr;

use super::action::Action;

/// Flat string parameter bag as received from the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams(BTreeMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The token serial the request refers to, if any.
    pub fn serial(&self) -> Option<&str> {
        self.get("serial")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<std::collections::HashMap<String, String>> for RequestParams {
    fn from(map: std::collections::HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// A request as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub action: Action,
    pub params: RequestParams,
    /// Raw bearer credential, without the `Bearer ` prefix.
    pub credential: Option<String>,
    /// Session id presented out-of-band (e.g. `X-Session` header).
    pub session: Option<String>,
    /// Address of the connected peer.
    pub peer: IpAddr,
    /// Raw `X-Forwarded-For` header value.
    pub forwarded_for: Option<String>,
}

impl InboundRequest {
    pub fn new(action: Action, params: RequestParams, peer: IpAddr) -> Self {
        Self {
            action,
            params,
            credential: None,
            session: None,
            peer,
            forwarded_for: None,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_forwarded_for(mut self, header: impl Into<String>) -> Self {
        self.forwarded_for = Some(header.into());
        self
    }

    /// Resolve the client address. The first `X-Forwarded-For` entry wins
    /// only when the deployment trusts its proxy and the entry parses.
    pub fn client_address(&self, trust_forwarded_for: bool) -> IpAddr {
        if trust_forwarded_for {
            let forwarded = self
                .forwarded_for
                .as_deref()
                .and_then(|h| h.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok());
            if let Some(addr) = forwarded {
                return addr;
            }
        }
        self.peer
    }
}
