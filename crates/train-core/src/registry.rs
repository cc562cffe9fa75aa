//! Event registry: Default, Public and Private namespaces plus private tokens.
//!
//! Public and Private are mutually exclusive. Every private name receives an
//! opaque token when it is first enlisted, and that token is the only
//! identifier of the name that ever leaves the registry: it keys the
//! subscriber directory, the native listeners, and every envelope.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use tracing::{debug, trace, warn};
use train_proto::{Error, EventStatus, Namespace, Result, SYSTEM_IFRAME_INIT};

/// Names seeded into the Default namespace at bootstrap.
pub const DEFAULT_EVENTS: [&str; 13] = [
    "global/web/error/generic",
    "global/web/error/404",
    "global/web/resource/unavailable",
    "global/system/service/unavailable",
    "global/system/access/unauthorized",
    "global/system/access/denied",
    "global/system/status/offline",
    "global/system/status/online",
    "global/module/load-status/init",
    "global/module/load-status/success",
    "global/module/load-status/error",
    "global/system/event/init",
    SYSTEM_IFRAME_INIT,
];

/// Registry of enlisted event names.
#[derive(Debug)]
pub struct EventRegistry {
    default: Vec<String>,
    public: Vec<String>,
    private: Vec<String>,

    /// Private name to token. Append-only.
    tokens: HashMap<String, String>,

    /// Per-registry hash keys, so tokens differ between contexts.
    hasher: RandomState,

    minted: u64,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    /// Creates a registry seeded with [`DEFAULT_EVENTS`].
    pub fn new() -> Self {
        Self {
            default: DEFAULT_EVENTS.iter().map(|name| (*name).to_string()).collect(),
            public: Vec::new(),
            private: Vec::new(),
            tokens: HashMap::new(),
            hasher: RandomState::new(),
            minted: 0,
        }
    }

    /// Enlists names into the Public namespace.
    ///
    /// Returns the names that were not already public. Default names are
    /// skipped. Nothing is enlisted if any name is already private.
    pub fn enlist_public<I, S>(&mut self, names: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = self.without_defaults(collect_names(names));
        reject_conflicts(&names, &self.private)?;

        let added = union_into(&mut self.public, names);
        if !added.is_empty() {
            debug!(added = ?added, total = self.public.len(), "Public events enlisted");
        }
        Ok(added)
    }

    /// Enlists names into the Private namespace and mints their tokens.
    ///
    /// Returns the names that were not already private. Default names are
    /// skipped and never get a token. Nothing is enlisted if any name is
    /// already public.
    pub fn enlist_private<I, S>(&mut self, names: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = self.without_defaults(collect_names(names));
        reject_conflicts(&names, &self.public)?;

        let added = union_into(&mut self.private, names);
        for name in &added {
            if !self.tokens.contains_key(name) {
                let token = self.mint_token(name);
                self.tokens.insert(name.clone(), token);
            }
        }
        if !added.is_empty() {
            debug!(count = added.len(), total = self.private.len(), "Private events enlisted");
        }
        Ok(added)
    }

    /// Returns true if the name is in any namespace.
    pub fn is_enlisted(&self, event_name: &str) -> bool {
        let enlisted = self.namespace_of(event_name).is_some();
        trace!(event = %event_name, enlisted, "Enlistment lookup");
        enlisted
    }

    /// Classifies a name, if enlisted.
    pub fn namespace_of(&self, event_name: &str) -> Option<Namespace> {
        if self.default.iter().any(|name| name == event_name) {
            Some(Namespace::Default)
        } else if self.public.iter().any(|name| name == event_name) {
            Some(Namespace::Public)
        } else if self.private.iter().any(|name| name == event_name) {
            Some(Namespace::Private)
        } else {
            None
        }
    }

    pub fn is_private(&self, event_name: &str) -> bool {
        self.namespace_of(event_name) == Some(Namespace::Private)
    }

    /// Validates a name and returns the names it matches.
    ///
    /// An unknown name fails with `AccessFault` only when a status reporter
    /// is supplied, after the reporter has been told the name FAILED. Without
    /// a reporter an unknown name matches nothing.
    pub fn check(
        &self,
        event_name: &str,
        action: &str,
        reporter: Option<&mut dyn FnMut(&str, EventStatus)>,
    ) -> Result<Vec<String>> {
        if self.is_enlisted(event_name) {
            trace!(event = %event_name, action, "Registry check passed");
            return Ok(vec![event_name.to_string()]);
        }

        match reporter {
            Some(report) => {
                report(event_name, EventStatus::Failed);
                warn!(event = %event_name, action, "Event not recognised");
                Err(Error::AccessFault {
                    action: action.to_string(),
                    event_name: event_name.to_string(),
                })
            }
            None => {
                debug!(event = %event_name, action, "Event not recognised, nothing matched");
                Ok(Vec::new())
            }
        }
    }

    /// Returns the token of a private name.
    pub fn resolve_token(&self, event_name: &str) -> Result<String> {
        if self.is_private(event_name)
            && let Some(token) = self.tokens.get(event_name)
        {
            return Ok(token.clone());
        }
        warn!(event = %event_name, "Token requested outside the private namespace");
        Err(Error::PrivacyFault {
            event_name: event_name.to_string(),
        })
    }

    /// Returns the key a name is dispatched and listened under: its token
    /// when private, the name itself otherwise.
    pub fn dispatch_key(&self, event_name: &str) -> String {
        match self.resolve_token(event_name) {
            Ok(token) => token,
            Err(_) => event_name.to_string(),
        }
    }

    /// Maps a token back to its private name; anything else is returned as is.
    pub fn resolve_name(&self, token: &str) -> String {
        self.tokens
            .iter()
            .find(|(_, minted)| minted.as_str() == token)
            .map(|(name, _)| name)
            .filter(|name| self.is_private(name))
            .cloned()
            .unwrap_or_else(|| token.to_string())
    }

    /// Default and Public names, the catalog visible to other frames.
    pub fn enlisted(&self) -> Vec<String> {
        self.default.iter().chain(&self.public).cloned().collect()
    }

    pub fn public_events(&self) -> &[String] {
        &self.public
    }

    pub fn private_events(&self) -> &[String] {
        &self.private
    }

    fn without_defaults(&self, names: Vec<String>) -> Vec<String> {
        let (seeded, names): (Vec<String>, Vec<String>) =
            names.into_iter().partition(|name| self.default.contains(name));
        if !seeded.is_empty() {
            debug!(names = ?seeded, "Skipped names already in the default namespace");
        }
        names
    }

    fn mint_token(&mut self, event_name: &str) -> String {
        self.minted += 1;
        let digest = self.hasher.hash_one((event_name, self.minted));

        let mut bytes = digest.to_be_bytes().to_vec();
        bytes.extend_from_slice(&(self.minted as u32).to_be_bytes());
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

fn collect_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(Into::into)
        .filter(|name: &String| !name.is_empty())
        .collect()
}

fn reject_conflicts(names: &[String], other: &[String]) -> Result<()> {
    let conflicting: Vec<String> = names
        .iter()
        .filter(|name| other.contains(name))
        .cloned()
        .collect();

    if conflicting.is_empty() {
        Ok(())
    } else {
        warn!(names = ?conflicting, "Rejected registration across namespaces");
        Err(Error::NamespaceConflict { names: conflicting })
    }
}

fn union_into(register: &mut Vec<String>, names: Vec<String>) -> Vec<String> {
    let mut added = Vec::new();
    for name in names {
        if !register.contains(&name) {
            register.push(name.clone());
            added.push(name);
        }
    }
    added
}
