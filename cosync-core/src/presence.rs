//! Who is connected to the relay and whether their links are encrypted.

use std::collections::BTreeMap;

use tracing::debug;

/// Presence set keyed by identity, including the local client.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    local: Option<String>,
    members: BTreeMap<String, bool>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the set to just the local identity.
    pub fn seed_local(&mut self, identity: &str, secure: bool) {
        self.members.clear();
        self.members.insert(identity.to_string(), secure);
        self.local = Some(identity.to_string());
    }

    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    fn is_local(&self, identity: &str) -> bool {
        self.local.as_deref() == Some(identity)
    }

    /// Record a join. Returns `false` if `identity` was already present.
    pub fn join(&mut self, identity: &str, secure: bool) -> bool {
        if self.members.contains_key(identity) {
            debug!(%identity, "duplicate join ignored");
            return false;
        }
        self.members.insert(identity.to_string(), secure);
        true
    }

    /// Replace `old` with `new`. The local entry is never renamed away.
    pub fn rename(&mut self, old: &str, new: &str, secure: bool) -> bool {
        if self.is_local(old) {
            debug!(%old, %new, "ignoring rename of the local identity");
            return false;
        }
        let removed = self.members.remove(old).is_some();
        let added = if self.members.contains_key(new) {
            false
        } else {
            self.members.insert(new.to_string(), secure);
            true
        };
        removed || added
    }

    /// Record a leave. The local entry is never removed.
    pub fn leave(&mut self, identity: &str) -> bool {
        if self.is_local(identity) {
            return false;
        }
        self.members.remove(identity).is_some()
    }

    /// `true` only when every member, the local client included, is on an
    /// encrypted link.
    pub fn security_aggregate(&self) -> bool {
        self.members.values().all(|secure| *secure)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains_key(identity)
    }

    pub fn is_secure(&self, identity: &str) -> Option<bool> {
        self.members.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Identities in sorted order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.local = None;
    }
}
