//! Cancellation registry
//!
//! Two maps kept in lockstep: live handles by request key, and group
//! membership lists by group key. A request key appears in a group list
//! exactly while its handle is registered with that group; every mutation
//! goes through one method so the two maps never disagree.

use super::handle::{CancelHandle, CancelKind, CancelReason};
use super::keys::{GroupKey, RequestKey};
use crate::client::RequestDescriptor;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of one admitted request.
///
/// Keys are shared by every call to the same endpoint; the ticket tells a
/// request apart from the successor that superseded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTicket(Uuid);

impl RequestTicket {
    /// Issue a fresh ticket.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestTicket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestTicket {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A registered in-flight request
#[derive(Debug, Clone)]
pub struct CancelEntry {
    /// Handle that aborts the request
    pub handle: CancelHandle,
    /// Group the request joined at admission
    pub group: Option<GroupKey>,
    /// The request as admitted, without its cancel handle
    pub request: RequestDescriptor,
    /// Identity of this particular admission
    pub ticket: RequestTicket,
}

impl CancelEntry {
    /// Create an entry. The handle is stripped from the captured descriptor.
    #[must_use]
    pub fn new(
        handle: CancelHandle,
        group: Option<GroupKey>,
        mut request: RequestDescriptor,
        ticket: RequestTicket,
    ) -> Self {
        request.cancel_handle = None;
        Self {
            handle,
            group,
            request,
            ticket,
        }
    }

    /// Fire the entry's handle. Returns `false` if it had already fired.
    pub fn cancel(self, kind: CancelKind, key: RequestKey) -> bool {
        self.handle.cancel(CancelReason::new(kind, key, self.request))
    }
}

/// In-memory store of live cancellation handles.
///
/// All operations are total: missing keys yield `None`, `false` or `0`.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    handles: HashMap<RequestKey, CancelEntry>,
    groups: HashMap<GroupKey, Vec<RequestKey>>,
}

impl CancellationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under `key`, joining its group if it has one.
    ///
    /// An entry already stored under `key` is removed first and returned
    /// untouched; firing it is up to the caller.
    pub fn register(&mut self, key: RequestKey, entry: CancelEntry) -> Option<CancelEntry> {
        let displaced = self.remove(&key);

        if let Some(group) = &entry.group {
            self.groups.entry(group.clone()).or_default().push(key.clone());
        }
        self.handles.insert(key, entry);

        debug_assert!(self.is_consistent());
        displaced
    }

    /// Entry registered under `key`.
    pub fn lookup(&self, key: &RequestKey) -> Option<&CancelEntry> {
        self.handles.get(key)
    }

    /// Remove the entry under `key` and its group membership.
    ///
    /// A group list left empty is dropped.
    pub fn remove(&mut self, key: &RequestKey) -> Option<CancelEntry> {
        let entry = self.handles.remove(key)?;

        if let Some(group) = &entry.group
            && let Some(members) = self.groups.get_mut(group)
        {
            members.retain(|member| member != key);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }

        Some(entry)
    }

    /// Remove the entry under `key` only if it belongs to `ticket`.
    ///
    /// A request settling after a successor took its key leaves the
    /// successor's entry alone.
    pub fn release(&mut self, key: &RequestKey, ticket: RequestTicket) -> Option<CancelEntry> {
        match self.handles.get(key) {
            Some(entry) if entry.ticket == ticket => self.remove(key),
            _ => None,
        }
    }

    /// Remove the entry under `key` and fire it with `kind`.
    ///
    /// Returns `false` if nothing was registered.
    pub fn cancel(&mut self, key: &RequestKey, kind: CancelKind) -> bool {
        match self.remove(key) {
            Some(entry) => {
                entry.cancel(kind, key.clone());
                true
            }
            None => false,
        }
    }

    /// Fire and remove every member of `group`, then drop the group.
    ///
    /// Returns the number of requests cancelled; an unknown or drained
    /// group cancels nothing.
    pub fn cancel_group(&mut self, group: &GroupKey) -> usize {
        let Some(members) = self.groups.remove(group) else {
            return 0;
        };

        let mut cancelled = 0;
        for key in members {
            if let Some(entry) = self.handles.remove(&key) {
                entry.cancel(CancelKind::Group(group.clone()), key);
                cancelled += 1;
            }
        }

        debug_assert!(self.is_consistent());
        cancelled
    }

    /// Request keys currently registered under `group`, in admission order.
    pub fn group_members(&self, group: &GroupKey) -> Vec<RequestKey> {
        self.groups.get(group).cloned().unwrap_or_default()
    }

    /// Whether `group` has a membership list.
    pub fn has_group(&self, group: &GroupKey) -> bool {
        self.groups.contains_key(group)
    }

    /// Registered request keys.
    pub fn keys(&self) -> impl Iterator<Item = &RequestKey> {
        self.handles.keys()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handle is registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Check that handles and group lists agree.
    ///
    /// Every group list is non-empty, holds no duplicates, and names only keys
    /// whose entry carries that group; every grouped entry is listed once.
    pub fn is_consistent(&self) -> bool {
        let lists_valid = self.groups.iter().all(|(group, members)| {
            !members.is_empty()
                && members.iter().enumerate().all(|(i, key)| {
                    !members[..i].contains(key)
                        && self
                            .handles
                            .get(key)
                            .is_some_and(|entry| entry.group.as_ref() == Some(group))
                })
        });

        let entries_listed = self.handles.iter().all(|(key, entry)| match &entry.group {
            Some(group) => self
                .groups
                .get(group)
                .is_some_and(|members| members.contains(key)),
            None => true,
        });

        lists_valid && entries_listed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn entry(url: &str, group: Option<&str>) -> CancelEntry {
        CancelEntry::new(
            CancelHandle::new(),
            group.map(GroupKey::new),
            RequestDescriptor::get(url),
            RequestTicket::new(),
        )
    }

    fn key(url: &str) -> RequestKey {
        RequestKey::new(Method::GET, url)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = CancellationRegistry::new();
        assert!(registry.register(key("/a"), entry("/a", Some("g1"))).is_none());

        assert!(registry.lookup(&key("/a")).is_some());
        assert!(registry.lookup(&key("/b")).is_none());
        assert_eq!(registry.group_members(&GroupKey::new("g1")), vec![key("/a")]);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_register_displaces_previous_entry() {
        let mut registry = CancellationRegistry::new();
        let first = entry("/a", Some("g1"));
        let first_ticket = first.ticket;
        registry.register(key("/a"), first);

        let displaced = registry.register(key("/a"), entry("/a", Some("g2"))).unwrap();
        assert_eq!(displaced.ticket, first_ticket);
        assert!(!displaced.handle.is_cancelled());

        assert_eq!(registry.len(), 1);
        assert!(!registry.has_group(&GroupKey::new("g1")));
        assert_eq!(registry.group_members(&GroupKey::new("g2")), vec![key("/a")]);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_remove_drops_empty_group() {
        let mut registry = CancellationRegistry::new();
        registry.register(key("/a"), entry("/a", Some("g1")));
        registry.register(key("/b"), entry("/b", Some("g1")));

        registry.remove(&key("/a"));
        assert_eq!(registry.group_members(&GroupKey::new("g1")), vec![key("/b")]);

        registry.remove(&key("/b"));
        assert!(!registry.has_group(&GroupKey::new("g1")));
        assert!(registry.is_empty());

        // Missing keys are a no-op
        assert!(registry.remove(&key("/b")).is_none());
    }

    #[test]
    fn test_release_is_identity_guarded() {
        let mut registry = CancellationRegistry::new();
        let old_ticket = RequestTicket::new();
        let mut successor = entry("/a", None);
        successor.ticket = RequestTicket::new();
        let successor_ticket = successor.ticket;
        registry.register(key("/a"), successor);

        assert!(registry.release(&key("/a"), old_ticket).is_none());
        assert!(registry.lookup(&key("/a")).is_some());

        assert!(registry.release(&key("/a"), successor_ticket).is_some());
        assert!(registry.lookup(&key("/a")).is_none());
    }

    #[test]
    fn test_cancel_group_fires_every_member() {
        let mut registry = CancellationRegistry::new();
        let handles: Vec<CancelHandle> = (0..5)
            .map(|i| {
                let e = entry(&format!("/item/{i}"), Some("g1"));
                let handle = e.handle.clone();
                registry.register(key(&format!("/item/{i}")), e);
                handle
            })
            .collect();
        registry.register(key("/other"), entry("/other", Some("g2")));

        assert_eq!(registry.cancel_group(&GroupKey::new("g1")), 5);

        assert!(handles.iter().all(CancelHandle::is_cancelled));
        assert!(matches!(
            handles[0].reason().unwrap().kind(),
            CancelKind::Group(group) if group.as_str() == "g1"
        ));
        assert!(!registry.has_group(&GroupKey::new("g1")));
        assert!(registry.has_group(&GroupKey::new("g2")));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_cancel_group_is_idempotent() {
        let mut registry = CancellationRegistry::new();
        registry.register(key("/a"), entry("/a", Some("g1")));

        assert_eq!(registry.cancel_group(&GroupKey::new("g1")), 1);
        assert_eq!(registry.cancel_group(&GroupKey::new("g1")), 0);
        assert_eq!(registry.cancel_group(&GroupKey::new("never")), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_single_cancel_leaves_group_clean() {
        let mut registry = CancellationRegistry::new();
        let e = entry("/a", Some("g1"));
        let handle = e.handle.clone();
        registry.register(key("/a"), e);
        registry.register(key("/b"), entry("/b", Some("g1")));

        assert!(registry.cancel(&key("/a"), CancelKind::Explicit));
        assert!(handle.is_cancelled());
        assert_eq!(registry.group_members(&GroupKey::new("g1")), vec![key("/b")]);
        assert!(!registry.cancel(&key("/a"), CancelKind::Explicit));
    }

    #[test]
    fn test_captured_descriptor_has_no_handle() {
        let mut request = RequestDescriptor::get("/a");
        request.cancel_handle = Some(CancelHandle::new());
        let e = CancelEntry::new(CancelHandle::new(), None, request, RequestTicket::new());
        assert!(e.request.cancel_handle.is_none());
    }

    #[test]
    fn test_ticket_parses_from_display() {
        let ticket = RequestTicket::new();
        let parsed: RequestTicket = ticket.to_string().parse().unwrap();
        assert_eq!(parsed, ticket);
        assert!("not-a-ticket".parse::<RequestTicket>().is_err());
    }
}
