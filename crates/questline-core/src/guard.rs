//! # Authorization Guard
//!
//! Decides whether a caller may perform an operation.
//!
//! Two tiers:
//! - **Admin**: one fixed principal that configures achievements and
//!   manages the allow-list
//! - **Authorized**: principals on the allow-list, which may record progress
//!
//! The check is pluggable through [`Authorizer`]; [`AllowList`] is the
//! in-memory set the tracker mirrors into its store.

use crate::{Principal, QuestError};
use std::collections::BTreeSet;
use std::fmt;

/// Membership check for progress-recording callers.
pub trait Authorizer: Send + Sync + fmt::Debug {
    fn is_authorized(&self, principal: &Principal) -> bool;

    /// Add a principal. Returns `true` if it was not already present.
    fn authorize(&mut self, principal: Principal) -> bool;

    /// Remove a principal. Returns `true` if it was present.
    fn revoke(&mut self, principal: &Principal) -> bool;

    /// All authorized principals, sorted.
    fn principals(&self) -> Vec<Principal>;
}

/// Allow-list backed by a `BTreeSet` (deterministic iteration).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    members: BTreeSet<Principal>,
}

impl AllowList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<Principal> for AllowList {
    fn from_iter<I: IntoIterator<Item = Principal>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl Authorizer for AllowList {
    fn is_authorized(&self, principal: &Principal) -> bool {
        self.members.contains(principal)
    }

    fn authorize(&mut self, principal: Principal) -> bool {
        self.members.insert(principal)
    }

    fn revoke(&mut self, principal: &Principal) -> bool {
        self.members.remove(principal)
    }

    fn principals(&self) -> Vec<Principal> {
        self.members.iter().copied().collect()
    }
}

/// Admin principal plus the progress allow-list.
#[derive(Debug)]
pub struct Guard {
    admin: Principal,
    authorizer: Box<dyn Authorizer>,
}

impl Guard {
    #[must_use]
    pub fn new(admin: Principal) -> Self {
        Self::with_authorizer(admin, Box::new(AllowList::new()))
    }

    #[must_use]
    pub fn with_authorizer(admin: Principal, authorizer: Box<dyn Authorizer>) -> Self {
        Self { admin, authorizer }
    }

    #[must_use]
    pub fn admin(&self) -> Principal {
        self.admin
    }

    /// Fail with `UnauthorizedCaller` unless `caller` is the admin.
    pub fn require_admin(&self, caller: &Principal) -> Result<(), QuestError> {
        if *caller == self.admin {
            Ok(())
        } else {
            Err(QuestError::UnauthorizedCaller(*caller))
        }
    }

    /// Fail with `UnauthorizedCaller` unless `caller` is on the allow-list.
    pub fn require_authorized(&self, caller: &Principal) -> Result<(), QuestError> {
        if self.authorizer.is_authorized(caller) {
            Ok(())
        } else {
            Err(QuestError::UnauthorizedCaller(*caller))
        }
    }

    #[must_use]
    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.authorizer.is_authorized(principal)
    }

    pub fn authorize(&mut self, principal: Principal) -> bool {
        self.authorizer.authorize(principal)
    }

    pub fn revoke(&mut self, principal: &Principal) -> bool {
        self.authorizer.revoke(principal)
    }

    #[must_use]
    pub fn principals(&self) -> Vec<Principal> {
        self.authorizer.principals()
    }
}
