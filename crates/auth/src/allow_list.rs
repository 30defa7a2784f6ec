//! Authorization matcher: client allow-list with constant-time comparison.

use subtle::ConstantTimeEq;
use thiserror::Error;

use tokengate_core::ClientIdentity;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllowListError {
    #[error("allow-list must contain at least one client")]
    Empty,

    #[error("allow-list contains a blank client name")]
    BlankEntry,

    #[error("allow-list contains duplicate client '{0}'")]
    Duplicate(String),
}

/// Constant-time byte comparison.
///
/// Lengths are compared first; equal-length inputs are compared in time
/// independent of where (or whether) they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// The set of client identities allowed to present tokens.
///
/// Entries are trimmed and unique; the list is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    entries: Vec<ClientIdentity>,
}

impl AllowList {
    pub fn new<I, S>(clients: I) -> Result<Self, AllowListError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<ClientIdentity> = Vec::new();
        for client in clients {
            let name = client.as_ref().trim();
            if name.is_empty() {
                return Err(AllowListError::BlankEntry);
            }
            if entries.iter().any(|e| e.as_str() == name) {
                return Err(AllowListError::Duplicate(name.to_string()));
            }
            entries.push(ClientIdentity::new(name));
        }

        if entries.is_empty() {
            return Err(AllowListError::Empty);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientIdentity> {
        self.entries.iter()
    }

    /// Resolve a token body to an allowed identity.
    ///
    /// Every entry is compared, even after a match, so the time taken does not
    /// depend on the matching entry's position.
    pub fn authorize(&self, body: &str) -> Option<ClientIdentity> {
        let candidate = body.trim().as_bytes();
        let mut matched: Option<&ClientIdentity> = None;

        for entry in &self.entries {
            let equal = constant_time_eq(entry.as_str().as_bytes(), candidate);
            if equal && matched.is_none() {
                matched = Some(entry);
            }
        }

        matched.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorizes_trimmed_body() {
        let list = AllowList::new(["svcA", " svcB "]).unwrap();
        assert_eq!(list.authorize("svcA"), Some(ClientIdentity::new("svcA")));
        assert_eq!(list.authorize("  svcB\t"), Some(ClientIdentity::new("svcB")));
    }

    #[test]
    fn rejects_unknown_and_prefixes() {
        let list = AllowList::new(["svcA"]).unwrap();
        assert_eq!(list.authorize("unknownSvc"), None);
        assert_eq!(list.authorize("svc"), None);
        assert_eq!(list.authorize("svcAA"), None);
        assert_eq!(list.authorize("SVCA"), None);
        assert_eq!(list.authorize(""), None);
    }

    #[test]
    fn construction_rules() {
        assert_eq!(AllowList::new(Vec::<String>::new()), Err(AllowListError::Empty));
        assert_eq!(AllowList::new(["a", "  "]), Err(AllowListError::BlankEntry));
        assert_eq!(
            AllowList::new(["a", " a"]),
            Err(AllowListError::Duplicate("a".to_string()))
        );
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: constant-time comparison agrees with `==`.
            #[test]
            fn constant_time_eq_matches_std(a in ".{0,32}", b in ".{0,32}") {
                prop_assert_eq!(constant_time_eq(a.as_bytes(), b.as_bytes()), a == b);
            }

            /// Property: every configured client authorizes as itself, whatever
            /// surrounding whitespace the token body carries.
            #[test]
            fn configured_clients_resolve_to_themselves(
                names in prop::collection::hash_set("[a-z][a-z0-9-]{0,15}", 1..8),
                pad in "[ \t]{0,3}",
            ) {
                let list = AllowList::new(names.iter()).unwrap();
                for name in &names {
                    let body = format!("{pad}{name}{pad}");
                    prop_assert_eq!(list.authorize(&body), Some(ClientIdentity::new(name.as_str())));
                }
            }
        }
    }
}
