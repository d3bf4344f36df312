//! Pending Interest Table (§4.3 data model).
//!
//! One outstanding interest per name is ever forwarded upstream: repeated
//! interests for the same name aggregate onto the existing PIT entry instead
//! of generating a second outbound interest (interest aggregation, §8
//! scenario 2). `requester_address` is `None` when the requester is this
//! node's own public API call (`get`), which is satisfied in-process rather
//! than by sending a packet back out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requester {
    pub name: String,
    pub address: Option<SocketAddr>,
}

struct PendingEntry {
    requesters: Vec<Requester>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct PendingInterestTable {
    entries: HashMap<String, PendingEntry>,
}

/// Result of inserting an interest into the table.
pub enum InsertOutcome {
    /// No entry existed for this name; the caller must forward upstream.
    NewRequest,
    /// An entry already existed; this requester was aggregated onto it and
    /// no new outbound interest should be sent.
    Aggregated,
}

impl PendingInterestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record interest in `name` from `requester`, aggregating with any
    /// existing pending request.
    pub fn insert(&mut self, name: &str, requester: Requester, timeout: Duration) -> InsertOutcome {
        match self.entries.get_mut(name) {
            Some(entry) => {
                if !entry.requesters.contains(&requester) {
                    entry.requesters.push(requester);
                }
                InsertOutcome::Aggregated
            }
            None => {
                self.entries.insert(
                    name.to_string(),
                    PendingEntry {
                        requesters: vec![requester],
                        expires_at: Instant::now() + timeout,
                    },
                );
                InsertOutcome::NewRequest
            }
        }
    }

    /// Remove and return every requester waiting on `name`, satisfied by
    /// incoming data. Absent if there was no pending interest.
    pub fn take_requesters(&mut self, name: &str) -> Option<Vec<Requester>> {
        self.entries.remove(name).map(|e| e.requesters)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Drop interests whose response_timeout has elapsed, returning their
    /// names so the caller can notify waiting `get` calls.
    pub fn expire(&mut self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            self.entries.remove(name);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requester(name: &str) -> Requester {
        Requester { name: name.to_string(), address: None }
    }

    #[test]
    fn first_interest_is_a_new_request() {
        let mut pit = PendingInterestTable::new();
        let outcome = pit.insert("/house1/room1/temp", requester("/house2/room1"), Duration::from_secs(60));
        assert!(matches!(outcome, InsertOutcome::NewRequest));
    }

    #[test]
    fn second_interest_for_same_name_aggregates() {
        let mut pit = PendingInterestTable::new();
        pit.insert("/house1/room1/temp", requester("/house2/room1"), Duration::from_secs(60));
        let outcome = pit.insert("/house1/room1/temp", requester("/house3/room1"), Duration::from_secs(60));
        assert!(matches!(outcome, InsertOutcome::Aggregated));
        let requesters = pit.take_requesters("/house1/room1/temp").unwrap();
        assert_eq!(requesters.len(), 2);
    }

    #[test]
    fn duplicate_requester_is_not_double_counted() {
        let mut pit = PendingInterestTable::new();
        pit.insert("/house1/room1/temp", requester("/house2/room1"), Duration::from_secs(60));
        pit.insert("/house1/room1/temp", requester("/house2/room1"), Duration::from_secs(60));
        let requesters = pit.take_requesters("/house1/room1/temp").unwrap();
        assert_eq!(requesters.len(), 1);
    }

    #[test]
    fn take_requesters_clears_the_entry() {
        let mut pit = PendingInterestTable::new();
        pit.insert("/x", requester("/y"), Duration::from_secs(60));
        pit.take_requesters("/x");
        assert!(!pit.is_pending("/x"));
    }

    #[test]
    fn expire_drops_past_deadline_entries() {
        let mut pit = PendingInterestTable::new();
        pit.insert("/x", requester("/y"), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        let expired = pit.expire();
        assert_eq!(expired, vec!["/x".to_string()]);
        assert!(pit.is_empty());
    }
}
