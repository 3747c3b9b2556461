//! Sequential address allocator
//!
//! Turns an [`AllocationRequest`] into concrete pool rows. Two modes:
//! - explicit: the caller's address list is consumed in order and any
//!   address already in the pool aborts the whole request
//! - synthesis: each entry walks forward from its own start address,
//!   skipping occupied addresses
//!
//! Every candidate is checked against the store after the previous row was
//! inserted, so entries later in a request see rows created earlier in it.
//! Callers run [`execute`] inside a transaction and drop it on error.

use crate::ipv4;
use crate::types::{AddressRow, AllocationEntry, AllocationMode, AllocationRequest, NewAddress};
use crate::{Error, Result};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::debug;

/// Largest `total` a single request may ask for (one /16). Every entry's
/// amount is bounded by it too, since the amounts must sum to the total.
pub const MAX_ALLOCATION_TOTAL: u32 = 65_536;

/// Storage operations the allocator needs
pub trait AddressStore {
    /// Exact-match lookup on the address column
    fn address_exists(&self, address: Ipv4Addr) -> Result<bool>;

    /// Insert one row. A uniqueness violation must surface as
    /// [`Error::AddressConflict`].
    fn insert_address(&self, new: &NewAddress) -> Result<AddressRow>;
}

/// A request that passed validation, ready to run against a store
#[derive(Debug)]
pub struct AllocationPlan<'a> {
    entries: &'a [AllocationEntry],
    explicit: Option<&'a [Ipv4Addr]>,
}

impl AllocationPlan<'_> {
    pub fn mode(&self) -> AllocationMode {
        if self.explicit.is_some() {
            AllocationMode::Explicit
        } else {
            AllocationMode::Synthesis
        }
    }
}

/// Check request consistency without touching storage
pub fn validate(request: &AllocationRequest) -> Result<AllocationPlan<'_>> {
    if request.total == 0 {
        return Err(Error::validation("total must be a positive integer"));
    }
    if request.total > MAX_ALLOCATION_TOTAL {
        return Err(Error::validation(format!(
            "total {} exceeds the limit of {} addresses per request",
            request.total, MAX_ALLOCATION_TOTAL
        )));
    }
    if request.allocations.is_empty() {
        return Err(Error::validation("at least one allocation is required"));
    }

    let sum: u64 = request.allocations.iter().map(|a| u64::from(a.amount)).sum();
    if sum != u64::from(request.total) {
        return Err(Error::validation(format!(
            "allocation amounts sum to {} but total is {}",
            sum, request.total
        )));
    }

    for (idx, entry) in request.allocations.iter().enumerate() {
        if entry.group.trim().is_empty() {
            return Err(Error::validation(format!("allocation {} has no group", idx)));
        }
    }

    match &request.addresses {
        Some(addresses) => {
            if addresses.len() as u64 != u64::from(request.total) {
                return Err(Error::validation(format!(
                    "expected {} addresses, got {}",
                    request.total,
                    addresses.len()
                )));
            }
            let mut seen = HashSet::with_capacity(addresses.len());
            for address in addresses {
                if !seen.insert(*address) {
                    return Err(Error::validation(format!(
                        "address {} is listed more than once",
                        address
                    )));
                }
            }
        }
        None => {
            if let Some(idx) = request
                .allocations
                .iter()
                .position(|a| a.start_address.is_none())
            {
                return Err(Error::validation(format!(
                    "allocation {} needs a start_address when no address list is given",
                    idx
                )));
            }
        }
    }

    Ok(AllocationPlan {
        entries: &request.allocations,
        explicit: request.addresses.as_deref(),
    })
}

/// Run a validated plan, inserting rows as it goes
pub fn execute<S: AddressStore + ?Sized>(
    store: &S,
    plan: AllocationPlan<'_>,
) -> Result<Vec<AddressRow>> {
    match plan.explicit {
        Some(addresses) => execute_explicit(store, plan.entries, addresses),
        None => execute_synthesis(store, plan.entries),
    }
}

fn reserved_row(entry: &AllocationEntry, address: Ipv4Addr) -> NewAddress {
    NewAddress {
        address,
        group: entry.group.clone(),
        gateway: entry.gateway,
        available_for_user: false,
    }
}

fn execute_explicit<S: AddressStore + ?Sized>(
    store: &S,
    entries: &[AllocationEntry],
    addresses: &[Ipv4Addr],
) -> Result<Vec<AddressRow>> {
    let mut rows = Vec::with_capacity(addresses.len());
    let mut next = addresses.iter().copied();

    for entry in entries {
        for _ in 0..entry.amount {
            let address = next
                .next()
                .ok_or_else(|| Error::validation("address list shorter than total"))?;
            if store.address_exists(address)? {
                return Err(Error::AddressConflict { address });
            }
            rows.push(store.insert_address(&reserved_row(entry, address))?);
        }
    }

    Ok(rows)
}

fn execute_synthesis<S: AddressStore + ?Sized>(
    store: &S,
    entries: &[AllocationEntry],
) -> Result<Vec<AddressRow>> {
    let mut rows = Vec::new();

    for entry in entries {
        let Some(mut cursor) = entry.start_address else {
            return Err(Error::validation(format!(
                "allocation for group {} has no start_address",
                entry.group
            )));
        };

        for unit in 0..entry.amount {
            while store.address_exists(cursor)? {
                debug!("{} is taken, skipping", cursor);
                cursor = ipv4::next_address(cursor)?;
            }
            rows.push(store.insert_address(&reserved_row(entry, cursor))?);

            if unit + 1 < entry.amount {
                cursor = ipv4::next_address(cursor)?;
            }
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddressFilter;
    use crate::Database;
    use std::cell::RefCell;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn addrs(rows: &[AddressRow]) -> Vec<String> {
        rows.iter().map(|r| r.address.to_string()).collect()
    }

    fn test_db() -> Database {
        let db = Database::open_memory().unwrap();
        for name in ["a", "b", "g"] {
            db.create_group(name, None).unwrap();
        }
        db
    }

    fn seed(db: &Database, address: &str) {
        db.create_address(&NewAddress {
            address: ip(address),
            group: "g".to_string(),
            gateway: None,
            available_for_user: true,
        })
        .unwrap();
    }

    fn pool_size(db: &Database) -> usize {
        db.list_addresses(&AddressFilter::default()).unwrap().len()
    }

    /// In-memory store that records every call, for checking the
    /// insert-then-check ordering without SQLite
    #[derive(Default)]
    struct RecordingStore {
        taken: RefCell<HashSet<Ipv4Addr>>,
        calls: RefCell<Vec<String>>,
    }

    impl AddressStore for RecordingStore {
        fn address_exists(&self, address: Ipv4Addr) -> Result<bool> {
            self.calls.borrow_mut().push(format!("check {}", address));
            Ok(self.taken.borrow().contains(&address))
        }

        fn insert_address(&self, new: &NewAddress) -> Result<AddressRow> {
            self.calls.borrow_mut().push(format!("insert {}", new.address));
            if !self.taken.borrow_mut().insert(new.address) {
                return Err(Error::AddressConflict {
                    address: new.address,
                });
            }
            Ok(AddressRow {
                id: self.taken.borrow().len() as i64,
                address: new.address,
                group: new.group.clone(),
                gateway: new.gateway,
                available_for_user: new.available_for_user,
                created_at: 0,
                updated_at: 0,
            })
        }
    }

    #[test]
    fn test_sum_must_match_total() {
        let db = test_db();
        let request = AllocationRequest {
            total: 3,
            allocations: vec![AllocationEntry::new(2, "a").starting_at(ip("10.0.0.1"))],
            addresses: None,
        };

        assert!(matches!(db.allocate(&request), Err(Error::Validation(_))));
        assert_eq!(pool_size(&db), 0);
    }

    #[test]
    fn test_total_is_capped() {
        let at_limit = AllocationRequest {
            total: MAX_ALLOCATION_TOTAL,
            allocations: vec![AllocationEntry::new(MAX_ALLOCATION_TOTAL, "a")
                .starting_at(ip("10.0.0.0"))],
            addresses: None,
        };
        assert!(validate(&at_limit).is_ok());

        let over = AllocationRequest {
            total: MAX_ALLOCATION_TOTAL + 1,
            allocations: vec![
                AllocationEntry::new(MAX_ALLOCATION_TOTAL, "a").starting_at(ip("10.0.0.0")),
                AllocationEntry::new(1, "b").starting_at(ip("10.1.0.0")),
            ],
            addresses: None,
        };
        match validate(&over) {
            Err(Error::Validation(msg)) => assert!(msg.contains("exceeds the limit")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let huge_amount = AllocationRequest {
            total: 1,
            allocations: vec![AllocationEntry::new(u32::MAX, "a").starting_at(ip("10.0.0.0"))],
            addresses: None,
        };
        assert!(matches!(validate(&huge_amount), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validation_rules() {
        let entry = AllocationEntry::new(1, "a").starting_at(ip("10.0.0.1"));

        let zero_total = AllocationRequest {
            total: 0,
            allocations: vec![AllocationEntry::new(0, "a").starting_at(ip("10.0.0.1"))],
            addresses: None,
        };
        assert!(validate(&zero_total).is_err());

        let no_entries = AllocationRequest {
            total: 1,
            allocations: vec![],
            addresses: None,
        };
        assert!(validate(&no_entries).is_err());

        let missing_start = AllocationRequest {
            total: 1,
            allocations: vec![AllocationEntry::new(1, "a")],
            addresses: None,
        };
        assert!(validate(&missing_start).is_err());

        let wrong_length = AllocationRequest {
            total: 1,
            allocations: vec![entry.clone()],
            addresses: Some(vec![ip("10.0.0.1"), ip("10.0.0.2")]),
        };
        assert!(validate(&wrong_length).is_err());

        let duplicates = AllocationRequest {
            total: 2,
            allocations: vec![AllocationEntry::new(2, "a")],
            addresses: Some(vec![ip("10.0.0.1"), ip("10.0.0.1")]),
        };
        assert!(validate(&duplicates).is_err());

        // explicit mode does not need start addresses
        let explicit = AllocationRequest {
            total: 1,
            allocations: vec![AllocationEntry::new(1, "a")],
            addresses: Some(vec![ip("10.0.0.1")]),
        };
        assert_eq!(validate(&explicit).unwrap().mode(), AllocationMode::Explicit);

        let synthesis = AllocationRequest {
            total: 1,
            allocations: vec![entry],
            addresses: None,
        };
        assert_eq!(validate(&synthesis).unwrap().mode(), AllocationMode::Synthesis);
    }

    #[test]
    fn test_synthesis_skips_occupied_start() {
        let db = test_db();
        seed(&db, "10.0.0.1");

        let request = AllocationRequest {
            total: 2,
            allocations: vec![AllocationEntry::new(2, "g").starting_at(ip("10.0.0.1"))],
            addresses: None,
        };
        let rows = db.allocate(&request).unwrap();

        assert_eq!(addrs(&rows), vec!["10.0.0.2", "10.0.0.3"]);
        assert!(rows.iter().all(|r| !r.available_for_user && r.group == "g"));
        assert_eq!(pool_size(&db), 3);
    }

    #[test]
    fn test_synthesis_skips_holes_in_the_middle() {
        let db = test_db();
        seed(&db, "10.0.0.2");
        seed(&db, "10.0.0.3");

        let request = AllocationRequest {
            total: 3,
            allocations: vec![AllocationEntry::new(3, "a").starting_at(ip("10.0.0.1"))],
            addresses: None,
        };
        let rows = db.allocate(&request).unwrap();
        assert_eq!(addrs(&rows), vec!["10.0.0.1", "10.0.0.4", "10.0.0.5"]);
    }

    #[test]
    fn test_multi_allocation_ordering() {
        let db = test_db();
        let gateway = ip("10.0.0.254");

        let request = AllocationRequest {
            total: 4,
            allocations: vec![
                AllocationEntry::new(2, "a")
                    .starting_at(ip("10.0.0.1"))
                    .with_gateway(gateway),
                AllocationEntry::new(2, "b").starting_at(ip("10.0.0.1")),
            ],
            addresses: None,
        };
        let rows = db.allocate(&request).unwrap();

        assert_eq!(
            addrs(&rows),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]
        );
        let groups: Vec<&str> = rows.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["a", "a", "b", "b"]);
        assert_eq!(rows[0].gateway, Some(gateway));
        assert_eq!(rows[2].gateway, None);
    }

    #[test]
    fn test_synthesis_carries_across_octets() {
        let db = test_db();
        let request = AllocationRequest {
            total: 2,
            allocations: vec![AllocationEntry::new(2, "a").starting_at(ip("10.0.0.255"))],
            addresses: None,
        };
        let rows = db.allocate(&request).unwrap();
        assert_eq!(addrs(&rows), vec!["10.0.0.255", "10.0.1.0"]);
    }

    #[test]
    fn test_synthesis_ends_at_last_address() {
        let db = test_db();
        let request = AllocationRequest {
            total: 1,
            allocations: vec![AllocationEntry::new(1, "a").starting_at(Ipv4Addr::BROADCAST)],
            addresses: None,
        };
        let rows = db.allocate(&request).unwrap();
        assert_eq!(addrs(&rows), vec!["255.255.255.255"]);

        let request = AllocationRequest {
            total: 1,
            allocations: vec![AllocationEntry::new(1, "a").starting_at(Ipv4Addr::BROADCAST)],
            addresses: None,
        };
        assert!(matches!(db.allocate(&request), Err(Error::Validation(_))));
        assert_eq!(pool_size(&db), 1);
    }

    #[test]
    fn test_explicit_mode_assigns_in_order() {
        let db = test_db();
        let request = AllocationRequest {
            total: 3,
            allocations: vec![
                AllocationEntry::new(1, "a"),
                AllocationEntry::new(0, "g"),
                AllocationEntry::new(2, "b"),
            ],
            addresses: Some(vec![ip("172.16.0.9"), ip("172.16.0.3"), ip("172.16.0.7")]),
        };
        let rows = db.allocate(&request).unwrap();

        assert_eq!(addrs(&rows), vec!["172.16.0.9", "172.16.0.3", "172.16.0.7"]);
        let groups: Vec<&str> = rows.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["a", "b", "b"]);
    }

    #[test]
    fn test_explicit_conflict_rolls_back() {
        let db = test_db();
        seed(&db, "10.0.0.5");

        let request = AllocationRequest {
            total: 3,
            allocations: vec![AllocationEntry::new(3, "a")],
            addresses: Some(vec![ip("10.0.0.3"), ip("10.0.0.4"), ip("10.0.0.5")]),
        };

        match db.allocate(&request) {
            Err(Error::AddressConflict { address }) => assert_eq!(address, ip("10.0.0.5")),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(pool_size(&db), 1);
        assert!(!db.address_exists(ip("10.0.0.3")).unwrap());
        assert!(!db.address_exists(ip("10.0.0.4")).unwrap());
    }

    #[test]
    fn test_unknown_group_rolls_back() {
        let db = test_db();
        let request = AllocationRequest {
            total: 2,
            allocations: vec![
                AllocationEntry::new(1, "a").starting_at(ip("10.0.0.1")),
                AllocationEntry::new(1, "missing").starting_at(ip("10.0.0.1")),
            ],
            addresses: None,
        };

        assert!(matches!(db.allocate(&request), Err(Error::Validation(_))));
        assert_eq!(pool_size(&db), 0);
    }

    #[test]
    fn test_insert_happens_before_next_check() {
        let store = RecordingStore::default();
        let request = AllocationRequest {
            total: 2,
            allocations: vec![
                AllocationEntry::new(1, "a").starting_at(ip("10.0.0.1")),
                AllocationEntry::new(1, "b").starting_at(ip("10.0.0.1")),
            ],
            addresses: None,
        };

        let rows = execute(&store, validate(&request).unwrap()).unwrap();
        assert_eq!(addrs(&rows), vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(
            *store.calls.borrow(),
            vec![
                "check 10.0.0.1",
                "insert 10.0.0.1",
                "check 10.0.0.1",
                "check 10.0.0.2",
                "insert 10.0.0.2",
            ]
        );
    }

    #[test]
    fn test_store_uniqueness_violation_surfaces_as_conflict() {
        // A store whose existence check misses a concurrent writer
        struct RacyStore(RecordingStore);

        impl AddressStore for RacyStore {
            fn address_exists(&self, _address: Ipv4Addr) -> Result<bool> {
                Ok(false)
            }

            fn insert_address(&self, new: &NewAddress) -> Result<AddressRow> {
                self.0.insert_address(new)
            }
        }

        let store = RacyStore(RecordingStore::default());
        store.0.taken.borrow_mut().insert(ip("10.0.0.1"));

        let request = AllocationRequest {
            total: 1,
            allocations: vec![AllocationEntry::new(1, "a").starting_at(ip("10.0.0.1"))],
            addresses: None,
        };
        let err = execute(&store, validate(&request).unwrap()).unwrap_err();
        assert!(matches!(err, Error::AddressConflict { address } if address == ip("10.0.0.1")));
    }
}
