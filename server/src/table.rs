//! The lease table (§4.3).
//!
//! Holds the authoritative lease records and fans out `LeaseEvent`s.
//! Never calls into `AddressPool`: reclaiming a freed address after an
//! eviction is left to the caller, which keeps the `leases_sync →
//! lease-table → pool` lock order (§5) a property of call sites rather
//! than something the table has to enforce on itself.

use std::collections::HashMap;
use std::sync::Mutex;

use std::net::Ipv4Addr;

use dhcp_protocol::HwAddr;

use crate::error::Error;
use crate::events::{LeaseEvent, LeaseEventSender};
use crate::lease::{Lease, LeaseStatus};

pub struct LeaseTable {
    records: Mutex<HashMap<HwAddr, Lease>>,
    events: LeaseEventSender,
    default_lease_time: u32,
}

/// The fields a protocol-engine reply actually needs to write back into
/// a record (§4.4.6).
pub struct LeaseUpdate {
    pub address: Ipv4Addr,
    pub status: LeaseStatus,
    pub lease_time: u32,
    pub start: i64,
    pub hostname: Option<String>,
    pub client_id: Option<Vec<u8>>,
    /// Option items carried on the request, stored informationally on the
    /// lease (§3 `options`).
    pub options: Vec<(u8, Vec<u8>)>,
}

impl LeaseTable {
    pub fn new(default_lease_time: u32) -> (Self, tokio::sync::broadcast::Receiver<LeaseEvent>) {
        let (events, rx) = LeaseEventSender::new();
        (
            LeaseTable {
                records: Mutex::new(HashMap::new()),
                events,
                default_lease_time,
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LeaseEvent> {
        self.events.subscribe()
    }

    pub fn get_by_hwaddr(&self, hwaddr: &HwAddr) -> Option<Lease> {
        self.records.lock().expect("lease table lock poisoned").get(hwaddr).cloned()
    }

    pub fn get_by_address(&self, address: Ipv4Addr) -> Option<Lease> {
        self.records
            .lock()
            .expect("lease table lock poisoned")
            .values()
            .find(|lease| lease.address == address)
            .cloned()
    }

    /// Creates a fresh `Created` record if none exists yet, otherwise
    /// returns the existing one unchanged (§4.3 `create`).
    pub fn create(&self, hwaddr: HwAddr) -> Lease {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        records
            .entry(hwaddr.clone())
            .or_insert_with(|| Lease::new(hwaddr, self.default_lease_time))
            .clone()
    }

    /// Applies `update` to the record for `hwaddr`, which must already
    /// exist (created via `create`). Emits `Added` the first time the
    /// record leaves `Created`, `Changed` on every later call.
    ///
    /// A static record's address is never overwritten (§3 invariant 3);
    /// every other field copies over as normal, so a static lease's own
    /// client still gets an OFFER/ACK answering its DISCOVER/REQUEST
    /// (§4.3 "Copy address (if not static), options, hostname, client_id,
    /// status, lease_time").
    pub fn update(&self, hwaddr: &HwAddr, update: LeaseUpdate) -> Result<Lease, Error> {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        let record = records.get_mut(hwaddr).ok_or_else(|| Error::NotFound(hwaddr.clone()))?;

        let was_created = record.status == LeaseStatus::Created;
        if !record.is_static {
            record.address = update.address;
        }
        record.status = update.status;
        record.lease_time = update.lease_time;
        record.start = update.start;
        record.end = if update.lease_time == 0 {
            0
        } else {
            update.start + i64::from(update.lease_time)
        };
        if update.hostname.is_some() {
            record.hostname = update.hostname;
        }
        if update.client_id.is_some() {
            record.client_id = update.client_id;
        }
        record.options = update.options;
        let snapshot = record.clone();

        self.events.send(if was_created {
            LeaseEvent::Added(snapshot.clone())
        } else {
            LeaseEvent::Changed(snapshot.clone())
        });
        Ok(snapshot)
    }

    /// Deletes the record outright, used by the engine for DECLINE, for
    /// RELEASE when `ciaddr` does not match the held address, and for
    /// rejected REQUESTs. Fails for a static lease (§4.3 `remove`, §7
    /// `StaticViolation`) — a client cannot DECLINE or be NAK'd out of
    /// an operator-pinned reservation.
    pub fn remove(&self, hwaddr: &HwAddr) -> Result<Lease, Error> {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        let record = records.get(hwaddr).ok_or_else(|| Error::NotFound(hwaddr.clone()))?;
        if record.is_static {
            return Err(Error::StaticViolation(hwaddr.clone()));
        }
        let removed = records.remove(hwaddr).expect("presence just checked under the same lock");
        drop(records);
        self.events.send(LeaseEvent::Removed(removed.clone()));
        Ok(removed)
    }

    /// Marks a lease static, pinning its address and making it immune
    /// to expiry. Rejects the request if another non-static lease
    /// already holds the address (§4.3 `make_static`). A static lease's
    /// address never changes (§3 invariant 3): a repeat call is either
    /// an idempotent no-op (same address) or a `StaticViolation` (a
    /// different one) — `make_dynamic` first if a reassignment is
    /// genuinely intended.
    pub fn make_static(&self, hwaddr: &HwAddr, address: Ipv4Addr) -> Result<Lease, Error> {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        if records
            .iter()
            .any(|(other, lease)| other != hwaddr && lease.address == address && !lease.is_static)
        {
            return Err(Error::Conflict(address));
        }
        let record = records
            .entry(hwaddr.clone())
            .or_insert_with(|| Lease::new(hwaddr.clone(), self.default_lease_time));

        if record.is_static {
            // Idempotent: a second call with identical state is a no-op
            // and emits nothing (§8, invariant 6).
            if record.address == address {
                return Ok(record.clone());
            }
            return Err(Error::StaticViolation(hwaddr.clone()));
        }

        let was_created = record.status == LeaseStatus::Created;
        record.address = address;
        record.status = LeaseStatus::Bound;
        record.is_static = true;
        record.lease_time = 0;
        record.end = 0;
        let snapshot = record.clone();
        self.events.send(if was_created {
            LeaseEvent::Added(snapshot.clone())
        } else {
            LeaseEvent::Changed(snapshot.clone())
        });
        Ok(snapshot)
    }

    /// Reverts a static lease back to ordinary dynamic accounting
    /// (§4.3 `make_dynamic`).
    pub fn make_dynamic(&self, hwaddr: &HwAddr) -> Result<Lease, Error> {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        let record = records.get_mut(hwaddr).ok_or_else(|| Error::NotFound(hwaddr.clone()))?;
        record.is_static = false;
        record.lease_time = self.default_lease_time;
        let snapshot = record.clone();
        self.events.send(LeaseEvent::Changed(snapshot.clone()));
        Ok(snapshot)
    }

    /// Evicts the single longest-expired non-static lease, returning
    /// its freed address so the caller can return it to the pool
    /// (§4.3 "Expiry sweeper", §4.2 "Reclaiming").
    pub fn evict_oldest_expired(&self, now: i64) -> Option<Ipv4Addr> {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        let hwaddr = records
            .iter()
            .filter(|(_, lease)| !lease.is_static && lease.is_expired(now))
            .min_by_key(|(_, lease)| lease.end)
            .map(|(hwaddr, _)| hwaddr.clone())?;
        let lease = records.remove(&hwaddr)?;
        let address = lease.address;
        drop(records);
        self.events.send(LeaseEvent::Removed(lease));
        Some(address)
    }

    /// The periodic sweep (§4.3 "Expiry sweeper"): every non-static,
    /// non-already-Released lease whose `end` has passed is demoted to
    /// `Released` in place. Unlike `evict_oldest_expired`, the record
    /// and its address are retained — a Released lease is only
    /// actually removed (and its address freed) by `evict_oldest_expired`
    /// or an explicit `remove`.
    pub fn transition_expired_to_released(&self, now: i64) -> usize {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        let due: Vec<HwAddr> = records
            .iter()
            .filter(|(_, lease)| {
                !lease.is_static && lease.status != LeaseStatus::Released && lease.is_expired(now)
            })
            .map(|(hwaddr, _)| hwaddr.clone())
            .collect();
        for hwaddr in &due {
            if let Some(record) = records.get_mut(hwaddr) {
                record.status = LeaseStatus::Released;
                let snapshot = record.clone();
                self.events.send(LeaseEvent::Changed(snapshot));
            }
        }
        due.len()
    }

    /// Evicts the lease holding `address`, if any, provided it is
    /// non-static and `Released` (§4.2 `allocate_specific`, second
    /// branch). Used when a specific address is requested but the pool's
    /// free set doesn't have it — the sweeper may have released it
    /// without yet reaping it.
    pub fn evict_if_released(&self, address: Ipv4Addr) -> Option<Lease> {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        let hwaddr = records
            .iter()
            .find(|(_, lease)| lease.address == address && !lease.is_static && lease.status == LeaseStatus::Released)
            .map(|(hwaddr, _)| hwaddr.clone())?;
        let lease = records.remove(&hwaddr)?;
        drop(records);
        self.events.send(LeaseEvent::Removed(lease.clone()));
        Some(lease)
    }

    /// Removes every lease left in `Released` after its client gave it
    /// up explicitly (§4.4, RELEASE handling), returning freed
    /// addresses.
    pub fn evict_released(&self) -> Vec<Ipv4Addr> {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        let released: Vec<HwAddr> = records
            .iter()
            .filter(|(_, lease)| lease.status == LeaseStatus::Released)
            .map(|(hwaddr, _)| hwaddr.clone())
            .collect();
        let mut freed = Vec::new();
        for hwaddr in released {
            if let Some(lease) = records.remove(&hwaddr) {
                freed.push(lease.address);
                self.events.send(LeaseEvent::Removed(lease));
            }
        }
        freed
    }

    pub fn snapshot(&self) -> Vec<Lease> {
        self.records.lock().expect("lease table lock poisoned").values().cloned().collect()
    }

    /// Seeds the table from persisted or statically configured leases
    /// (§6, `initial_leases`). Does not emit events: these records are
    /// already current as of startup.
    pub fn load(&self, leases: Vec<Lease>) {
        let mut records = self.records.lock().expect("lease table lock poisoned");
        for lease in leases {
            records.insert(lease.hwaddr.clone(), lease);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw(byte: u8) -> HwAddr {
        HwAddr::from(vec![byte; 6])
    }

    #[test]
    fn create_then_update_emits_added_once() {
        let (table, mut rx) = LeaseTable::new(60);
        table.create(hw(1));
        let lease = table
            .update(
                &hw(1),
                LeaseUpdate {
                    address: "10.0.0.5".parse().unwrap(),
                    status: LeaseStatus::Bound,
                    lease_time: 60,
                    start: 1000,
                    hostname: None,
                    client_id: None,
                    options: Vec::new(),
                },
            )
            .unwrap();
        assert_eq!(lease.end, 1060);
        match rx.try_recv().unwrap() {
            LeaseEvent::Added(_) => {}
            other => panic!("expected Added, got {:?}", other),
        }

        table
            .update(
                &hw(1),
                LeaseUpdate {
                    address: "10.0.0.5".parse().unwrap(),
                    status: LeaseStatus::Bound,
                    lease_time: 60,
                    start: 2000,
                    hostname: None,
                    client_id: None,
                    options: Vec::new(),
                },
            )
            .unwrap();
        match rx.try_recv().unwrap() {
            LeaseEvent::Changed(_) => {}
            other => panic!("expected Changed, got {:?}", other),
        }
    }

    #[test]
    fn sweep_transitions_expired_dynamic_leases_to_released() {
        let (table, _rx) = LeaseTable::new(60);
        table.create(hw(1));
        table
            .update(
                &hw(1),
                LeaseUpdate {
                    address: "10.0.0.1".parse().unwrap(),
                    status: LeaseStatus::Bound,
                    lease_time: 10,
                    start: 0,
                    hostname: None,
                    client_id: None,
                    options: Vec::new(),
                },
            )
            .unwrap();

        assert_eq!(table.transition_expired_to_released(5), 0);
        assert_eq!(table.transition_expired_to_released(11), 1);
        assert_eq!(table.get_by_hwaddr(&hw(1)).unwrap().status, LeaseStatus::Released);
    }

    #[test]
    fn evict_oldest_expired_removes_the_record_and_frees_its_address() {
        let (table, _rx) = LeaseTable::new(60);
        table.create(hw(1));
        table
            .update(
                &hw(1),
                LeaseUpdate {
                    address: "10.0.0.1".parse().unwrap(),
                    status: LeaseStatus::Bound,
                    lease_time: 10,
                    start: 0,
                    hostname: None,
                    client_id: None,
                    options: Vec::new(),
                },
            )
            .unwrap();

        assert_eq!(table.evict_oldest_expired(5), None);
        assert_eq!(table.evict_oldest_expired(11), Some("10.0.0.1".parse().unwrap()));
        assert!(table.get_by_hwaddr(&hw(1)).is_none());
    }

    #[test]
    fn make_static_rejects_conflicting_address() {
        let (table, _rx) = LeaseTable::new(60);
        table.create(hw(1));
        table
            .update(
                &hw(1),
                LeaseUpdate {
                    address: "10.0.0.1".parse().unwrap(),
                    status: LeaseStatus::Bound,
                    lease_time: 60,
                    start: 0,
                    hostname: None,
                    client_id: None,
                    options: Vec::new(),
                },
            )
            .unwrap();

        let result = table.make_static(&hw(2), "10.0.0.1".parse().unwrap());
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn make_static_is_idempotent_but_rejects_reassignment() {
        let (table, _rx) = LeaseTable::new(60);
        table.make_static(&hw(1), "10.0.0.1".parse().unwrap()).unwrap();

        let repeat = table.make_static(&hw(1), "10.0.0.1".parse().unwrap());
        assert!(repeat.is_ok());

        let reassign = table.make_static(&hw(1), "10.0.0.2".parse().unwrap());
        assert!(matches!(reassign, Err(Error::StaticViolation(_))));
        assert_eq!(table.get_by_hwaddr(&hw(1)).unwrap().address, "10.0.0.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn update_on_a_static_lease_keeps_its_address_but_applies_everything_else() {
        let (table, _rx) = LeaseTable::new(60);
        table.make_static(&hw(1), "10.0.0.1".parse().unwrap()).unwrap();

        let lease = table
            .update(
                &hw(1),
                LeaseUpdate {
                    address: "10.0.0.9".parse().unwrap(),
                    status: LeaseStatus::Offered,
                    lease_time: 0,
                    start: 500,
                    hostname: Some("host".to_string()),
                    client_id: None,
                    options: vec![(43, vec![1, 2, 3])],
                },
            )
            .unwrap();

        assert_eq!(lease.address, "10.0.0.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(lease.status, LeaseStatus::Offered);
        assert_eq!(lease.hostname.as_deref(), Some("host"));
        assert_eq!(lease.options, vec![(43, vec![1, 2, 3])]);
    }

    #[test]
    fn evict_if_released_only_takes_a_non_static_released_lease_at_that_address() {
        let (table, _rx) = LeaseTable::new(60);
        table.create(hw(1));
        table
            .update(
                &hw(1),
                LeaseUpdate {
                    address: "10.0.0.1".parse().unwrap(),
                    status: LeaseStatus::Bound,
                    lease_time: 10,
                    start: 0,
                    hostname: None,
                    client_id: None,
                    options: Vec::new(),
                },
            )
            .unwrap();

        assert_eq!(table.evict_if_released("10.0.0.1".parse().unwrap()), None);

        table.transition_expired_to_released(11);
        let evicted = table.evict_if_released("10.0.0.1".parse().unwrap());
        assert_eq!(evicted.map(|lease| lease.address), Some("10.0.0.1".parse().unwrap()));
        assert!(table.get_by_hwaddr(&hw(1)).is_none());
    }
}
