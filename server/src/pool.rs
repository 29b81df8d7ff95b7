//! The address pool (§4.2).
//!
//! The pool only ever tracks which addresses are free. It never looks
//! up or mutates a lease record itself: reclaiming an expired lease's
//! address is the engine's job, coordinating the lease table and the
//! pool in that order (§5).

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use crate::error::Error;

/// A contiguous range of addresses available for dynamic assignment,
/// plus the free subset of it.
pub struct AddressPool {
    start: Ipv4Addr,
    end: Ipv4Addr,
    /// Whether `allocate_specific` accepts an address outside
    /// `start..=end` (SPEC_FULL.md §9, open question (a)).
    accept_out_of_range: bool,
    free: Mutex<BTreeSet<Ipv4Addr>>,
}

impl AddressPool {
    /// Builds a pool spanning `start..=end` (inclusive), initially
    /// entirely free.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr, accept_out_of_range: bool) -> Self {
        let mut free = BTreeSet::new();
        let mut current = u32::from(start);
        let last = u32::from(end);
        while current <= last {
            free.insert(Ipv4Addr::from(current));
            if current == last {
                break;
            }
            current += 1;
        }
        AddressPool {
            start,
            end,
            accept_out_of_range,
            free: Mutex::new(free),
        }
    }

    /// Parses a textual address range (§4.2 "Construction"): either an
    /// inclusive bound pair `a.b.c.d-a.b.c.e`, or a CIDR block
    /// `a.b.c.d/n`, in which case the block's network and broadcast
    /// addresses become the bounds.
    pub fn parse_range(text: &str) -> Result<(Ipv4Addr, Ipv4Addr), Error> {
        let invalid = || Error::InvalidRange(text.to_string());

        if let Some((prefix, bits)) = text.split_once('/') {
            let base: Ipv4Addr = prefix.trim().parse().map_err(|_| invalid())?;
            let bits: u32 = bits.trim().parse().map_err(|_| invalid())?;
            if bits > 32 {
                return Err(invalid());
            }
            let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
            let network = u32::from(base) & mask;
            let broadcast = network | !mask;
            return Ok((Ipv4Addr::from(network), Ipv4Addr::from(broadcast)));
        }

        if let Some((start, end)) = text.split_once('-') {
            let start: Ipv4Addr = start.trim().parse().map_err(|_| invalid())?;
            let end: Ipv4Addr = end.trim().parse().map_err(|_| invalid())?;
            if u32::from(start) > u32::from(end) {
                return Err(invalid());
            }
            return Ok((start, end));
        }

        Err(invalid())
    }

    /// Builds a pool from a textual range or CIDR block (§4.2
    /// "Construction").
    pub fn from_range_str(text: &str, accept_out_of_range: bool) -> Result<Self, Error> {
        let (start, end) = Self::parse_range(text)?;
        Ok(Self::new(start, end, accept_out_of_range))
    }

    pub fn in_range(&self, address: Ipv4Addr) -> bool {
        u32::from(address) >= u32::from(self.start) && u32::from(address) <= u32::from(self.end)
    }

    /// Removes and returns the lowest free address, or `None` if the
    /// pool is exhausted.
    pub fn allocate_any(&self) -> Option<Ipv4Addr> {
        let mut free = self.free.lock().expect("address pool lock poisoned");
        let address = *free.iter().next()?;
        free.remove(&address);
        Some(address)
    }

    /// Reserves a specific address.
    ///
    /// Addresses in range must currently be free. An out-of-range
    /// address is accepted unconditionally when `accept_out_of_range`
    /// is set, mirroring a statically-configured lease outside the
    /// managed range (§4.2, "specific-address requests").
    pub fn allocate_specific(&self, address: Ipv4Addr) -> bool {
        if !self.in_range(address) {
            return self.accept_out_of_range;
        }
        let mut free = self.free.lock().expect("address pool lock poisoned");
        free.remove(&address)
    }

    /// Returns an address to the free set. A no-op for an address
    /// outside the managed range, since the pool never owned it.
    pub fn mark_unused(&self, address: Ipv4Addr) {
        if !self.in_range(address) {
            return;
        }
        self.free.lock().expect("address pool lock poisoned").insert(address);
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().expect("address pool lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn allocates_in_ascending_order() {
        let pool = AddressPool::new(ip("10.0.0.1"), ip("10.0.0.3"), true);
        assert_eq!(pool.allocate_any(), Some(ip("10.0.0.1")));
        assert_eq!(pool.allocate_any(), Some(ip("10.0.0.2")));
        assert_eq!(pool.allocate_any(), Some(ip("10.0.0.3")));
        assert_eq!(pool.allocate_any(), None);
    }

    #[test]
    fn mark_unused_returns_an_address_to_the_free_set() {
        let pool = AddressPool::new(ip("10.0.0.1"), ip("10.0.0.1"), true);
        assert_eq!(pool.allocate_any(), Some(ip("10.0.0.1")));
        assert_eq!(pool.allocate_any(), None);
        pool.mark_unused(ip("10.0.0.1"));
        assert_eq!(pool.allocate_any(), Some(ip("10.0.0.1")));
    }

    #[test]
    fn allocate_specific_rejects_an_already_allocated_address() {
        let pool = AddressPool::new(ip("10.0.0.1"), ip("10.0.0.2"), true);
        assert!(pool.allocate_specific(ip("10.0.0.1")));
        assert!(!pool.allocate_specific(ip("10.0.0.1")));
    }

    #[test]
    fn parses_a_dash_separated_range() {
        let (start, end) = AddressPool::parse_range("10.0.0.10-10.0.0.20").unwrap();
        assert_eq!(start, ip("10.0.0.10"));
        assert_eq!(end, ip("10.0.0.20"));
    }

    #[test]
    fn parses_a_cidr_block() {
        let (start, end) = AddressPool::parse_range("192.168.1.130/24").unwrap();
        assert_eq!(start, ip("192.168.1.0"));
        assert_eq!(end, ip("192.168.1.255"));
    }

    #[test]
    fn rejects_a_backwards_range_and_garbage_text() {
        assert!(AddressPool::parse_range("10.0.0.20-10.0.0.10").is_err());
        assert!(AddressPool::parse_range("not an address").is_err());
        assert!(AddressPool::parse_range("10.0.0.1/99").is_err());
    }

    #[test]
    fn out_of_range_address_is_gated_by_accept_out_of_range() {
        let permissive = AddressPool::new(ip("10.0.0.1"), ip("10.0.0.2"), true);
        assert!(permissive.allocate_specific(ip("192.168.1.1")));

        let strict = AddressPool::new(ip("10.0.0.1"), ip("10.0.0.2"), false);
        assert!(!strict.allocate_specific(ip("192.168.1.1")));
    }
}
