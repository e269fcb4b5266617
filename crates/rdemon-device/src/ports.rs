//! Device-scoped TCP port reservations
//!
//! One [`PortAllocator`] exists per device; clones share the same pool, so
//! concurrent sessions against a device never receive overlapping ports.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use rdemon_core::prelude::*;

#[derive(Debug)]
struct PortPool {
    range: RangeInclusive<u16>,
    /// Last result of gathering the device's ports in use
    device_used: BTreeSet<u16>,
    /// Ports handed out to sessions and not yet released
    reserved: BTreeSet<u16>,
}

impl PortPool {
    fn is_free(&self, port: u16) -> bool {
        !self.device_used.contains(&port) && !self.reserved.contains(&port)
    }

    fn free_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.range.clone().filter(move |port| self.is_free(*port))
    }
}

/// Hands out free ports from a fixed range on behalf of pending sessions
#[derive(Debug, Clone)]
pub struct PortAllocator {
    device_id: Arc<str>,
    pool: Arc<Mutex<PortPool>>,
}

impl PortAllocator {
    pub fn new(device_id: impl Into<String>, range: RangeInclusive<u16>) -> Self {
        let device_id: String = device_id.into();
        Self {
            device_id: Arc::from(device_id),
            pool: Arc::new(Mutex::new(PortPool {
                range,
                device_used: BTreeSet::new(),
                reserved: BTreeSet::new(),
            })),
        }
    }

    fn pool(&self) -> std::sync::MutexGuard<'_, PortPool> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Candidate range, for asking the device which of them are busy
    pub fn candidates(&self) -> RangeInclusive<u16> {
        self.pool().range.clone()
    }

    /// Replace the set of ports the device reports in use
    pub fn set_device_used_ports(&self, ports: impl IntoIterator<Item = u16>) {
        let mut pool = self.pool();
        pool.device_used = ports.into_iter().collect();
        debug!(
            "Device {} reports {} used ports in range",
            self.device_id,
            pool.device_used.len()
        );
    }

    /// Reserve `count` ports, lowest first. All-or-nothing.
    pub fn reserve(&self, count: usize) -> Result<Vec<u16>> {
        let mut pool = self.pool();
        let ports: Vec<u16> = pool.free_ports().take(count).collect();

        if ports.len() < count {
            let available = ports.len();
            warn!(
                "Port exhaustion on {}: requested {}, {} free",
                self.device_id, count, available
            );
            return Err(Error::port_exhaustion(count, available));
        }

        pool.reserved.extend(ports.iter().copied());
        debug!("Reserved ports {:?} on {}", ports, self.device_id);
        Ok(ports)
    }

    /// Release `ports`. Idempotent; ports never reserved are ignored.
    ///
    /// Returns how many ports were actually released.
    pub fn release(&self, ports: &[u16]) -> usize {
        let mut pool = self.pool();
        let released = ports
            .iter()
            .filter(|port| pool.reserved.remove(*port))
            .count();
        if released > 0 {
            debug!("Released {} ports on {}", released, self.device_id);
        }
        released
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.pool().reserved.contains(&port)
    }

    pub fn reserved_count(&self) -> usize {
        self.pool().reserved.len()
    }

    pub fn free_count(&self) -> usize {
        self.pool().free_ports().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_reserve_returns_lowest_free_ports_in_order() {
        let ports = PortAllocator::new("dev", 10000..=10010);
        assert_eq!(ports.reserve(2).unwrap(), vec![10000, 10001]);
        assert_eq!(ports.reserve(1).unwrap(), vec![10002]);
        assert_eq!(ports.reserved_count(), 3);
    }

    #[test]
    fn test_reserve_skips_device_used_ports() {
        let ports = PortAllocator::new("dev", 10000..=10003);
        ports.set_device_used_ports([10000, 10002]);
        assert_eq!(ports.reserve(2).unwrap(), vec![10001, 10003]);
    }

    #[test]
    fn test_exhaustion_is_all_or_nothing() {
        let ports = PortAllocator::new("dev", 10000..=10001);
        ports.set_device_used_ports([10000]);

        let err = ports.reserve(2).unwrap_err();
        assert!(matches!(
            err,
            Error::PortExhaustion {
                requested: 2,
                available: 1
            }
        ));
        assert_eq!(ports.reserved_count(), 0);
    }

    #[test]
    fn test_release_is_idempotent_and_tolerates_unknown_ports() {
        let ports = PortAllocator::new("dev", 10000..=10010);
        let reserved = ports.reserve(2).unwrap();

        assert_eq!(ports.release(&reserved), 2);
        assert_eq!(ports.release(&reserved), 0);
        assert_eq!(ports.release(&[12345]), 0);
        assert_eq!(ports.reserved_count(), 0);
    }

    #[test]
    fn test_released_ports_can_be_reserved_again() {
        let ports = PortAllocator::new("dev", 10000..=10000);
        let first = ports.reserve(1).unwrap();
        assert!(ports.reserve(1).is_err());
        ports.release(&first);
        assert_eq!(ports.reserve(1).unwrap(), first);
    }

    #[test]
    fn test_clones_share_the_pool() {
        let a = PortAllocator::new("dev", 10000..=10001);
        let b = a.clone();
        let from_a = a.reserve(1).unwrap();
        let from_b = b.reserve(1).unwrap();
        assert_ne!(from_a, from_b);
        assert!(b.is_reserved(from_a[0]));
        assert_eq!(a.free_count(), 0);
    }

    #[test]
    fn test_concurrent_reservations_never_overlap() {
        let ports = PortAllocator::new("dev", 20000..=20199);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ports = ports.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter_map(|_| ports.reserve(2).ok())
                        .flatten()
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for port in handle.join().unwrap() {
                assert!(seen.insert(port), "port {} handed out twice", port);
            }
        }
        assert_eq!(seen.len(), 160);
    }
}
