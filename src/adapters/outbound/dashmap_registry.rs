//! DashMap Instance Registry
//!
//! Implements InstanceRegistry with one record per instance. Dynamic
//! fields are plain atomics, so a health update for instance A never
//! blocks a routing read for instance B.

use crate::domain::entities::{HealthState, Instance, InstanceSnapshot};
use crate::domain::errors::BalancerError;
use crate::domain::ports::{DynamicUpdate, InstanceRegistry, RegisterSpec};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const HEALTH_UNKNOWN: u8 = 0;
const HEALTH_HEALTHY: u8 = 1;
const HEALTH_UNHEALTHY: u8 = 2;

/// Sentinel for "never set" in f64-bits and timestamp atomics.
const UNSET: u64 = u64::MAX;

/// One registered instance: immutable attributes plus atomic dynamic state.
struct InstanceRecord {
    instance: Instance,
    /// Monotonic registration sequence; drives list() ordering
    seq: u64,
    health: AtomicU8,
    connections: AtomicU32,
    /// f64 bits of the latency EMA; UNSET until the first sample
    latency_ema: AtomicU64,
    /// f64 bits of the reported CPU fraction; UNSET until reported
    cpu: AtomicU64,
    /// f64 bits of the reported memory fraction; UNSET until reported
    mem: AtomicU64,
    /// Unix millis of the last successful probe; UNSET until one lands
    last_probe_ok: AtomicU64,
}

impl InstanceRecord {
    fn new(instance: Instance, seq: u64) -> Self {
        Self {
            instance,
            seq,
            health: AtomicU8::new(HEALTH_UNKNOWN),
            connections: AtomicU32::new(0),
            latency_ema: AtomicU64::new(UNSET),
            cpu: AtomicU64::new(UNSET),
            mem: AtomicU64::new(UNSET),
            last_probe_ok: AtomicU64::new(UNSET),
        }
    }

    fn health_state(&self) -> HealthState {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_HEALTHY => HealthState::Healthy,
            HEALTH_UNHEALTHY => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }

    fn set_health(&self, state: HealthState) {
        let raw = match state {
            HealthState::Unknown => HEALTH_UNKNOWN,
            HealthState::Healthy => HEALTH_HEALTHY,
            HealthState::Unhealthy => HEALTH_UNHEALTHY,
        };
        self.health.store(raw, Ordering::Relaxed);
    }

    /// Apply a signed connection delta, saturating at zero.
    fn apply_connections_delta(&self, delta: i32) {
        if delta >= 0 {
            self.connections.fetch_add(delta as u32, Ordering::Relaxed);
            return;
        }

        let dec = delta.unsigned_abs();
        // Compare-exchange loop to prevent underflow
        let mut current = self.connections.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(dec);
            match self.connections.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    /// Fold a latency sample into the moving average. The first sample
    /// seeds the average directly.
    fn fold_latency(&self, sample_secs: f64, alpha: f64) {
        let mut current = self.latency_ema.load(Ordering::Relaxed);
        loop {
            let next = if current == UNSET {
                sample_secs
            } else {
                alpha * sample_secs + (1.0 - alpha) * f64::from_bits(current)
            };
            match self.latency_ema.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    fn snapshot(&self) -> InstanceSnapshot {
        let read_f64 = |cell: &AtomicU64| {
            let bits = cell.load(Ordering::Relaxed);
            (bits != UNSET).then(|| f64::from_bits(bits))
        };

        InstanceSnapshot {
            id: self.instance.id.clone(),
            host: self.instance.host.clone(),
            port: self.instance.port,
            weight: self.instance.weight,
            region: self.instance.region.clone(),
            tags: self.instance.tags.clone(),
            health: self.health_state(),
            connections: self.connections.load(Ordering::Relaxed),
            avg_latency_secs: read_f64(&self.latency_ema).unwrap_or(0.0),
            cpu: read_f64(&self.cpu),
            mem: read_f64(&self.mem),
            last_probe_ok_ms: {
                let ms = self.last_probe_ok.load(Ordering::Relaxed);
                (ms != UNSET).then_some(ms)
            },
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// DashMap-backed instance registry.
///
/// Host:port uniqueness is enforced through a secondary endpoint index
/// whose entry insertion doubles as the duplicate check.
pub struct DashMapInstanceRegistry {
    records: DashMap<String, Arc<InstanceRecord>>,
    /// active "host:port" -> instance id
    endpoints: DashMap<String, String>,
    next_seq: AtomicU64,
    /// Smoothing factor for the latency moving average
    alpha: f64,
}

impl DashMapInstanceRegistry {
    /// Default EMA smoothing factor.
    pub const DEFAULT_ALPHA: f64 = 0.2;

    pub fn new() -> Self {
        Self::with_alpha(Self::DEFAULT_ALPHA)
    }

    pub fn with_alpha(alpha: f64) -> Self {
        Self {
            records: DashMap::new(),
            endpoints: DashMap::new(),
            next_seq: AtomicU64::new(0),
            alpha,
        }
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for DashMapInstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry for DashMapInstanceRegistry {
    fn register(&self, spec: RegisterSpec) -> Result<String, BalancerError> {
        let addr = format!("{}:{}", spec.host, spec.port);
        let id = Uuid::new_v4().to_string();

        // The endpoint index entry is the uniqueness gate: whoever wins
        // the vacant entry owns the host:port pair.
        match self.endpoints.entry(addr) {
            Entry::Occupied(_) => {
                return Err(BalancerError::DuplicateInstance {
                    host: spec.host,
                    port: spec.port,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let instance = Instance {
            id: id.clone(),
            host: spec.host,
            port: spec.port,
            weight: spec.weight,
            region: spec.region,
            tags: spec.tags,
        };

        tracing::info!(
            "registered instance {} at {} (weight {})",
            id,
            instance.addr(),
            instance.weight
        );
        self.records
            .insert(id.clone(), Arc::new(InstanceRecord::new(instance, seq)));
        Ok(id)
    }

    fn deregister(&self, id: &str) {
        let Some((_, record)) = self.records.remove(id) else {
            return;
        };

        let addr = record.instance.addr();
        // Only drop the endpoint mapping if it still points at us; the
        // pair may already have been re-registered under a new id.
        self.endpoints.remove_if(&addr, |_, owner| owner == id);
        tracing::info!("deregistered instance {} at {}", id, addr);
    }

    fn get(&self, id: &str) -> Option<InstanceSnapshot> {
        self.records.get(id).map(|r| r.snapshot())
    }

    fn list(&self, healthy_only: bool) -> Result<Vec<InstanceSnapshot>, BalancerError> {
        let mut entries: Vec<(u64, InstanceSnapshot)> = self
            .records
            .iter()
            .map(|r| (r.seq, r.snapshot()))
            .filter(|(_, snap)| !healthy_only || snap.is_healthy())
            .collect();

        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, snap)| snap).collect())
    }

    fn update_dynamic(&self, id: &str, update: DynamicUpdate) -> bool {
        let Some(record) = self.records.get(id) else {
            return false;
        };

        if let Some(state) = update.health {
            record.set_health(state);
        }
        if let Some(delta) = update.connections_delta {
            record.apply_connections_delta(delta);
        }
        if let Some(sample) = update.latency_sample {
            record.fold_latency(sample, self.alpha);
        }
        if let Some(cpu) = update.cpu {
            record.cpu.store(cpu.to_bits(), Ordering::Relaxed);
        }
        if let Some(mem) = update.mem {
            record.mem.store(mem.to_bits(), Ordering::Relaxed);
        }
        if update.probe_ok {
            record.last_probe_ok.store(unix_millis(), Ordering::Relaxed);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DashMapInstanceRegistry {
        DashMapInstanceRegistry::new()
    }

    // ===== Registration =====

    #[test]
    fn test_register_starts_unknown() {
        let reg = registry();
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        let snap = reg.get(&id).unwrap();
        assert_eq!(snap.health, HealthState::Unknown);
        assert_eq!(snap.connections, 0);
        assert_eq!(snap.avg_latency_secs, 0.0);
        assert!(snap.cpu.is_none());
        assert!(snap.last_probe_ok_ms.is_none());
    }

    #[test]
    fn test_register_duplicate_host_port_fails() {
        let reg = registry();
        reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        let err = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap_err();
        assert!(matches!(err, BalancerError::DuplicateInstance { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_same_host_different_port_ok() {
        let reg = registry();
        reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();
        reg.register(RegisterSpec::new("10.0.0.1", 8081)).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_reregister_after_deregister() {
        let reg = registry();
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();
        reg.deregister(&id);

        // The pair is free again once the old instance is gone
        let id2 = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();
        assert_ne!(id, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_deregister_idempotent() {
        let reg = registry();
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        reg.deregister(&id);
        reg.deregister(&id);
        reg.deregister("never-existed");
        assert!(reg.is_empty());
    }

    #[test]
    fn test_register_spec_builder() {
        let reg = registry();
        let id = reg
            .register(
                RegisterSpec::new("10.0.0.2", 9000)
                    .with_weight(2.5)
                    .with_region("eu-west")
                    .with_tag("container", "pod-7"),
            )
            .unwrap();

        let snap = reg.get(&id).unwrap();
        assert_eq!(snap.weight, 2.5);
        assert_eq!(snap.region, "eu-west");
        assert_eq!(snap.tags.get("container"), Some(&"pod-7".to_string()));
    }

    // ===== Listing =====

    #[test]
    fn test_list_insertion_order() {
        let reg = registry();
        let a = reg.register(RegisterSpec::new("10.0.0.1", 1)).unwrap();
        let b = reg.register(RegisterSpec::new("10.0.0.1", 2)).unwrap();
        let c = reg.register(RegisterSpec::new("10.0.0.1", 3)).unwrap();

        let ids: Vec<String> = reg.list(false).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn test_list_healthy_only() {
        let reg = registry();
        let a = reg.register(RegisterSpec::new("10.0.0.1", 1)).unwrap();
        let b = reg.register(RegisterSpec::new("10.0.0.1", 2)).unwrap();
        reg.update_dynamic(&a, DynamicUpdate::health(HealthState::Healthy));
        reg.update_dynamic(&b, DynamicUpdate::health(HealthState::Unhealthy));

        let healthy = reg.list(true).unwrap();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].id, a);

        let all = reg.list(false).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_list_order_survives_interleaved_removal() {
        let reg = registry();
        let a = reg.register(RegisterSpec::new("10.0.0.1", 1)).unwrap();
        let b = reg.register(RegisterSpec::new("10.0.0.1", 2)).unwrap();
        let c = reg.register(RegisterSpec::new("10.0.0.1", 3)).unwrap();
        reg.deregister(&b);

        let ids: Vec<String> = reg.list(false).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    // ===== Dynamic updates =====

    #[test]
    fn test_update_unknown_id_returns_false() {
        let reg = registry();
        assert!(!reg.update_dynamic("ghost", DynamicUpdate::connections(1)));
    }

    #[test]
    fn test_connections_delta_and_saturation() {
        let reg = registry();
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        reg.update_dynamic(&id, DynamicUpdate::connections(3));
        assert_eq!(reg.get(&id).unwrap().connections, 3);

        reg.update_dynamic(&id, DynamicUpdate::connections(-2));
        assert_eq!(reg.get(&id).unwrap().connections, 1);

        // Over-decrement saturates at zero, never goes negative
        reg.update_dynamic(&id, DynamicUpdate::connections(-5));
        assert_eq!(reg.get(&id).unwrap().connections, 0);
    }

    #[test]
    fn test_latency_ema_seeding_and_smoothing() {
        let reg = DashMapInstanceRegistry::with_alpha(0.2);
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        reg.update_dynamic(&id, DynamicUpdate::latency(1.0));
        assert!((reg.get(&id).unwrap().avg_latency_secs - 1.0).abs() < 1e-9);

        // new = 0.2 * 2.0 + 0.8 * 1.0 = 1.2
        reg.update_dynamic(&id, DynamicUpdate::latency(2.0));
        assert!((reg.get(&id).unwrap().avg_latency_secs - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_mem_absent_until_reported() {
        let reg = registry();
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();
        assert!(reg.get(&id).unwrap().cpu.is_none());
        assert!(reg.get(&id).unwrap().mem.is_none());

        reg.update_dynamic(
            &id,
            DynamicUpdate {
                cpu: Some(0.55),
                mem: Some(0.8),
                ..Default::default()
            },
        );
        let snap = reg.get(&id).unwrap();
        assert_eq!(snap.cpu, Some(0.55));
        assert_eq!(snap.mem, Some(0.8));
    }

    #[test]
    fn test_probe_ok_stamps_timestamp() {
        let reg = registry();
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        reg.update_dynamic(
            &id,
            DynamicUpdate {
                probe_ok: true,
                ..Default::default()
            },
        );
        assert!(reg.get(&id).unwrap().last_probe_ok_ms.is_some());
    }

    #[test]
    fn test_health_transitions() {
        let reg = registry();
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        reg.update_dynamic(&id, DynamicUpdate::health(HealthState::Healthy));
        assert_eq!(reg.get(&id).unwrap().health, HealthState::Healthy);

        reg.update_dynamic(&id, DynamicUpdate::health(HealthState::Unhealthy));
        assert_eq!(reg.get(&id).unwrap().health, HealthState::Unhealthy);
    }

    // ===== Concurrency =====

    #[test]
    fn test_concurrent_registration_unique_host_port() {
        use std::thread;

        let reg = Arc::new(registry());
        let mut handles = vec![];

        // 8 threads race to register the same pair; exactly one wins
        for _ in 0..8 {
            let reg = reg.clone();
            handles.push(thread::spawn(move || {
                reg.register(RegisterSpec::new("10.0.0.9", 9999)).is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_concurrent_connection_updates() {
        use std::thread;

        let reg = Arc::new(registry());
        let id = reg.register(RegisterSpec::new("10.0.0.1", 8080)).unwrap();

        let mut handles = vec![];
        for _ in 0..10 {
            let reg = reg.clone();
            let id = id.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.update_dynamic(&id, DynamicUpdate::connections(1));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(reg.get(&id).unwrap().connections, 1000);
    }
}
