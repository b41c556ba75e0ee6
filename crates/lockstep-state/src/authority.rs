//! Ownership arbitration - who may mutate a timeline object
//!
//! Exactly one replica owns an object at a time. Any replica may request
//! ownership; the core assumes the request succeeds but re-checks ownership
//! on every operation instead of caching it.

use std::collections::HashMap;

use lockstep_core::{ObjectId, ReplicaId};
use parking_lot::RwLock;

/// Ownership service consumed by the synchronization core
pub trait OwnershipArbiter: Send + Sync {
    /// Whether `actor` currently owns `object`
    fn is_owner(&self, actor: ReplicaId, object: ObjectId) -> bool;

    /// Ask for ownership. Best effort and synchronous; may be denied by policy.
    fn request_ownership(&self, actor: ReplicaId, object: ObjectId);
}

/// Transfer policy for one object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TransferPolicy {
    /// Any request moves ownership to the requester
    #[default]
    Open,
    /// Requests are denied; the current owner keeps the object
    Locked,
}

#[derive(Clone, Debug, Default)]
struct ObjectAuthority {
    owner: Option<ReplicaId>,
    policy: TransferPolicy,
    transfers: u64,
}

/// In-process arbiter shared by every replica of a session
#[derive(Debug, Default)]
pub struct LocalArbiter {
    objects: RwLock<HashMap<ObjectId, ObjectAuthority>>,
}

impl LocalArbiter {
    pub fn new() -> Self {
        LocalArbiter::default()
    }

    /// Force `owner` onto `object`, bypassing the transfer policy
    pub fn assign(&self, object: ObjectId, owner: ReplicaId) {
        let mut objects = self.objects.write();
        let entry = objects.entry(object).or_default();
        if entry.owner != Some(owner) {
            entry.owner = Some(owner);
            entry.transfers += 1;
        }
    }

    pub fn owner_of(&self, object: ObjectId) -> Option<ReplicaId> {
        self.objects.read().get(&object).and_then(|a| a.owner)
    }

    pub fn set_policy(&self, object: ObjectId, policy: TransferPolicy) {
        self.objects.write().entry(object).or_default().policy = policy;
    }

    /// Drop ownership if `actor` holds it (replica leaving the session)
    pub fn release(&self, actor: ReplicaId, object: ObjectId) {
        let mut objects = self.objects.write();
        if let Some(entry) = objects.get_mut(&object) {
            if entry.owner == Some(actor) {
                entry.owner = None;
                tracing::info!(%object, replica = %actor, "ownership released");
            }
        }
    }

    /// Number of times ownership of `object` changed hands
    pub fn transfer_count(&self, object: ObjectId) -> u64 {
        self.objects.read().get(&object).map_or(0, |a| a.transfers)
    }
}

impl OwnershipArbiter for LocalArbiter {
    fn is_owner(&self, actor: ReplicaId, object: ObjectId) -> bool {
        self.owner_of(object) == Some(actor)
    }

    fn request_ownership(&self, actor: ReplicaId, object: ObjectId) {
        let mut objects = self.objects.write();
        let entry = objects.entry(object).or_default();

        if entry.owner == Some(actor) {
            return;
        }

        // An unowned object is always claimable
        if entry.policy == TransferPolicy::Locked && entry.owner.is_some() {
            tracing::debug!(%object, replica = %actor, "ownership request denied");
            return;
        }

        let previous = entry.owner.replace(actor);
        entry.transfers += 1;
        tracing::info!(%object, replica = %actor, previous = ?previous, "ownership transferred");
    }
}

impl<T: OwnershipArbiter + ?Sized> OwnershipArbiter for std::sync::Arc<T> {
    fn is_owner(&self, actor: ReplicaId, object: ObjectId) -> bool {
        (**self).is_owner(actor, object)
    }

    fn request_ownership(&self, actor: ReplicaId, object: ObjectId) {
        (**self).request_ownership(actor, object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJ: ObjectId = ObjectId(100);

    #[test]
    fn test_exclusive_ownership() {
        let arbiter = LocalArbiter::new();
        let a = ReplicaId::new(1);
        let b = ReplicaId::new(2);

        arbiter.request_ownership(a, OBJ);
        assert!(arbiter.is_owner(a, OBJ));
        assert!(!arbiter.is_owner(b, OBJ));

        arbiter.request_ownership(b, OBJ);
        assert!(arbiter.is_owner(b, OBJ));
        assert!(!arbiter.is_owner(a, OBJ));
        assert_eq!(arbiter.transfer_count(OBJ), 2);
    }

    #[test]
    fn test_repeat_request_is_idempotent() {
        let arbiter = LocalArbiter::new();
        let a = ReplicaId::new(1);
        arbiter.request_ownership(a, OBJ);
        arbiter.request_ownership(a, OBJ);
        assert_eq!(arbiter.transfer_count(OBJ), 1);
    }

    #[test]
    fn test_locked_policy_denies_transfer() {
        let arbiter = LocalArbiter::new();
        let a = ReplicaId::new(1);
        let b = ReplicaId::new(2);

        arbiter.assign(OBJ, a);
        arbiter.set_policy(OBJ, TransferPolicy::Locked);
        arbiter.request_ownership(b, OBJ);

        assert!(arbiter.is_owner(a, OBJ));
        assert!(!arbiter.is_owner(b, OBJ));
    }

    #[test]
    fn test_locked_unowned_object_is_claimable() {
        let arbiter = LocalArbiter::new();
        let a = ReplicaId::new(1);
        arbiter.set_policy(OBJ, TransferPolicy::Locked);
        arbiter.request_ownership(a, OBJ);
        assert!(arbiter.is_owner(a, OBJ));
    }

    #[test]
    fn test_release() {
        let arbiter = LocalArbiter::new();
        let a = ReplicaId::new(1);
        let b = ReplicaId::new(2);
        arbiter.assign(OBJ, a);

        arbiter.release(b, OBJ);
        assert_eq!(arbiter.owner_of(OBJ), Some(a));

        arbiter.release(a, OBJ);
        assert_eq!(arbiter.owner_of(OBJ), None);
    }
}
