use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::TrackerError;

static GLOBAL: OnceLock<Arc<InstanceRegistry>> = OnceLock::new();

/// Enforces that at most one tracker is live at a time.
///
/// Trackers claim the registry during construction and release it when the
/// returned [`InstanceGuard`] drops, which also covers constructors that fail
/// after claiming.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    live: AtomicBool,
}

impl InstanceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry trackers use unless configured otherwise
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(InstanceRegistry::new).clone()
    }

    pub fn claim(self: &Arc<Self>) -> Result<InstanceGuard, TrackerError> {
        self.live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrackerError::AlreadyExists)?;
        Ok(InstanceGuard {
            registry: self.clone(),
        })
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Proof of a claimed [`InstanceRegistry`]; releases the claim on drop
#[derive(Debug)]
pub struct InstanceGuard {
    registry: Arc<InstanceRegistry>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.registry.live.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_claim() {
        let registry = InstanceRegistry::new();
        let guard = registry.claim().unwrap();
        assert!(registry.is_live());
        assert!(matches!(registry.claim(), Err(TrackerError::AlreadyExists)));

        drop(guard);
        assert!(!registry.is_live());
        assert!(registry.claim().is_ok());
    }

    #[test]
    fn test_registries_are_independent() {
        let a = InstanceRegistry::new();
        let b = InstanceRegistry::new();
        let _ga = a.claim().unwrap();
        assert!(b.claim().is_ok());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&InstanceRegistry::global(), &InstanceRegistry::global()));
    }
}
