//! Memoization of derived data on immutable transforms.

use crate::transform::MathTransform;
use crate::Error;
use crate::TransformRef;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;

enum Link {
    Vacant,
    /// An inverse computed on request, kept while someone holds it
    Cached(Weak<dyn MathTransform>),
    /// This transform was itself created as the inverse of `origin`
    Origin(TransformRef),
}

/// The inverse of a transform, computed once and then shared.
///
/// An inverse created by [`InverseCell::get_or_init`] holds a strong reference
/// back to its origin (through [`InverseCell::with_origin`]), while the origin
/// only keeps a weak reference to the inverse. Inverting twice thus returns
/// the original object, without creating a reference cycle.
pub struct InverseCell {
    link: Mutex<Link>,
}

impl Default for InverseCell {
    fn default() -> Self {
        InverseCell::new()
    }
}

impl fmt::Debug for InverseCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock() {
            Link::Vacant => "vacant",
            Link::Cached(_) => "cached",
            Link::Origin(_) => "origin",
        };
        write!(f, "InverseCell({state})")
    }
}

impl InverseCell {
    pub fn new() -> InverseCell {
        InverseCell {
            link: Mutex::new(Link::Vacant),
        }
    }

    /// The cell of a transform created as the inverse of `origin`
    pub fn with_origin(origin: TransformRef) -> InverseCell {
        InverseCell {
            link: Mutex::new(Link::Origin(origin)),
        }
    }

    // The cached data is idempotent, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> Option<TransformRef> {
        match &*self.lock() {
            Link::Vacant => None,
            Link::Cached(weak) => weak.upgrade(),
            Link::Origin(origin) => Some(origin.clone()),
        }
    }

    /// The cached inverse, or the result of `make`, which is then cached.
    /// `make` runs outside the lock; concurrent callers may both compute it.
    pub fn get_or_init<F>(&self, make: F) -> Result<TransformRef, Error>
    where
        F: FnOnce() -> Result<TransformRef, Error>,
    {
        if let Some(inverse) = self.get() {
            return Ok(inverse);
        }
        let inverse = make()?;
        let mut link = self.lock();
        match &*link {
            Link::Origin(origin) => return Ok(origin.clone()),
            Link::Cached(weak) => {
                if let Some(winner) = weak.upgrade() {
                    return Ok(winner);
                }
            }
            Link::Vacant => {}
        }
        *link = Link::Cached(std::sync::Arc::downgrade(&inverse));
        Ok(inverse)
    }
}

/// A memoized hash code. Zero means "not yet computed", so a computed zero is
/// stored as a nonzero sentinel.
#[derive(Debug, Default)]
pub struct HashCache(AtomicU64);

const ZERO_HASH: u64 = 0x9E37_79B9_7F4A_7C15;

impl HashCache {
    pub fn new() -> HashCache {
        HashCache(AtomicU64::new(0))
    }

    pub fn get_or_compute<F: FnOnce() -> u64>(&self, compute: F) -> u64 {
        let cached = self.0.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let mut code = compute();
        if code == 0 {
            code = ZERO_HASH;
        }
        self.0.store(code, Ordering::Relaxed);
        code
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::LinearTransform1D;
    use std::sync::Arc;

    #[test]
    fn hash_cache() {
        let cache = HashCache::new();
        assert_eq!(cache.get_or_compute(|| 42), 42);
        assert_eq!(cache.get_or_compute(|| 17), 42);
        let zero = HashCache::new();
        assert_eq!(zero.get_or_compute(|| 0), ZERO_HASH);
        assert_eq!(zero.get_or_compute(|| 1), ZERO_HASH);
    }

    #[test]
    fn inverse_cell() -> Result<(), Error> {
        let cell = InverseCell::new();
        assert!(cell.get().is_none());
        let a = cell.get_or_init(|| Ok(LinearTransform1D::create(2., 1.)))?;
        let b = cell.get_or_init(|| Ok(LinearTransform1D::create(3., 1.)))?;
        assert!(Arc::ptr_eq(&a, &b));

        // Only a weak reference is kept
        drop(a);
        drop(b);
        assert!(cell.get().is_none());

        let origin = LinearTransform1D::create(5., 0.);
        let back = InverseCell::with_origin(origin.clone());
        assert!(Arc::ptr_eq(&back.get_or_init(|| Err(Error::Unknown))?, &origin));
        Ok(())
    }
}
