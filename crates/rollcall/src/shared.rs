//! Copy-on-write snapshots shared between the control loop and worker threads.

use parking_lot::RwLock;
use std::sync::Arc;

/// A value readers take cheap snapshots of while a writer swaps in new
/// versions. Readers never observe a partially updated value.
#[derive(Debug)]
pub struct Shared<T> {
    current: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(value))),
        }
    }

    /// The current version. Holds no lock after returning.
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    pub fn store(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }
}

impl<T: Clone> Shared<T> {
    /// Clone the current version, apply `f`, and publish the result if `f`
    /// succeeds. On error nothing is published.
    pub fn update<R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, E> {
        let mut guard = self.current.write();
        let mut next = T::clone(&guard);
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }
}
