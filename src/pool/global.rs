// Process-wide pool - init once before any worker starts, tear down after
// every worker stopped

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::pool::vector_pool::VectorBufferPool;

static GLOBAL_POOL: RwLock<Option<Arc<VectorBufferPool>>> = parking_lot::const_rwlock(None);

/// Create the process-wide pool
pub fn init(count: usize, frames: usize) -> EngineResult<Arc<VectorBufferPool>> {
    let mut slot = GLOBAL_POOL.write();
    if slot.is_some() {
        return Err(EngineError::PoolAlreadyInitialized);
    }

    let pool = Arc::new(VectorBufferPool::reserve_all(count, frames));
    *slot = Some(pool.clone());

    log::info!("Vector buffer pool initialized");
    Ok(pool)
}

/// Handle to the process-wide pool
pub fn get() -> EngineResult<Arc<VectorBufferPool>> {
    GLOBAL_POOL
        .read()
        .clone()
        .ok_or(EngineError::PoolNotInitialized)
}

pub fn is_initialized() -> bool {
    GLOBAL_POOL.read().is_some()
}

/// Drop the process-wide handle
///
/// Handles already given out stay valid until their owners drop them; the
/// slots are freed with the last one.
pub fn teardown() -> EngineResult<()> {
    let pool = GLOBAL_POOL
        .write()
        .take()
        .ok_or(EngineError::PoolNotInitialized)?;

    if Arc::strong_count(&pool) > 1 {
        log::warn!(
            "Vector buffer pool torn down with {} handles still alive",
            Arc::strong_count(&pool) - 1
        );
    } else {
        log::info!("Vector buffer pool torn down");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::slot::VectorKind;

    // Single test: the pool is process-wide and tests run in parallel
    #[test]
    fn test_global_lifecycle() {
        assert!(matches!(get(), Err(EngineError::PoolNotInitialized)));
        assert!(matches!(teardown(), Err(EngineError::PoolNotInitialized)));

        let pool = init(2, 64).unwrap();
        assert!(is_initialized());
        assert!(matches!(init(2, 64), Err(EngineError::PoolAlreadyInitialized)));

        let again = get().unwrap();
        assert!(Arc::ptr_eq(&pool, &again));
        assert_eq!(again.free_count(VectorKind::F32), 2);

        drop(again);
        drop(pool);
        teardown().unwrap();
        assert!(!is_initialized());
    }
}
