// Archivo: lock.rs
// Propósito: un lock exclusivo por rundown. Toda operación de ingesta lo
// adquiere antes de cargar las caches y lo mantiene hasta la escritura final.
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Tabla de locks por `external_id` de rundown.
///
/// Rundowns distintos no comparten estado y avanzan en paralelo. Para un
/// mismo rundown las operaciones quedan totalmente ordenadas (exclusión
/// mutua; no se garantiza FIFO). Las entradas sin uso se eliminan al soltar
/// el último guard.
#[derive(Debug, Clone, Default)]
pub struct RundownLockManager {
    locks: Arc<LockTable>,
}

/// Guard del lock de un rundown. Se libera al salir de ámbito por cualquier
/// camino, incluido un panic.
#[derive(Debug)]
pub struct RundownLockGuard {
    rundown_external_id: String,
    locks: Arc<LockTable>,
    mutex: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RundownLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Espera hasta obtener el lock exclusivo del rundown.
    pub async fn acquire(&self, rundown_external_id: &str) -> RundownLockGuard {
        let mutex = self.locks
                        .entry(rundown_external_id.to_string())
                        .or_insert_with(|| Arc::new(Mutex::new(())))
                        .clone();
        let guard = mutex.clone().lock_owned().await;
        trace!(rundown = %rundown_external_id, "lock adquirido");
        RundownLockGuard { rundown_external_id: rundown_external_id.to_string(),
                           locks: self.locks.clone(),
                           mutex,
                           guard: Some(guard) }
    }

    /// Número de rundowns con un lock tomado o pedido.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn is_locked(&self, rundown_external_id: &str) -> bool {
        self.locks.get(rundown_external_id).map(|m| m.try_lock().is_err()).unwrap_or(false)
    }
}

impl RundownLockGuard {
    pub fn rundown_external_id(&self) -> &str {
        &self.rundown_external_id
    }
}

impl Drop for RundownLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Quedan la tabla y este guard: nadie más espera el lock.
        self.locks.remove_if(&self.rundown_external_id, |_, m| Arc::ptr_eq(m, &self.mutex) && Arc::strong_count(m) == 2);
        trace!(rundown = %self.rundown_external_id, "lock liberado");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_dropped_with_the_last_guard() {
        let locks = RundownLockManager::new();
        {
            let _guard = locks.acquire("rd1").await;
            assert!(locks.is_locked("rd1"));
            assert_eq!(locks.active_locks(), 1);
        }
        assert_eq!(locks.active_locks(), 0);
        assert!(!locks.is_locked("rd1"));
    }

    #[tokio::test]
    async fn same_rundown_waits_for_release() {
        let locks = RundownLockManager::new();
        let guard = locks.acquire("rd1").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("rd1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.expect("waiter");
        assert_eq!(locks.active_locks(), 0);
    }

    #[tokio::test]
    async fn different_rundowns_do_not_block() {
        let locks = RundownLockManager::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn guard_is_released_on_panic() {
        let locks = RundownLockManager::new();
        let other = locks.clone();
        let result = tokio::spawn(async move {
                         let _guard = other.acquire("rd1").await;
                         panic!("fallo dentro del lock");
                     }).await;
        assert!(result.is_err());
        let reacquired = tokio::time::timeout(Duration::from_millis(100), locks.acquire("rd1")).await;
        assert!(reacquired.is_ok());
    }
}
