//! Process-wide bridge between host code and the native library
//!
//! This module provides:
//! - The lazily built singleton, initialized exactly once
//! - Outbound calls (host -> native), blocking or on the Tokio blocking pool
//! - The inbound callback path (native -> host) routed to the current delegate

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::BridgeConfig;
use crate::delegate::{BridgeDelegate, DelegateSlot};
use crate::error::{BridgeError, BridgeResult};
use crate::native::NativeBoundary;
use crate::native_ffi::DylibNative;
use crate::packet::Packet;

// =============================================================================
// Singleton holder
// =============================================================================

/// The process-wide instance used by [`Bridge::get_instance`]
static INSTANCE: BridgeCell = BridgeCell::new();

/// Initialize-once holder for a [`Bridge`]
///
/// Reads of an initialized cell take no lock. The first caller to find it
/// empty takes the construction lock, checks again, and builds the bridge;
/// concurrent callers wait and then observe the same fully built instance.
/// A failed construction publishes nothing, so a later call may retry.
pub struct BridgeCell {
    slot: OnceCell<Bridge>,
}

impl BridgeCell {
    pub const fn new() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }

    /// The bridge, if one has been published
    pub fn get(&self) -> Option<&Bridge> {
        self.slot.get()
    }

    /// Return the bridge, building it over the boundary from `open` if needed
    ///
    /// `open` runs at most once per successful construction and never after
    /// an instance is published.
    pub fn get_or_try_init<F>(&self, open: F) -> BridgeResult<&Bridge>
    where
        F: FnOnce() -> BridgeResult<Box<dyn NativeBoundary>>,
    {
        self.slot.get_or_try_init(|| Bridge::connect(open()?))
    }
}

impl Default for BridgeCell {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Bridge
// =============================================================================

/// Mediates calls between host code and the native library
pub struct Bridge {
    /// Native entry points, initialized before the bridge is published
    native: Box<dyn NativeBoundary>,
    /// Current delegate for inbound callbacks, shared with the native side
    inbound: Arc<DelegateSlot>,
}

impl Bridge {
    /// Run the one-time native setup and build a bridge around it
    fn connect(native: Box<dyn NativeBoundary>) -> BridgeResult<Self> {
        let inbound = Arc::new(DelegateSlot::new());
        if let Err(err) = native.init(Arc::clone(&inbound)) {
            log::error!("bridge construction failed: {err}");
            return Err(err);
        }
        log::info!("bridge initialized");
        Ok(Self { native, inbound })
    }

    /// The process-wide bridge, loading the library named by the environment
    /// on first use (see [`BridgeConfig::from_env`])
    pub fn get_instance() -> BridgeResult<&'static Bridge> {
        Self::get_instance_with(&BridgeConfig::from_env())
    }

    /// Like [`Bridge::get_instance`] with an explicit configuration
    ///
    /// The configuration only matters for the call that builds the instance.
    pub fn get_instance_with(config: &BridgeConfig) -> BridgeResult<&'static Bridge> {
        INSTANCE.get_or_try_init(|| {
            let native = DylibNative::open(&config.library_path)?;
            Ok(Box::new(native) as Box<dyn NativeBoundary>)
        })
    }

    /// Build the process-wide bridge over a caller-supplied boundary
    ///
    /// If an instance already exists, `native` is dropped unused and the
    /// existing instance is returned.
    pub fn install<N: NativeBoundary + 'static>(native: N) -> BridgeResult<&'static Bridge> {
        INSTANCE.get_or_try_init(|| Ok(Box::new(native) as Box<dyn NativeBoundary>))
    }

    /// The process-wide bridge if it has been built
    pub fn try_instance() -> Option<&'static Bridge> {
        INSTANCE.get()
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Invoke `method` in the native library and return its response payload
    ///
    /// Blocks until the native side answers. Native faults are returned as
    /// [`BridgeError::Call`] and leave the bridge usable.
    pub fn call_method(&self, method: &str, data: Option<Vec<u8>>) -> BridgeResult<Option<Vec<u8>>> {
        self.call_packet(Packet::new(method, data)).map(Packet::into_data)
    }

    /// Forward a whole packet and return the whole response packet
    pub fn call_packet(&self, request: Packet) -> BridgeResult<Packet> {
        log::debug!(
            "call_method: method={}, bytes={}",
            request.method(),
            request.data().map_or(0, <[u8]>::len)
        );
        let response = self.native.call_method(&request);
        if let Err(err) = &response {
            log::debug!("call_method: {err}");
        }
        response
    }

    /// [`Bridge::call_method`] on the Tokio blocking pool
    ///
    /// Must be awaited from within a Tokio runtime.
    pub async fn call_method_async(
        &'static self,
        method: String,
        data: Option<Vec<u8>>,
    ) -> BridgeResult<Option<Vec<u8>>> {
        let name = method.clone();
        tokio::task::spawn_blocking(move || self.call_method(&method, data))
            .await
            .map_err(|e| BridgeError::call(&name, format!("blocking task failed: {e}")))?
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Register the handler for native callbacks, replacing any previous one
    ///
    /// The bridge keeps only a weak reference; dropping the last `Arc`
    /// unregisters the delegate.
    pub fn set_delegate<D: BridgeDelegate + 'static>(&self, delegate: &Arc<D>) {
        self.inbound.set(delegate);
    }

    pub fn clear_delegate(&self) {
        self.inbound.clear();
    }

    pub fn delegate(&self) -> Option<Arc<dyn BridgeDelegate>> {
        self.inbound.get()
    }

    /// Entry point for a callback from the native library
    ///
    /// Answers with the request's method and the delegate's payload, or with
    /// no payload when no delegate is registered. Safe to call from any thread.
    pub fn method_handle(&self, request: &Packet) -> Packet {
        self.inbound.dispatch(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::LoopbackNative;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn loopback(native: LoopbackNative) -> impl FnOnce() -> BridgeResult<Box<dyn NativeBoundary>> {
        move || Ok(Box::new(native) as Box<dyn NativeBoundary>)
    }

    #[test]
    fn test_concurrent_first_access_builds_once() {
        static CELL: BridgeCell = BridgeCell::new();
        static INITS: AtomicUsize = AtomicUsize::new(0);
        const THREADS: usize = 16;

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let bridge = CELL
                        .get_or_try_init(loopback(LoopbackNative::echo().with_init(|| {
                            INITS.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })))
                        .unwrap();
                    bridge as *const Bridge as usize
                })
            })
            .collect();

        let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addresses.iter().all(|&a| a == addresses[0]));
        assert_eq!(INITS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_init_publishes_nothing_and_retries() {
        static CELL: BridgeCell = BridgeCell::new();

        let err = CELL
            .get_or_try_init(loopback(
                LoopbackNative::echo().with_init(|| Err("setup fault".to_string())),
            ))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Init(_)));
        assert!(CELL.get().is_none());

        let bridge = CELL.get_or_try_init(loopback(LoopbackNative::echo())).unwrap();
        assert_eq!(bridge.call_method("after", Some(vec![4])).unwrap(), Some(vec![4]));
    }

    #[test]
    fn test_open_not_called_once_published() {
        static CELL: BridgeCell = BridgeCell::new();
        CELL.get_or_try_init(loopback(LoopbackNative::echo())).unwrap();

        let second = CELL.get_or_try_init(|| panic!("constructed twice"));
        assert!(second.is_ok());
    }

    #[test]
    fn test_echo_preserves_method() {
        static CELL: BridgeCell = BridgeCell::new();
        let bridge = CELL.get_or_try_init(loopback(LoopbackNative::echo())).unwrap();

        for (method, data) in [("a", None), ("sum", Some(vec![1, 2])), ("empty", Some(vec![]))] {
            let response = bridge.call_packet(Packet::new(method, data.clone())).unwrap();
            assert_eq!(response.method(), method);
            assert_eq!(response.into_data(), data);
        }
    }

    #[test]
    fn test_call_fault_leaves_bridge_usable() {
        static CELL: BridgeCell = BridgeCell::new();
        let native = LoopbackNative::new(|request, _| {
            if request.method() == "boom" {
                Err("native panic".to_string())
            } else {
                Ok(request.clone())
            }
        });
        let bridge = CELL.get_or_try_init(loopback(native)).unwrap();

        let err = bridge.call_method("boom", None).unwrap_err();
        assert!(matches!(err, BridgeError::Call { ref method, .. } if method == "boom"));
        assert_eq!(bridge.call_method("fine", Some(vec![1])).unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_method_handle_without_delegate() {
        static CELL: BridgeCell = BridgeCell::new();
        let bridge = CELL.get_or_try_init(loopback(LoopbackNative::echo())).unwrap();

        assert!(bridge.delegate().is_none());
        let response = bridge.method_handle(&Packet::new("any", Some(vec![1])));
        assert_eq!(response, Packet::empty("any"));
    }

    #[test]
    fn test_delegate_registration() {
        static CELL: BridgeCell = BridgeCell::new();
        let bridge = CELL.get_or_try_init(loopback(LoopbackNative::echo())).unwrap();

        let a = Arc::new(|_: &str, _: Option<&[u8]>| -> Option<Vec<u8>> { Some(b"a".to_vec()) });
        let b = Arc::new(|_: &str, _: Option<&[u8]>| -> Option<Vec<u8>> { Some(b"b".to_vec()) });

        bridge.set_delegate(&a);
        assert_eq!(bridge.method_handle(&Packet::empty("m")).into_data(), Some(b"a".to_vec()));

        bridge.set_delegate(&b);
        assert_eq!(bridge.method_handle(&Packet::empty("m")).into_data(), Some(b"b".to_vec()));

        bridge.clear_delegate();
        assert_eq!(bridge.method_handle(&Packet::empty("m")).into_data(), None);
    }

    #[tokio::test]
    async fn test_call_method_async() {
        static CELL: BridgeCell = BridgeCell::new();
        let bridge: &'static Bridge = CELL.get_or_try_init(loopback(LoopbackNative::echo())).unwrap();

        let result = bridge
            .call_method_async("async".to_string(), Some(vec![9, 9]))
            .await
            .unwrap();
        assert_eq!(result, Some(vec![9, 9]));
    }
}
