//! Host-side handler for callbacks originating in the native library

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::packet::Packet;

/// Handles a method call made by the native library
///
/// Returning `None` answers with an empty response. Any routing by method name
/// is up to the implementation.
pub trait BridgeDelegate: Send + Sync {
    fn method_handle(&self, method: &str, data: Option<&[u8]>) -> Option<Vec<u8>>;
}

impl<F> BridgeDelegate for F
where
    F: Fn(&str, Option<&[u8]>) -> Option<Vec<u8>> + Send + Sync,
{
    fn method_handle(&self, method: &str, data: Option<&[u8]>) -> Option<Vec<u8>> {
        self(method, data)
    }
}

/// Holds at most one delegate and routes inbound packets to it
///
/// The slot only references the delegate: the embedding code keeps the `Arc`
/// alive, and once it is dropped the slot behaves as if it were cleared.
/// Readers may observe the previous delegate while a replacement is in
/// progress, never a partial one.
#[derive(Default)]
pub struct DelegateSlot {
    current: RwLock<Option<Weak<dyn BridgeDelegate>>>,
}

impl DelegateSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered delegate
    pub fn set<D: BridgeDelegate + 'static>(&self, delegate: &Arc<D>) {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn BridgeDelegate> = weak;
        *self.current.write() = Some(weak);
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// The registered delegate, if one is set and still alive
    pub fn get(&self) -> Option<Arc<dyn BridgeDelegate>> {
        self.current.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    /// Answer an inbound packet
    ///
    /// Always yields a response carrying the request's method. Without a
    /// delegate, or when the delegate panics, the response has no payload.
    pub fn dispatch(&self, request: &Packet) -> Packet {
        // Release the lock before running the delegate so a handler may
        // replace itself without deadlocking.
        let delegate = self.get();
        match delegate {
            Some(delegate) => {
                log::debug!("inbound `{}` routed to delegate", request.method());
                let answer = panic::catch_unwind(AssertUnwindSafe(|| {
                    delegate.method_handle(request.method(), request.data())
                }));
                match answer {
                    Ok(data) => request.reply(data),
                    Err(_) => {
                        log::error!("delegate panicked handling `{}`", request.method());
                        Packet::empty(request.method())
                    }
                }
            }
            None => {
                log::warn!("inbound `{}` with no delegate registered", request.method());
                Packet::empty(request.method())
            }
        }
    }
}
