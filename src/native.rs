//! The two operations the bridge needs from the native side
//!
//! [`NativeBoundary`] is what the bridge is built on. The dynamic-library
//! implementation lives in `native_ffi`; [`LoopbackNative`] keeps the "native"
//! side in-process, which is how tests and demos stand in for a real library.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::delegate::DelegateSlot;
use crate::error::{BridgeError, BridgeResult};
use crate::packet::Packet;

/// Foreign contract consumed by the bridge
pub trait NativeBoundary: Send + Sync {
    /// One-time setup, called exactly once before any call is forwarded
    ///
    /// `inbound` is where the native side routes its callbacks into the host.
    fn init(&self, inbound: Arc<DelegateSlot>) -> BridgeResult<()>;

    /// Forward one request and block until its single response arrives
    fn call_method(&self, request: &Packet) -> BridgeResult<Packet>;
}

type CallHandler = dyn Fn(&Packet, &Arc<DelegateSlot>) -> Result<Packet, String> + Send + Sync;
type InitHook = dyn Fn() -> Result<(), String> + Send + Sync;

/// An in-process native side driven by a Rust closure
///
/// The closure receives each request together with the inbound router, so it
/// can call back into the host (from the calling thread or any other) before
/// producing its response.
pub struct LoopbackNative {
    handler: Box<CallHandler>,
    init_hook: Option<Box<InitHook>>,
    inbound: OnceCell<Arc<DelegateSlot>>,
}

impl LoopbackNative {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Packet, &Arc<DelegateSlot>) -> Result<Packet, String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            init_hook: None,
            inbound: OnceCell::new(),
        }
    }

    /// Answers every request with the request itself
    pub fn echo() -> Self {
        Self::new(|request, _| Ok(request.clone()))
    }

    /// Run `hook` during `init`; an `Err` fails the initialization
    pub fn with_init<H>(mut self, hook: H) -> Self
    where
        H: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.init_hook = Some(Box::new(hook));
        self
    }
}

impl NativeBoundary for LoopbackNative {
    fn init(&self, inbound: Arc<DelegateSlot>) -> BridgeResult<()> {
        if let Some(hook) = &self.init_hook {
            hook().map_err(BridgeError::Init)?;
        }
        self.inbound
            .set(inbound)
            .map_err(|_| BridgeError::Init("loopback already initialized".to_string()))
    }

    fn call_method(&self, request: &Packet) -> BridgeResult<Packet> {
        let inbound = self
            .inbound
            .get()
            .ok_or_else(|| BridgeError::call(request.method(), "loopback not initialized"))?;
        (self.handler)(request, inbound).map_err(|reason| BridgeError::call(request.method(), reason))
    }
}
