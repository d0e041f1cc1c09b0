//! C ABI shared with the native library
//!
//! The native side exports:
//! - `fg_init_method_handle(FgMethodHandle)` - one-time setup, receives the host callback
//! - `fg_call_go_method(FgRequest) -> FgResponse` - one call, one response
//!
//! The host exports `fg_bridge_method_handle`, the callback the native side
//! invokes to reach host delegates.
//!
//! Buffer ownership: request buffers are borrowed by the receiving side for the
//! duration of the call only. Response data is allocated with the C allocator
//! and released with `free` by whoever receives it. A null data pointer means
//! "no payload".

use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use libloading::Library;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::delegate::DelegateSlot;
use crate::error::{BridgeError, BridgeResult};
use crate::native::NativeBoundary;
use crate::packet::Packet;

// =============================================================================
// Types
// =============================================================================

/// Length-prefixed byte buffer
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FgData {
    pub data: *mut c_void,
    pub size: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FgRequest {
    pub method: FgData,
    pub data: FgData,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FgResponse {
    pub data: FgData,
}

/// Callback signature handed to `fg_init_method_handle`
pub type FgMethodHandle = unsafe extern "C" fn(request: FgRequest, response: *mut FgResponse);

type InitMethodHandleFn = unsafe extern "C" fn(handle: FgMethodHandle);
type CallMethodFn = unsafe extern "C" fn(request: FgRequest) -> FgResponse;

pub const INIT_SYMBOL: &[u8] = b"fg_init_method_handle";
pub const CALL_SYMBOL: &[u8] = b"fg_call_go_method";

impl FgData {
    pub const fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            size: 0,
        }
    }

    /// Point at `bytes` without copying. The native side must not write through it
    pub fn borrowed(bytes: Option<&[u8]>) -> Result<Self, String> {
        let Some(bytes) = bytes else {
            return Ok(Self::empty());
        };
        let size = c_int::try_from(bytes.len())
            .map_err(|_| format!("payload of {} bytes exceeds the C ABI limit", bytes.len()))?;
        Ok(Self {
            data: bytes.as_ptr() as *mut c_void,
            size,
        })
    }

    /// Copy `bytes` into memory from the C allocator
    ///
    /// Payloads too large for the ABI, or an allocation failure, come back as
    /// "no payload" so the callback path stays infallible.
    pub fn allocate(bytes: Option<&[u8]>) -> Self {
        let Some(bytes) = bytes else {
            return Self::empty();
        };
        let Ok(size) = c_int::try_from(bytes.len()) else {
            log::error!("callback payload of {} bytes dropped: too large", bytes.len());
            return Self::empty();
        };
        // Never request zero bytes so that an empty payload stays non-null.
        let data = unsafe { libc::malloc(bytes.len().max(1)) };
        if data.is_null() {
            log::error!("callback payload of {} bytes dropped: allocation failed", bytes.len());
            return Self::empty();
        }
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), data as *mut u8, bytes.len()) };
        Self { data, size }
    }

    /// View the buffer as a slice
    ///
    /// # Safety
    ///
    /// `data` must be null or valid for reads of `size` bytes for `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> Result<Option<&'a [u8]>, String> {
        if self.data.is_null() {
            return Ok(None);
        }
        let len = usize::try_from(self.size).map_err(|_| format!("negative buffer size {}", self.size))?;
        if len == 0 {
            return Ok(Some(&[]));
        }
        Ok(Some(unsafe { std::slice::from_raw_parts(self.data as *const u8, len) }))
    }

    /// Release a buffer obtained from the C allocator
    ///
    /// # Safety
    ///
    /// `data` must be null or a live allocation from `malloc`.
    pub unsafe fn free(self) {
        if !self.data.is_null() {
            unsafe { libc::free(self.data) };
        }
    }
}

// =============================================================================
// Inbound callback
// =============================================================================

/// Router for callbacks arriving through `fg_bridge_method_handle`
static INBOUND: Lazy<RwLock<Option<Arc<DelegateSlot>>>> = Lazy::new(|| RwLock::new(None));

/// Route future native callbacks to `slot`
pub fn register_inbound(slot: Arc<DelegateSlot>) {
    *INBOUND.write() = Some(slot);
}

/// Fixed entry point the native library calls to reach host delegates
///
/// Never fails: with no router or no delegate, an empty response is written.
/// The response buffer is allocated with `malloc`; the caller frees it.
///
/// # Safety
///
/// `request` buffers must be readable for their stated sizes during the call,
/// and `response` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fg_bridge_method_handle(request: FgRequest, response: *mut FgResponse) {
    if response.is_null() {
        log::error!("fg_bridge_method_handle: null response pointer");
        return;
    }

    let method = match unsafe { request.method.as_bytes() } {
        Ok(bytes) => String::from_utf8_lossy(bytes.unwrap_or_default()).into_owned(),
        Err(reason) => {
            log::warn!("fg_bridge_method_handle: bad method buffer: {reason}");
            String::new()
        }
    };
    let data = match unsafe { request.data.as_bytes() } {
        Ok(bytes) => bytes.map(<[u8]>::to_vec),
        Err(reason) => {
            log::warn!("fg_bridge_method_handle: `{method}` has a bad data buffer: {reason}");
            None
        }
    };

    let request = Packet::new(method, data);
    let router = INBOUND.read().clone();
    let reply = match router {
        Some(slot) => slot.dispatch(&request),
        None => {
            log::warn!("fg_bridge_method_handle: `{}` arrived before init", request.method());
            Packet::empty(request.method())
        }
    };

    unsafe {
        response.write(FgResponse {
            data: FgData::allocate(reply.data()),
        })
    };
}

// =============================================================================
// Dynamic library boundary
// =============================================================================

/// Native boundary backed by a shared library loaded at runtime
pub struct DylibNative {
    path: PathBuf,
    init_fn: InitMethodHandleFn,
    call_fn: CallMethodFn,
    // Keeps the resolved symbols valid.
    _library: Library,
}

impl DylibNative {
    /// Load the library at `path` and resolve both native entry points
    pub fn open(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("loading native library {}", path.display());

        let library = unsafe { Library::new(&path) }.map_err(|e| {
            BridgeError::Load {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        let init_fn = unsafe { library.get::<InitMethodHandleFn>(INIT_SYMBOL) }
            .map(|symbol| *symbol)
            .map_err(|e| BridgeError::Init(format!("missing fg_init_method_handle: {e}")))?;
        let call_fn = unsafe { library.get::<CallMethodFn>(CALL_SYMBOL) }
            .map(|symbol| *symbol)
            .map_err(|e| BridgeError::Init(format!("missing fg_call_go_method: {e}")))?;

        Ok(Self {
            path,
            init_fn,
            call_fn,
            _library: library,
        })
    }
}

impl NativeBoundary for DylibNative {
    fn init(&self, inbound: Arc<DelegateSlot>) -> BridgeResult<()> {
        register_inbound(inbound);
        unsafe { (self.init_fn)(fg_bridge_method_handle) };
        log::info!("native library {} initialized", self.path.display());
        Ok(())
    }

    fn call_method(&self, request: &Packet) -> BridgeResult<Packet> {
        let method = FgData::borrowed(Some(request.method().as_bytes()))
            .map_err(|reason| BridgeError::call(request.method(), reason))?;
        let data = FgData::borrowed(request.data())
            .map_err(|reason| BridgeError::call(request.method(), reason))?;

        let response = unsafe { (self.call_fn)(FgRequest { method, data }) };

        let payload = unsafe { response.data.as_bytes() }.map(|bytes| bytes.map(<[u8]>::to_vec));
        unsafe { response.data.free() };
        let payload = payload.map_err(|reason| BridgeError::call(request.method(), reason))?;

        Ok(request.reply(payload))
    }
}
