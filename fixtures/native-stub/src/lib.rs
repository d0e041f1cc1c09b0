//! Native side of the fgbridge C ABI, for tests
//!
//! Methods understood by `fg_call_go_method`:
//! - `ping`: calls the host back with `ping` and no payload, returns the host's answer
//! - `echo`: returns a copy of the request payload
//! - `empty`: returns a present, zero-length payload
//! - `negative`: returns a buffer with a negative size
//! - anything else: returns no payload

use std::ffi::{c_int, c_void};
use std::ptr;
use std::sync::Mutex;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgData {
    pub data: *mut c_void,
    pub size: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgRequest {
    pub method: FgData,
    pub data: FgData,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgResponse {
    pub data: FgData,
}

pub type FgMethodHandle = unsafe extern "C" fn(request: FgRequest, response: *mut FgResponse);

extern "C" {
    fn malloc(size: usize) -> *mut c_void;
}

static HANDLE: Mutex<Option<FgMethodHandle>> = Mutex::new(None);

const EMPTY: FgData = FgData {
    data: ptr::null_mut(),
    size: 0,
};

unsafe fn bytes<'a>(data: &FgData) -> Option<&'a [u8]> {
    if data.data.is_null() || data.size < 0 {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts(data.data as *const u8, data.size as usize) })
}

fn copy_out(bytes: &[u8], size: c_int) -> FgData {
    let data = unsafe { malloc(bytes.len().max(1)) };
    if data.is_null() {
        return EMPTY;
    }
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), data as *mut u8, bytes.len()) };
    FgData { data, size }
}

#[no_mangle]
pub unsafe extern "C" fn fg_init_method_handle(handle: FgMethodHandle) {
    if let Ok(mut slot) = HANDLE.lock() {
        *slot = Some(handle);
    }
}

#[no_mangle]
pub unsafe extern "C" fn fg_call_go_method(request: FgRequest) -> FgResponse {
    let method = unsafe { bytes(&request.method) }.unwrap_or_default();
    let data = match method {
        b"ping" => {
            let handle = HANDLE.lock().ok().and_then(|slot| *slot);
            match handle {
                Some(handle) => {
                    let name = b"ping";
                    let callback = FgRequest {
                        method: FgData {
                            data: name.as_ptr() as *mut c_void,
                            size: name.len() as c_int,
                        },
                        data: EMPTY,
                    };
                    let mut answer = FgResponse { data: EMPTY };
                    unsafe { handle(callback, &mut answer) };
                    // Ownership of the host's malloc'd answer passes back to the host.
                    answer.data
                }
                None => EMPTY,
            }
        }
        b"echo" => match unsafe { bytes(&request.data) } {
            Some(payload) => copy_out(payload, payload.len() as c_int),
            None => EMPTY,
        },
        b"empty" => copy_out(&[], 0),
        b"negative" => copy_out(&[0], -1),
        _ => EMPTY,
    };
    FgResponse { data }
}
