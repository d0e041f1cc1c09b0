//! Command handlers behind the `fgbridge` binary
//!
//! These wrap the Bridge for one-shot use from a shell: open it, register a
//! delegate that echoes native callbacks, make a call, report the result.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::delegate::BridgeDelegate;
use crate::error::BridgeResult;
use crate::native::LoopbackNative;

/// Response of a `call`, as printed by the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReport {
    pub method: String,
    pub data: Option<Vec<u8>>,
    /// The payload as text, when it is valid UTF-8
    pub text: Option<String>,
}

impl CallReport {
    fn new(method: &str, data: Option<Vec<u8>>) -> Self {
        let text = data
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(str::to_string);
        Self {
            method: method.to_string(),
            data,
            text,
        }
    }
}

/// Open the process bridge
///
/// `loopback` replaces the native library with an in-process stand-in that
/// forwards every call back to the host delegate.
pub fn open_bridge(library: Option<PathBuf>, loopback: bool) -> BridgeResult<&'static Bridge> {
    if loopback {
        log::debug!("open_bridge: loopback");
        return Bridge::install(LoopbackNative::new(|request, inbound| {
            Ok(inbound.dispatch(request))
        }));
    }

    let mut config = BridgeConfig::from_env();
    if let Some(path) = library {
        config = config.with_library_path(path);
    }
    log::debug!("open_bridge: library={}", config.library_path.display());
    Bridge::get_instance_with(&config)
}

/// Delegate that logs each native callback and answers with its payload
pub struct EchoDelegate;

impl BridgeDelegate for EchoDelegate {
    fn method_handle(&self, method: &str, data: Option<&[u8]>) -> Option<Vec<u8>> {
        log::info!(
            "native callback: method={}, bytes={}",
            method,
            data.map_or(0, <[u8]>::len)
        );
        data.map(<[u8]>::to_vec)
    }
}

/// Invoke a native method
pub fn call(bridge: &Bridge, method: &str, data: Option<Vec<u8>>) -> BridgeResult<CallReport> {
    log::debug!("call: method={}", method);
    let response = bridge.call_method(method, data)?;
    Ok(CallReport::new(method, response))
}

/// Round-trip check: send `ping` with no payload
pub fn ping(bridge: &Bridge) -> BridgeResult<CallReport> {
    call(bridge, "ping", None)
}

/// Decode a hex string such as `0a1B` into bytes
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in `{input}`"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16);
            let lo = pair[1].to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
                _ => Err(format!("invalid hex byte `{}{}`", pair[0], pair[1])),
            }
        })
        .collect()
}
