pub mod bridge;
pub mod commands;
pub mod config;
pub mod delegate;
pub mod error;
pub mod native;
pub mod native_ffi;
pub mod packet;

pub use bridge::{Bridge, BridgeCell};
pub use config::BridgeConfig;
pub use delegate::{BridgeDelegate, DelegateSlot};
pub use error::{BridgeError, BridgeResult};
pub use native::{LoopbackNative, NativeBoundary};
pub use native_ffi::DylibNative;
pub use packet::Packet;
