// src/interception/mod.rs
//! Hook interception and request correlation
//!
//! Every hook is wrapped by a decorator implementing the same trait as the
//! original. Wrappers share one [`CaptureContext`]:
//!
//! - **fetch**: call-and-await hook ([`FetchHook`] → [`InterceptedFetch`])
//! - **beacon**: synchronous queue-and-return hook
//! - **lifecycle**: XHR-style request driven by lifecycle events
//! - **websocket**: connection with a bounded frame log
//! - **console**: synchronous logging hook, always called through
//!
//! # Architecture
//!
//! ```text
//! Host code
//!     │
//!     ├─ fetch(request) ──► InterceptedFetch ──► original hook
//!     ├─ xhr.open/send ───► TrackedRequest
//!     ├─ socket events ───► TrackedSocket
//!     └─ console.log() ───► InterceptedConsole ──► original hook
//!                 │
//!                 ▼
//!         CaptureContext ──► ring store ──► EventBus
//! ```

pub mod beacon;
pub mod body;
pub mod console;
pub mod context;
pub mod fetch;
pub mod formatter;
pub mod lifecycle;
pub mod record;
pub mod websocket;

pub use beacon::{BeaconHook, InterceptedBeacon};
pub use body::{Body, CapturedBody, Headers};
pub use console::{ConsoleHook, InterceptedConsole};
pub use context::{CaptureContext, CaptureSettings, PendingCapture};
pub use fetch::{fetch_fn, FetchHook, HookRequest, HookResponse, InterceptedFetch};
pub use formatter::{CapturedValue, ErrorDescriptor, ListRef, MapRef, RawValue, ValueFormatter};
pub use lifecycle::TrackedRequest;
pub use record::{
    CapturedEvent, FailureKind, LogLevel, LogRecord, NetworkRecord, RequestState, SocketRecord,
};
pub use websocket::TrackedSocket;
