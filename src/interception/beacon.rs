// src/interception/beacon.rs
//! Fire-and-forget beacon hook
//!
//! A beacon only reports whether the payload was queued. Queued beacons are
//! recorded as resolved with status 0; rejected ones as failed.

use crate::interception::body::{Body, Headers};
use crate::interception::context::{CaptureContext, ResponseParts};
use crate::interception::record::{FailureInfo, FailureKind, NetworkKind};

/// Synchronous "queue this payload" entry point
pub trait BeaconHook: Send + Sync {
    fn send_beacon(&self, url: &str, data: &Body) -> bool;
}

impl<F> BeaconHook for F
where
    F: Fn(&str, &Body) -> bool + Send + Sync,
{
    fn send_beacon(&self, url: &str, data: &Body) -> bool {
        self(url, data)
    }
}

/// Recording decorator around a [`BeaconHook`]
pub struct InterceptedBeacon<H> {
    inner: H,
    ctx: CaptureContext,
}

impl<H: BeaconHook> InterceptedBeacon<H> {
    pub fn new(inner: H, ctx: CaptureContext) -> Self {
        Self { inner, ctx }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: BeaconHook> BeaconHook for InterceptedBeacon<H> {
    fn send_beacon(&self, url: &str, data: &Body) -> bool {
        let pending = self
            .ctx
            .begin(NetworkKind::Beacon, "POST", url, Headers::new(), data);
        let queued = self.inner.send_beacon(url, data);

        if let Some(pending) = pending {
            if queued {
                self.ctx.resolve(
                    &pending,
                    ResponseParts {
                        status: 0,
                        status_text: "Queued",
                        headers: &Headers::new(),
                        body: &Body::Empty,
                        cache_status: Some(false),
                    },
                );
            } else {
                self.ctx.fail(
                    &pending,
                    FailureInfo::new(FailureKind::Error, "Beacon was not queued"),
                );
            }
        }

        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::context::tests::{harness, topics_seen};
    use crate::interception::record::RequestState;

    #[test]
    fn test_queued_and_rejected_beacons() {
        let h = harness(10);
        let hook = |_url: &str, data: &Body| !matches!(data, Body::Binary(_));
        let beacon = InterceptedBeacon::new(hook, h.ctx.clone());

        assert!(beacon.send_beacon("/analytics", &Body::from("{\"e\":1}")));
        assert!(!beacon.send_beacon("/analytics", &Body::Binary(vec![0u8; 4].into())));

        assert_eq!(
            topics_seen(&h),
            vec!["network:request", "network:response", "network:request", "network:error"]
        );

        let records = h.ctx.network_store().get_all();
        let states: Vec<_> = records
            .iter()
            .map(|r| r.as_network().unwrap().state)
            .collect();
        assert_eq!(states, vec![RequestState::Resolved, RequestState::Failed]);
        assert_eq!(records[0].kind(), "beacon");
        assert_eq!(records[0].as_network().unwrap().request.method, "POST");
    }
}
