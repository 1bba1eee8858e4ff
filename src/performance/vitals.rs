// src/performance/vitals.rs
//! Web-vitals style one-shot metrics
//!
//! | Metric | Good ≤ | Poor > | Update rule |
//! |--------|--------|--------|-------------|
//! | FCP    | 1800ms | 3000ms | first value |
//! | LCP    | 2500ms | 4000ms | latest candidate |
//! | FID    | 100ms  | 300ms  | first value |
//! | CLS    | 0.1    | 0.25   | accumulated |
//! | TTFB   | 800ms  | 1800ms | first value |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebVital {
    /// First contentful paint
    Fcp,
    /// Largest contentful paint
    Lcp,
    /// First input delay
    Fid,
    /// Cumulative layout shift
    Cls,
    /// Time to first byte
    Ttfb,
}

impl WebVital {
    pub fn name(self) -> &'static str {
        match self {
            WebVital::Fcp => "FCP",
            WebVital::Lcp => "LCP",
            WebVital::Fid => "FID",
            WebVital::Cls => "CLS",
            WebVital::Ttfb => "TTFB",
        }
    }

    /// `(good, poor)` boundaries
    pub fn thresholds(self) -> (f64, f64) {
        match self {
            WebVital::Fcp => (1_800.0, 3_000.0),
            WebVital::Lcp => (2_500.0, 4_000.0),
            WebVital::Fid => (100.0, 300.0),
            WebVital::Cls => (0.1, 0.25),
            WebVital::Ttfb => (800.0, 1_800.0),
        }
    }

    pub fn rate(self, value: f64) -> Rating {
        let (good, poor) = self.thresholds();
        if value <= good {
            Rating::Good
        } else if value <= poor {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalValue {
    pub value: f64,
    pub rating: Rating,
    pub recorded_at: i64,
}

/// Latest value of each metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebVitals {
    pub fcp: Option<VitalValue>,
    pub lcp: Option<VitalValue>,
    pub fid: Option<VitalValue>,
    pub cls: Option<VitalValue>,
    pub ttfb: Option<VitalValue>,
}

impl WebVitals {
    pub fn get(&self, vital: WebVital) -> Option<VitalValue> {
        match vital {
            WebVital::Fcp => self.fcp,
            WebVital::Lcp => self.lcp,
            WebVital::Fid => self.fid,
            WebVital::Cls => self.cls,
            WebVital::Ttfb => self.ttfb,
        }
    }

    /// Apply a measurement; returns the stored value if anything changed
    pub fn record(&mut self, vital: WebVital, value: f64, now: i64) -> Option<VitalValue> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }

        let slot = match vital {
            WebVital::Fcp => &mut self.fcp,
            WebVital::Lcp => &mut self.lcp,
            WebVital::Fid => &mut self.fid,
            WebVital::Cls => &mut self.cls,
            WebVital::Ttfb => &mut self.ttfb,
        };

        let next = match (vital, *slot) {
            (WebVital::Fcp | WebVital::Fid | WebVital::Ttfb, Some(_)) => return None,
            (WebVital::Cls, Some(current)) => current.value + value,
            _ => value,
        };

        let stored = VitalValue {
            value: next,
            rating: vital.rate(next),
            recorded_at: now,
        };
        *slot = Some(stored);
        Some(stored)
    }
}
