//! # Input Disambiguator
//!
//! Tells a barcode/QR reader in keyboard-emulation mode apart from a human
//! typing into the search field.
//!
//! ## Keystroke Timeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Human:    c ─────180ms───── o ─────210ms───── l ──── a ──── ⏎         │
//! │            buffer resets on every gap > 100ms → never classified        │
//! │            ⏎ → ManualSearch("cola")                                     │
//! │                                                                         │
//! │  Scanner:  4 ─8ms─ 0 ─9ms─ 0 ─8ms─ 6 ─7ms─ 3 ... ⏎                      │
//! │            gap < 50ms with > 3 chars buffered → Scanner (latched)       │
//! │            ⏎ → Scan("4006381333931"), search field cleared              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Classification Triggers (first match wins, latched for the session)
//! 1. inter-key latency below `burst_latency_ms` with more than
//!    `burst_min_len` characters buffered
//! 2. more than `window_len` characters accumulated within `window_ms`
//! 3. buffer begins with a structured-payload marker (`{` by default)
//!
//! The detector prefers a missed detection (routed as a manual search) over
//! a false positive that would wipe what the operator typed. Keystrokes
//! aimed at an explicitly focused text field are never observed.
//!
//! Time is supplied by the caller as milliseconds on any monotonic clock.

use serde::{Deserialize, Serialize};

// =============================================================================
// Thresholds
// =============================================================================

/// Timing heuristics for scan-burst detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanThresholds {
    /// A gap longer than this starts a new keystroke sequence.
    pub sequence_gap_ms: u64,
    /// Inter-key latency below this counts as machine speed.
    pub burst_latency_ms: u64,
    /// Characters that must already be buffered for the latency trigger.
    pub burst_min_len: usize,
    /// Characters that must accumulate within `window_ms`.
    pub window_len: usize,
    pub window_ms: u64,
    /// Inactivity after which the buffer is dropped.
    pub idle_clear_ms: u64,
    /// Leading characters that mark a structured record.
    pub payload_markers: Vec<char>,
}

impl Default for ScanThresholds {
    fn default() -> Self {
        ScanThresholds {
            sequence_gap_ms: 100,
            burst_latency_ms: 50,
            burst_min_len: 3,
            window_len: 10,
            window_ms: 500,
            idle_clear_ms: 500,
            payload_markers: vec!['{'],
        }
    }
}

// =============================================================================
// Events & Outcomes
// =============================================================================

/// Where the keystroke was aimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTarget {
    /// No field, or the sale screen's search field.
    #[default]
    Ambient,
    /// A visible text field the operator focused on purpose (notes,
    /// quantity, customer form). Hard exclusion.
    FocusedField,
}

/// A platform-neutral key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Char {
        ch: char,
        at_ms: u64,
        target: KeyTarget,
    },
    /// Enter. `search_text` is what the visible search field holds.
    Submit {
        at_ms: u64,
        target: KeyTarget,
        search_text: String,
    },
}

impl KeyEvent {
    pub fn char(ch: char, at_ms: u64) -> Self {
        KeyEvent::Char {
            ch,
            at_ms,
            target: KeyTarget::Ambient,
        }
    }

    pub fn submit(at_ms: u64, search_text: impl Into<String>) -> Self {
        KeyEvent::Submit {
            at_ms,
            target: KeyTarget::Ambient,
            search_text: search_text.into(),
        }
    }

    fn target(&self) -> KeyTarget {
        match self {
            KeyEvent::Char { target, .. } | KeyEvent::Submit { target, .. } => *target,
        }
    }
}

/// What a completed input should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Dispatch {
    /// Completed scan payload for the product resolver. The caller clears
    /// the search field, which holds scanner noise.
    Scan(String),
    /// Operator-typed search term.
    ManualSearch(String),
}

/// Which rule classified the input as a scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    Latency,
    BurstWindow,
    PayloadMarker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Manual,
    Scanner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub mode: InputMode,
    pub trigger: Option<ScanTrigger>,
}

// =============================================================================
// Scan Detector
// =============================================================================

/// Keystroke state for one terminal session.
///
/// Owned by the session that shows the sale screen; never shared.
#[derive(Debug, Clone)]
pub struct ScanDetector {
    thresholds: ScanThresholds,
    buffer: String,
    last_key_at: Option<u64>,
    scan_start_at: Option<u64>,
    detected: Option<ScanTrigger>,
    attached: bool,
}

impl ScanDetector {
    pub fn new(thresholds: ScanThresholds) -> Self {
        ScanDetector {
            thresholds,
            buffer: String::new(),
            last_key_at: None,
            scan_start_at: None,
            detected: None,
            attached: true,
        }
    }

    /// Feeds one key event. Returns a dispatch only on submit.
    pub fn push(&mut self, event: KeyEvent) -> Option<Dispatch> {
        if !self.attached || event.target() == KeyTarget::FocusedField {
            return None;
        }

        match event {
            KeyEvent::Char { ch, at_ms, .. } => {
                self.push_char(ch, at_ms);
                None
            }
            KeyEvent::Submit {
                at_ms, search_text, ..
            } => self.submit(at_ms, &search_text),
        }
    }

    /// Current classification. Once a scanner is detected it stays detected
    /// until `teardown`.
    pub fn result(&self) -> Classification {
        Classification {
            mode: if self.detected.is_some() {
                InputMode::Scanner
            } else {
                InputMode::Manual
            },
            trigger: self.detected,
        }
    }

    /// Idle timer. Drops the buffer after `idle_clear_ms` without a key.
    pub fn tick(&mut self, now_ms: u64) {
        if let Some(last) = self.last_key_at {
            if now_ms.saturating_sub(last) >= self.thresholds.idle_clear_ms {
                self.clear_buffer();
            }
        }
    }

    /// Screen exit: stop observing and forget everything.
    pub fn teardown(&mut self) {
        self.attached = false;
        self.clear_buffer();
        self.detected = None;
    }

    /// Screen entry after a teardown.
    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Characters buffered for the sequence in progress.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn thresholds(&self) -> &ScanThresholds {
        &self.thresholds
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn push_char(&mut self, ch: char, at_ms: u64) {
        let elapsed = self.last_key_at.map(|last| at_ms.saturating_sub(last));

        if let Some(gap) = elapsed {
            if gap > self.thresholds.sequence_gap_ms || gap >= self.thresholds.idle_clear_ms {
                self.clear_buffer();
            }
        }

        if self.buffer.is_empty() {
            self.scan_start_at = Some(at_ms);
        }
        self.buffer.push(ch);
        self.last_key_at = Some(at_ms);

        if self.detected.is_none() {
            // Latency only counts within a sequence; the first key of a fresh
            // sequence has no meaningful predecessor.
            let latency = if self.buffer.chars().count() > 1 {
                elapsed
            } else {
                None
            };
            self.detected = self.classify(latency, at_ms);
        }
    }

    fn classify(&self, latency: Option<u64>, now_ms: u64) -> Option<ScanTrigger> {
        let t = &self.thresholds;
        let len = self.buffer.chars().count();

        if latency.is_some_and(|gap| gap < t.burst_latency_ms) && len > t.burst_min_len {
            return Some(ScanTrigger::Latency);
        }

        let window_open = self
            .scan_start_at
            .is_some_and(|start| now_ms.saturating_sub(start) <= t.window_ms);
        if len > t.window_len && window_open {
            return Some(ScanTrigger::BurstWindow);
        }

        if self
            .buffer
            .chars()
            .next()
            .is_some_and(|first| t.payload_markers.contains(&first))
        {
            return Some(ScanTrigger::PayloadMarker);
        }

        None
    }

    fn submit(&mut self, at_ms: u64, search_text: &str) -> Option<Dispatch> {
        self.tick(at_ms);

        if !self.buffer.is_empty() {
            let buffer = std::mem::take(&mut self.buffer);
            self.clear_buffer();

            if self.detected.is_some() {
                return Some(Dispatch::Scan(buffer));
            }
            // Ambiguous: fast-ish keys that never crossed a trigger. Resolved
            // in favour of the operator's own search text.
        }

        let term = search_text.trim();
        if term.is_empty() {
            None
        } else {
            Some(Dispatch::ManualSearch(term.to_string()))
        }
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.last_key_at = None;
        self.scan_start_at = None;
    }
}

impl Default for ScanDetector {
    fn default() -> Self {
        ScanDetector::new(ScanThresholds::default())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
