//! Receiver feedback: producing reports and folding them into path feedback.
//!
//! ```text
//!  receiver                                 sender
//!  ┌────────────────┐  ReceiverReport   ┌──────────────────┐
//!  │ ReceiverStats  │ ───────────────▶  │ ReportProcessor  │──▶ StateHint
//!  │ seq, jitter,   │   (to_summary)    │ RTT, loss, OWD,  │    (lossy /
//!  │ OWD, discards  │                   │ discards         │     non-lossy)
//!  └────────────────┘                   └──────────────────┘
//! ```
//!
//! Fraction lost is computed per reporting interval in 1/256 units; the
//! extended highest sequence number carries the wrap count in its high 16
//! bits. RTT is derived from the echoed sender-report time (`LSR`) and the
//! receiver's hold time (`DLSR`), both in NTP short format.

mod config;
mod processor;
mod receiver;
mod summary;

#[cfg(test)]
mod tests;

pub use config::ReceiverConfig;
pub use processor::{PathFeedback, ProcessedReport, ReportProcessor, StateHint};
pub use receiver::{ReceiverReport, ReceiverStats};
pub use summary::{ntp_short, ntp_short_to_duration, DiscardedBlock, OwdBlock, ReceiverReportBlock, ReportSummary};
