//! Orchestration layer for live document checking.
//!
//! Wires the changed-region detector, the scan worker pool, and the marker
//! overlay into a host-editor lifecycle: snapshot ingress, debounce and
//! staleness scheduling, disruption handling, and overlay publication.
//!
//! Control flow is an explicit state machine ([`AnalysisSchedule`]) driven
//! by a single session task ([`CheckSession`]); analysis cycles are
//! strictly sequential and analysis failure never propagates to the host.

pub mod policy;
pub mod schedule;
pub mod session;

pub use policy::CheckPolicy;
pub use schedule::{AnalysisSchedule, Fire};
pub use session::{CheckSession, DecorationSink, SessionHandle};
