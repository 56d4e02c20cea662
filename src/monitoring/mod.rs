//! Session Monitoring Module
//!
//! Records what happened during a session for reports.
//!
//! # Components
//!
//! - [`SessionTimeline`]: Bout start/end timing for Gantt charts

pub mod timeline;

pub use timeline::{EventType, SessionTimeline, TimelineEvent};
