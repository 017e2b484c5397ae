//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
//! Transport-selection cascade for IoT boxes.
//!
//! The [`Dispatcher`] walks the installed transports in the order chosen by
//! the [`ModeController`], skipping any that failed recently according to the
//! [`FailureMemory`], and resolves each action through exactly one callback.

pub mod dispatcher;
pub mod failure_memory;
pub mod metrics;
pub mod mode;
pub mod notify;
pub mod record_store;
pub mod report;
pub mod status;
pub mod target;

pub use dispatcher::{ActionRequest, Dispatcher, DispatcherBuilder};
pub use failure_memory::FailureMemory;
pub use metrics::CascadeMetrics;
pub use mode::{ModeController, PlannedStage};
pub use notify::{NotificationKind, Notifier, NotifyOptions, TracingNotifier};
pub use record_store::{BoxRecord, RecordStore, RecordStoreError, StaticRecordStore, TargetCache};
pub use report::{
    Attempt, AttemptVerdict, CascadeError, CascadeReport, Resolution, SkipReason,
};
pub use status::{ConnectionStatus, RunTicket, StatusSnapshot, StatusTracker};
pub use target::{BoxRef, TargetError};

pub mod prelude {
    pub use super::{
        ActionRequest, BoxRef, ConnectionStatus, Dispatcher, FailureMemory, Notifier,
        NotifyOptions, StaticRecordStore,
    };
    pub use iot_link_common::config::ModePreference;
    pub use iot_link_transport::{ActionId, Outcome, OutcomeStatus, Transport, TransportKind};
}
