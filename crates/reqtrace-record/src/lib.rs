//! Request Record Definitions
//!
//! This crate defines the per-request telemetry record collected while an
//! application handles one HTTP transaction: timing, routing, database and
//! cache activity, logs, events, emails, views and custom user panels.
//!
//! Collectors mutate a [`RequestRecord`] during the request lifetime and the
//! record is exported in a canonical, ordered JSON shape for storage or
//! transmission. A previously exported record can be hydrated back with
//! [`RequestRecord::from_json`].
//!
//! ```
//! use reqtrace_record::{DatabaseQuery, RequestRecord};
//!
//! let mut record = RequestRecord::new();
//! record.method = Some("GET".to_string());
//! record.time = Some(1.0);
//! record.response_time = Some(1.25);
//! record.push_database_query(&DatabaseQuery::new("select 1").with_duration(4.5));
//!
//! assert_eq!(record.response_duration(), Some(250.0));
//! assert_eq!(record.database_duration(), 4.5);
//!
//! let json = record.to_json();
//! let restored = RequestRecord::from_json(&json).unwrap();
//! assert_eq!(restored.to_json(), json);
//! ```

pub mod encode;
pub mod entries;
pub mod error;
pub mod id;
pub mod record;
pub mod slots;
pub mod user_data;

pub use encode::{to_json_lossy, to_value_lossy};
pub use entries::{CacheOperation, CacheQuery, DatabaseQuery, LogLevel, LogMessage, Route, TimelineEvent};
pub use error::HydrateError;
pub use id::{generate_request_id, Clock, SystemClock};
pub use record::{RequestExport, RequestRecord, Subrequest, UserDataSlot};
pub use slots::{SlotKey, Slots};
pub use user_data::{ShowAs, UserData, UserDataItem};

/// Record schema version
pub const PROTOCOL_VERSION: u32 = 1;
