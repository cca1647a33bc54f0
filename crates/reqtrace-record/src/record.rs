//! Per-request telemetry record
//!
//! A `RequestRecord` aggregates everything observed while handling one
//! request. Scalar fields are public and set directly by collectors; the
//! collections are append-only and only reachable through `push_*` methods.
//!
//! The export shape is fixed: field names and order follow `RequestExport`,
//! `responseDuration` and `databaseDuration` are computed at export time, `log`
//! is exported as a dense list and user data panels are expanded.

use crate::encode::{to_json_lossy, to_json_pretty_lossy, to_value_lossy};
use crate::error::HydrateError;
use crate::id::{generate_request_id, Clock, SystemClock};
use crate::slots::{SlotKey, Slots};
use crate::user_data::UserData;
use crate::PROTOCOL_VERSION;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Link to the record of a nested or forwarded request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subrequest {
    /// Form-urlencoded request URL
    pub url: String,
    /// Id of the subrequest's own record
    pub id: String,
    /// Non-default path the subrequest's record is served from
    #[serde(default)]
    pub path: Option<String>,
}

/// Value stored in the user data mapping
#[derive(Debug, Clone, PartialEq)]
pub enum UserDataSlot {
    /// Panel created through `RequestRecord::user_data`
    Entry(UserData),
    /// Value passed through verbatim
    Raw(Value),
}

impl UserDataSlot {
    /// Plain value form used in exports
    pub fn to_value(&self) -> Value {
        match self {
            UserDataSlot::Entry(panel) => panel.to_value(),
            UserDataSlot::Raw(value) => value.clone(),
        }
    }

    /// Panel held by this slot
    ///
    /// A raw value is turned into a panel in place only when it is a panel
    /// export that the panel reproduces exactly. Any other raw value is left
    /// untouched and `None` is returned.
    pub fn as_panel_mut(&mut self) -> Option<&mut UserData> {
        if let UserDataSlot::Raw(value) = self {
            let panel = UserData::from_value(value)
                .filter(|panel| to_json_lossy(&panel.to_value()) == to_json_lossy(&*value))?;
            *self = UserDataSlot::Entry(panel);
        }

        match self {
            UserDataSlot::Entry(panel) => Some(panel),
            UserDataSlot::Raw(_) => None,
        }
    }
}

/// Everything observed while handling one request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    id: String,
    /// Record schema version
    pub version: u32,

    /// Request start, seconds since the Unix epoch
    pub time: Option<f64>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub uri: Option<String>,
    /// Header name to value (string or list of strings), in arrival order
    pub headers: Map<String, Value>,
    /// Textual identity of the route handler
    pub controller: Option<String>,

    pub get_data: Map<String, Value>,
    pub post_data: Map<String, Value>,
    pub session_data: Map<String, Value>,
    pub cookies: Map<String, Value>,

    /// Response completion, seconds since the Unix epoch
    pub response_time: Option<f64>,
    pub response_status: Option<u16>,
    /// Peak memory usage in bytes
    pub memory_usage: Option<u64>,

    database_queries: Vec<Value>,

    cache_queries: Vec<Value>,
    pub cache_reads: Option<u64>,
    pub cache_hits: Option<u64>,
    pub cache_writes: Option<u64>,
    pub cache_deletes: Option<u64>,
    /// Accumulated cache time in milliseconds
    pub cache_time: Option<f64>,

    timeline_data: Vec<Value>,
    log: Slots<Value>,
    events: Vec<Value>,
    routes: Vec<Value>,
    emails_data: Vec<Value>,
    views_data: Vec<Value>,
    user_data: Slots<UserDataSlot>,
    subrequests: Vec<Subrequest>,
}

impl Default for RequestRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRecord {
    /// Create an empty record with a freshly generated id
    pub fn new() -> Self {
        Self::with_id_source(&SystemClock, &mut rand::thread_rng())
    }

    /// Create an empty record, generating its id from the given clock and
    /// random source
    pub fn with_id_source<C, R>(clock: &C, rng: &mut R) -> Self
    where
        C: Clock + ?Sized,
        R: Rng,
    {
        Self::with_id(generate_request_id(clock, rng))
    }

    /// Create an empty record with a caller-chosen id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: PROTOCOL_VERSION,
            time: None,
            method: None,
            url: None,
            uri: None,
            headers: Map::new(),
            controller: None,
            get_data: Map::new(),
            post_data: Map::new(),
            session_data: Map::new(),
            cookies: Map::new(),
            response_time: None,
            response_status: None,
            memory_usage: None,
            database_queries: Vec::new(),
            cache_queries: Vec::new(),
            cache_reads: None,
            cache_hits: None,
            cache_writes: None,
            cache_deletes: None,
            cache_time: None,
            timeline_data: Vec::new(),
            log: Slots::new(),
            events: Vec::new(),
            routes: Vec::new(),
            emails_data: Vec::new(),
            views_data: Vec::new(),
            user_data: Slots::new(),
            subrequests: Vec::new(),
        }
    }

    /// Rebuild a record from its JSON export
    pub fn from_json(json: &str) -> Result<Self, HydrateError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Rebuild a record from a field name to value mapping
    ///
    /// Known fields overwrite their defaults. Unknown fields and fields with
    /// an unexpected type are skipped and logged; only a non-object input is
    /// an error.
    pub fn from_value(value: Value) -> Result<Self, HydrateError> {
        let object = match value {
            Value::Object(object) => object,
            other => return Err(HydrateError::not_an_object(&other)),
        };

        let id = match object.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                let id = generate_request_id(&SystemClock, &mut rand::thread_rng());
                tracing::warn!("Hydrated record has no usable id, assigned {}", id);
                id
            }
        };

        let mut record = Self::with_id(id);
        for (key, value) in object {
            record.hydrate_field(&key, value);
        }

        Ok(record)
    }

    fn hydrate_field(&mut self, key: &str, value: Value) {
        match key {
            // Identity is resolved before the loop, derived fields are recomputed
            "id" | "responseDuration" | "databaseDuration" => {}

            "version" => {
                let version = value.as_u64().and_then(|v| u32::try_from(v).ok());
                match version {
                    Some(version) => self.version = version,
                    None => mismatch(key, &value),
                }
            }

            "time" => assign(&mut self.time, key, &value, Value::as_f64),
            "method" => assign(&mut self.method, key, &value, as_string),
            "url" => assign(&mut self.url, key, &value, as_string),
            "uri" => assign(&mut self.uri, key, &value, as_string),
            "controller" => assign(&mut self.controller, key, &value, as_string),
            "responseTime" => assign(&mut self.response_time, key, &value, Value::as_f64),
            "responseStatus" => assign(&mut self.response_status, key, &value, |v| {
                v.as_u64().and_then(|s| u16::try_from(s).ok())
            }),
            "memoryUsage" => assign(&mut self.memory_usage, key, &value, Value::as_u64),
            "cacheReads" => assign(&mut self.cache_reads, key, &value, Value::as_u64),
            "cacheHits" => assign(&mut self.cache_hits, key, &value, Value::as_u64),
            "cacheWrites" => assign(&mut self.cache_writes, key, &value, Value::as_u64),
            "cacheDeletes" => assign(&mut self.cache_deletes, key, &value, Value::as_u64),
            "cacheTime" => assign(&mut self.cache_time, key, &value, Value::as_f64),

            "headers" => replace(&mut self.headers, mapping(key, value)),
            "getData" => replace(&mut self.get_data, mapping(key, value)),
            "postData" => replace(&mut self.post_data, mapping(key, value)),
            "sessionData" => replace(&mut self.session_data, mapping(key, value)),
            "cookies" => replace(&mut self.cookies, mapping(key, value)),

            "databaseQueries" => replace(&mut self.database_queries, sequence(key, value)),
            "cacheQueries" => replace(&mut self.cache_queries, sequence(key, value)),
            "timelineData" => replace(&mut self.timeline_data, sequence(key, value)),
            "events" => replace(&mut self.events, sequence(key, value)),
            "routes" => replace(&mut self.routes, sequence(key, value)),
            "emailsData" => replace(&mut self.emails_data, sequence(key, value)),
            "viewsData" => replace(&mut self.views_data, sequence(key, value)),

            "log" => {
                if let Some(entries) = keyed(key, value) {
                    let mut log = Slots::new();
                    for (slot, entry) in entries {
                        log.insert(slot, entry);
                    }
                    self.log = log;
                }
            }

            "userData" => {
                if let Some(entries) = keyed(key, value) {
                    let mut user_data = Slots::new();
                    for (slot, entry) in entries {
                        user_data.insert(slot, UserDataSlot::Raw(entry));
                    }
                    self.user_data = user_data;
                }
            }

            "subrequests" => {
                if let Some(entries) = sequence(key, value) {
                    self.subrequests = entries
                        .into_iter()
                        .filter_map(|entry| match serde_json::from_value(entry) {
                            Ok(subrequest) => Some(subrequest),
                            Err(e) => {
                                tracing::warn!("Skipping malformed subrequest: {}", e);
                                None
                            }
                        })
                        .collect();
                }
            }

            _ => tracing::debug!("Ignoring unknown record field {}", key),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // ========== Derived metrics ==========

    /// Total duration of all database queries in milliseconds
    ///
    /// Queries without a numeric `duration` contribute nothing.
    pub fn database_duration(&self) -> f64 {
        self.database_queries
            .iter()
            .filter_map(|query| query.get("duration").and_then(Value::as_f64))
            .fold(0.0, |total, duration| total + duration)
    }

    /// Time between request start and response completion in milliseconds,
    /// `None` until both timestamps are known
    pub fn response_duration(&self) -> Option<f64> {
        match (self.time, self.response_time) {
            (Some(start), Some(end)) => Some((end - start) * 1000.0),
            _ => None,
        }
    }

    // ========== Collector API ==========

    pub fn push_database_query<T>(&mut self, query: &T)
    where
        T: Serialize + ?Sized,
    {
        self.database_queries.push(to_value_lossy(query));
    }

    pub fn push_cache_query<T>(&mut self, query: &T)
    where
        T: Serialize + ?Sized,
    {
        self.cache_queries.push(to_value_lossy(query));
    }

    pub fn push_timeline_event<T>(&mut self, event: &T)
    where
        T: Serialize + ?Sized,
    {
        self.timeline_data.push(to_value_lossy(event));
    }

    /// Append a log entry
    pub fn push_log<T>(&mut self, entry: &T)
    where
        T: Serialize + ?Sized,
    {
        self.log.push(to_value_lossy(entry));
    }

    /// Store a log entry under `key`; keys are dropped on export
    pub fn insert_log<T>(&mut self, key: impl Into<SlotKey>, entry: &T)
    where
        T: Serialize + ?Sized,
    {
        self.log.insert(key, to_value_lossy(entry));
    }

    pub fn push_event<T>(&mut self, event: &T)
    where
        T: Serialize + ?Sized,
    {
        self.events.push(to_value_lossy(event));
    }

    pub fn push_route<T>(&mut self, route: &T)
    where
        T: Serialize + ?Sized,
    {
        self.routes.push(to_value_lossy(route));
    }

    pub fn push_email<T>(&mut self, email: &T)
    where
        T: Serialize + ?Sized,
    {
        self.emails_data.push(to_value_lossy(email));
    }

    pub fn push_view<T>(&mut self, view: &T)
    where
        T: Serialize + ?Sized,
    {
        self.views_data.push(to_value_lossy(view));
    }

    /// Record an executed subrequest
    ///
    /// The url is form-urlencoded here, so consumers always receive a
    /// URL-safe token. Only ASCII alphanumerics and `-_.` stay literal and
    /// spaces become `+`.
    pub fn add_subrequest(&mut self, url: &str, id: impl Into<String>, path: Option<&str>) {
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        self.subrequests.push(Subrequest {
            // byte_serialize leaves '*' literal
            url: encoded.replace('*', "%2A"),
            id: id.into(),
            path: path.map(str::to_string),
        });
    }

    /// Custom user data panel stored under `key`
    ///
    /// An existing panel at `key` is returned as is. Otherwise a new panel
    /// titled `key` is stored under it, or appended when no key is given.
    /// An empty key counts as no key. `"0"` and other canonical integer keys
    /// address the positional slot with that index, like any other key.
    ///
    /// Returns `None` when `key` holds a raw value that is not a panel; that
    /// value is never rewritten.
    pub fn user_data(&mut self, key: Option<&str>) -> Option<&mut UserData> {
        match key.filter(|k| !k.is_empty()) {
            Some(key) => self
                .user_data
                .get_or_insert_with(key, || {
                    let mut panel = UserData::new();
                    panel.set_title(Some(key));
                    UserDataSlot::Entry(panel)
                })
                .as_panel_mut(),
            None => self
                .user_data
                .push(UserDataSlot::Entry(UserData::new()))
                .as_panel_mut(),
        }
    }

    /// Store a raw user data value, exported verbatim
    pub fn insert_user_value<T>(&mut self, key: Option<&str>, value: &T)
    where
        T: Serialize + ?Sized,
    {
        let slot = UserDataSlot::Raw(to_value_lossy(value));
        match key {
            Some(key) => {
                self.user_data.insert(key, slot);
            }
            None => {
                self.user_data.push(slot);
            }
        }
    }

    // ========== Accessors ==========

    pub fn database_queries(&self) -> &[Value] {
        &self.database_queries
    }

    pub fn cache_queries(&self) -> &[Value] {
        &self.cache_queries
    }

    pub fn timeline_data(&self) -> &[Value] {
        &self.timeline_data
    }

    pub fn log(&self) -> &Slots<Value> {
        &self.log
    }

    pub fn events(&self) -> &[Value] {
        &self.events
    }

    pub fn routes(&self) -> &[Value] {
        &self.routes
    }

    pub fn emails_data(&self) -> &[Value] {
        &self.emails_data
    }

    pub fn views_data(&self) -> &[Value] {
        &self.views_data
    }

    pub fn user_data_slots(&self) -> &Slots<UserDataSlot> {
        &self.user_data
    }

    pub fn subrequests(&self) -> &[Subrequest] {
        &self.subrequests
    }

    // ========== Export ==========

    /// Borrowed view of the record in canonical export order
    pub fn export(&self) -> RequestExport<'_> {
        RequestExport {
            id: &self.id,
            version: self.version,
            time: self.time,
            method: self.method.as_deref(),
            url: self.url.as_deref(),
            uri: self.uri.as_deref(),
            headers: &self.headers,
            controller: self.controller.as_deref(),
            get_data: &self.get_data,
            post_data: &self.post_data,
            session_data: &self.session_data,
            cookies: &self.cookies,
            response_time: self.response_time,
            response_status: self.response_status,
            response_duration: self.response_duration(),
            memory_usage: self.memory_usage,
            database_queries: &self.database_queries,
            database_duration: self.database_duration(),
            cache_queries: &self.cache_queries,
            cache_reads: self.cache_reads,
            cache_hits: self.cache_hits,
            cache_writes: self.cache_writes,
            cache_deletes: self.cache_deletes,
            cache_time: self.cache_time,
            timeline_data: &self.timeline_data,
            log: DenseLog(&self.log),
            events: &self.events,
            routes: &self.routes,
            emails_data: &self.emails_data,
            views_data: &self.views_data,
            user_data: ExpandedUserData(&self.user_data),
            subrequests: &self.subrequests,
        }
    }

    /// Canonical export as an ordered JSON value
    pub fn to_value(&self) -> Value {
        to_value_lossy(&self.export())
    }

    /// Canonical export as compact JSON; never fails
    pub fn to_json(&self) -> String {
        to_json_lossy(&self.export())
    }

    /// Canonical export as indented JSON; never fails
    pub fn to_json_pretty(&self) -> String {
        to_json_pretty_lossy(&self.export())
    }
}

impl Serialize for RequestRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.export().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RequestRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RequestRecord::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Serializable snapshot of a record in canonical field order
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestExport<'a> {
    id: &'a str,
    version: u32,
    time: Option<f64>,
    method: Option<&'a str>,
    url: Option<&'a str>,
    uri: Option<&'a str>,
    headers: &'a Map<String, Value>,
    controller: Option<&'a str>,
    get_data: &'a Map<String, Value>,
    post_data: &'a Map<String, Value>,
    session_data: &'a Map<String, Value>,
    cookies: &'a Map<String, Value>,
    response_time: Option<f64>,
    response_status: Option<u16>,
    response_duration: Option<f64>,
    memory_usage: Option<u64>,
    database_queries: &'a [Value],
    database_duration: f64,
    cache_queries: &'a [Value],
    cache_reads: Option<u64>,
    cache_hits: Option<u64>,
    cache_writes: Option<u64>,
    cache_deletes: Option<u64>,
    cache_time: Option<f64>,
    timeline_data: &'a [Value],
    log: DenseLog<'a>,
    events: &'a [Value],
    routes: &'a [Value],
    emails_data: &'a [Value],
    views_data: &'a [Value],
    user_data: ExpandedUserData<'a>,
    subrequests: &'a [Subrequest],
}

/// Log entries as a plain list, keys dropped
#[derive(Debug)]
struct DenseLog<'a>(&'a Slots<Value>);

impl Serialize for DenseLog<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.values())
    }
}

/// User data with panels expanded
///
/// Exported as a list while every key is positional, otherwise as an object
/// keyed by the string form of each key.
#[derive(Debug)]
struct ExpandedUserData<'a>(&'a Slots<UserDataSlot>);

impl Serialize for ExpandedUserData<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.has_named_keys() {
            serializer.collect_map(
                self.0
                    .iter()
                    .map(|(key, slot)| (key.to_string(), slot.to_value())),
            )
        } else {
            serializer.collect_seq(self.0.values().map(UserDataSlot::to_value))
        }
    }
}

// ========== Hydration helpers ==========

fn mismatch(key: &str, value: &Value) {
    tracing::warn!("Ignoring record field {} with unexpected value {}", key, value);
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Set a nullable scalar field; `null` clears it, a mistyped value is skipped
fn assign<T>(field: &mut Option<T>, key: &str, value: &Value, parse: impl FnOnce(&Value) -> Option<T>) {
    if value.is_null() {
        *field = None;
        return;
    }
    match parse(value) {
        Some(parsed) => *field = Some(parsed),
        None => mismatch(key, value),
    }
}

fn replace<T>(field: &mut T, parsed: Option<T>) {
    if let Some(parsed) = parsed {
        *field = parsed;
    }
}

/// Mapping fields accept objects; lists are keyed by position
fn mapping(key: &str, value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Null => Some(Map::new()),
        Value::Array(items) => Some(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
        ),
        other => {
            mismatch(key, &other);
            None
        }
    }
}

/// Sequence fields accept lists; objects contribute their values in order
fn sequence(key: &str, value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Null => Some(Vec::new()),
        Value::Object(map) => Some(map.into_iter().map(|(_, item)| item).collect()),
        other => {
            mismatch(key, &other);
            None
        }
    }
}

/// Keyed fields keep object keys and number list items by position
fn keyed(key: &str, value: Value) -> Option<Vec<(SlotKey, Value)>> {
    match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (SlotKey::Index(index as u64), item))
                .collect(),
        ),
        Value::Null => Some(Vec::new()),
        Value::Object(map) => Some(
            map.into_iter()
                .map(|(slot, item)| (SlotKey::from(slot), item))
                .collect(),
        ),
        other => {
            mismatch(key, &other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{DatabaseQuery, LogLevel, LogMessage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    const EXPORT_KEYS: [&str; 32] = [
        "id",
        "version",
        "time",
        "method",
        "url",
        "uri",
        "headers",
        "controller",
        "getData",
        "postData",
        "sessionData",
        "cookies",
        "responseTime",
        "responseStatus",
        "responseDuration",
        "memoryUsage",
        "databaseQueries",
        "databaseDuration",
        "cacheQueries",
        "cacheReads",
        "cacheHits",
        "cacheWrites",
        "cacheDeletes",
        "cacheTime",
        "timelineData",
        "log",
        "events",
        "routes",
        "emailsData",
        "viewsData",
        "userData",
        "subrequests",
    ];

    #[test]
    fn test_empty_record_defaults() {
        let record = RequestRecord::with_id("1-0000-1");
        let value = record.to_value();

        assert_eq!(value["id"], "1-0000-1");
        assert_eq!(value["version"], 1);
        assert_eq!(value["time"], Value::Null);
        assert_eq!(value["headers"], json!({}));
        assert_eq!(value["responseDuration"], Value::Null);
        assert_eq!(value["databaseDuration"], json!(0.0));
        assert_eq!(value["log"], json!([]));
        assert_eq!(value["userData"], json!([]));
        assert_eq!(value["subrequests"], json!([]));
    }

    #[test]
    fn test_export_key_order() {
        let record = RequestRecord::new();
        let value = record.to_value();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();

        assert_eq!(keys, EXPORT_KEYS.to_vec());
    }

    #[test]
    fn test_injected_id_source() {
        let clock = || 1_700_000_000.1234;
        let record = RequestRecord::with_id_source(&clock, &mut StdRng::seed_from_u64(3));
        assert!(record.id().starts_with("1700000000-1234-"));
    }

    #[test]
    fn test_database_duration_skips_missing() {
        let mut record = RequestRecord::new();
        record.push_database_query(&json!({"query": "a", "duration": 10}));
        record.push_database_query(&json!({"query": "b", "duration": 5}));
        record.push_database_query(&json!({"query": "c"}));
        record.push_database_query(&json!({"query": "d", "duration": "slow"}));
        record.push_database_query(&json!("not an object"));

        assert_eq!(record.database_duration(), 15.0);
    }

    #[test]
    fn test_response_duration() {
        let mut record = RequestRecord::new();
        assert_eq!(record.response_duration(), None);

        record.time = Some(1.0);
        assert_eq!(record.response_duration(), None);

        record.response_time = Some(1.25);
        assert_eq!(record.response_duration(), Some(250.0));
    }

    #[test]
    fn test_log_is_exported_dense() {
        let mut record = RequestRecord::new();
        record.insert_log("a", &"x");
        record.insert_log("b", &"y");

        assert_eq!(record.to_value()["log"], json!(["x", "y"]));
    }

    #[test]
    fn test_typed_log_message() {
        let mut record = RequestRecord::new();
        record.push_log(&LogMessage::new(LogLevel::Error, "boom"));

        assert_eq!(
            record.to_value()["log"],
            json!([{"message": "boom", "level": "error"}])
        );
    }

    #[test]
    fn test_user_data_same_key_same_panel() {
        let mut record = RequestRecord::new();
        let first: *const UserData = record.user_data(Some("perf")).unwrap();
        record.user_data(Some("perf")).unwrap().counters(&json!({"hits": 1}));
        let second: *const UserData = record.user_data(Some("perf")).unwrap();

        assert_eq!(first, second);
        assert_eq!(record.user_data_slots().len(), 1);

        let panel = record.user_data(Some("perf")).unwrap();
        assert_eq!(panel.len(), 1);
        assert_eq!(panel.title(), Some("perf"));
    }

    #[test]
    fn test_user_data_without_key_appends() {
        let mut record = RequestRecord::new();
        record.user_data(None);
        record.user_data(None);
        record.user_data(Some(""));

        assert_eq!(record.user_data_slots().len(), 3);
        assert_eq!(
            record.to_value()["userData"],
            json!([{"__meta": {}}, {"__meta": {}}, {"__meta": {}}])
        );
    }

    #[test]
    fn test_user_data_mixed_keys_export_object() {
        let mut record = RequestRecord::new();
        record.user_data(None);
        record.user_data(Some("cache")).unwrap().counters(&json!({"hits": 3}));
        record.insert_user_value(None, &"raw");

        assert_eq!(
            record.to_value()["userData"],
            json!({
                "0": {"__meta": {}},
                "cache": {"0": {"hits": 3, "__meta": {"showAs": "counters"}}, "__meta": {"title": "cache"}},
                "1": "raw"
            })
        );
    }

    #[test]
    fn test_user_data_promotes_hydrated_panel() {
        let mut original = RequestRecord::new();
        original
            .user_data(Some("jobs"))
            .unwrap()
            .table("Queue", &json!([{"job": "mail"}]));

        let mut restored = RequestRecord::from_value(original.to_value()).unwrap();
        restored
            .user_data(Some("jobs"))
            .unwrap()
            .counters(&json!({"failed": 0}));

        let panel = restored.user_data(Some("jobs")).unwrap();
        assert_eq!(panel.title(), Some("jobs"));
        assert_eq!(panel.len(), 2);
    }

    #[test]
    fn test_user_data_leaves_raw_values_untouched() {
        let mut record = RequestRecord::new();
        record.insert_user_value(Some("stats"), &json!({"a": 1}));
        record.insert_user_value(Some("note"), &"hello");
        record.insert_user_value(Some("odd"), &json!({"a": 1, "__meta": {"title": "Odd", "extra": true}}));
        let before = record.to_value();

        assert!(record.user_data(Some("stats")).is_none());
        assert!(record.user_data(Some("note")).is_none());
        assert!(record.user_data(Some("odd")).is_none());

        assert_eq!(record.to_value(), before);
        assert_eq!(
            record.to_value()["userData"]["stats"],
            json!({"a": 1})
        );
        assert_eq!(record.user_data_slots().len(), 3);
    }

    #[test]
    fn test_user_data_zero_key_is_slot_zero() {
        let mut record = RequestRecord::new();
        let appended: *const UserData = record.user_data(None).unwrap();
        let keyed: *const UserData = record.user_data(Some("0")).unwrap();

        assert_eq!(appended, keyed);
        assert_eq!(record.user_data_slots().len(), 1);
        assert!(record.to_value()["userData"].is_array());
    }

    #[test]
    fn test_add_subrequest_encodes_url() {
        let mut record = RequestRecord::new();
        record.add_subrequest("http://a/b?x=1", "id1", None);
        record.add_subrequest("/api/users list", "id2", Some("/__reqtrace"));

        assert_eq!(
            record.to_value()["subrequests"],
            json!([
                {"url": "http%3A%2F%2Fa%2Fb%3Fx%3D1", "id": "id1", "path": null},
                {"url": "%2Fapi%2Fusers+list", "id": "id2", "path": "/__reqtrace"}
            ])
        );
    }

    #[test]
    fn test_add_subrequest_escapes_reserved_marks() {
        let mut record = RequestRecord::new();
        record.add_subrequest("http://a/b*c~d", "id1", None);
        record.add_subrequest("/x-y_z.html", "id2", None);

        assert_eq!(record.subrequests()[0].url, "http%3A%2F%2Fa%2Fb%2Ac%7Ed");
        assert_eq!(record.subrequests()[1].url, "%2Fx-y_z.html");
    }

    #[test]
    fn test_hydration_ignores_unknown_and_mistyped() {
        let record = RequestRecord::from_value(json!({
            "id": "abc",
            "time": "yesterday",
            "method": "POST",
            "responseStatus": 70000,
            "responseDuration": 999,
            "somethingNew": {"nested": true}
        }))
        .unwrap();

        assert_eq!(record.id(), "abc");
        assert_eq!(record.time, None);
        assert_eq!(record.method.as_deref(), Some("POST"));
        assert_eq!(record.response_status, None);
        assert_eq!(record.response_duration(), None);
    }

    #[test]
    fn test_hydration_with_huge_numeric_keys() {
        let mut record = RequestRecord::from_json(
            r#"{"id":"p","log":{"18446744073709551615":"x"},"userData":{"9223372036854775807":{"a":1}}}"#,
        )
        .unwrap();

        record.push_log(&"y");
        record.user_data(None).unwrap();

        assert_eq!(record.to_value()["log"], json!(["x", "y"]));
        assert_eq!(record.log().len(), 2);
        assert_eq!(record.user_data_slots().len(), 2);
    }

    #[test]
    fn test_hydration_without_id_generates_one() {
        let record = RequestRecord::from_value(json!({"method": "GET"})).unwrap();
        assert_eq!(record.id().split('-').count(), 3);
    }

    #[test]
    fn test_hydration_rejects_non_object() {
        let err = RequestRecord::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, HydrateError::NotAnObject("array")));

        assert!(matches!(
            RequestRecord::from_json("{not json"),
            Err(HydrateError::Json(_))
        ));
    }

    #[test]
    fn test_hydration_accepts_legacy_shapes() {
        let record = RequestRecord::from_value(json!({
            "id": "legacy",
            "headers": [],
            "log": {"first": "a", "second": "b"},
            "databaseQueries": {"q1": {"query": "x", "duration": 2}}
        }))
        .unwrap();

        assert!(record.headers.is_empty());
        assert_eq!(record.to_value()["log"], json!(["a", "b"]));
        assert_eq!(record.database_duration(), 2.0);
    }

    #[test]
    fn test_serde_impls_use_canonical_shape() {
        let mut record = RequestRecord::with_id("serde");
        record.push_database_query(&DatabaseQuery::new("select 1").with_duration(1.5));

        let via_serde = serde_json::to_value(&record).unwrap();
        assert_eq!(via_serde, record.to_value());

        let back: RequestRecord = serde_json::from_value(via_serde).unwrap();
        assert_eq!(back, record);
    }
}
