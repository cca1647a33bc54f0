//! Typed collector entries
//!
//! The record stores collection entries as loose JSON values so hydrated data
//! passes through untouched. Collectors that want a typed shape can build one
//! of these and push it; optional fields are omitted from the entry when unset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Executed database query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseQuery {
    /// Query text
    pub query: String,
    /// Execution time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Connection name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    /// Caller file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Caller line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl DatabaseQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            duration: None,
            connection: None,
            file: None,
            line: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Record where the query was issued from
    pub fn with_caller(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

/// Kind of cache operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOperation {
    Read,
    Hit,
    Write,
    Delete,
}

/// Executed cache operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheQuery {
    #[serde(rename = "type")]
    pub operation: CacheOperation,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Execution time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    /// Expiration in seconds, for writes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
}

impl CacheQuery {
    pub fn new(operation: CacheOperation, key: impl Into<String>) -> Self {
        Self {
            operation,
            key: key.into(),
            value: None,
            duration: None,
            connection: None,
            expiration: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn with_expiration(mut self, seconds: u64) -> Self {
        self.expiration = Some(seconds);
        self
    }
}

/// Named timing span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub description: String,
    /// Start time in seconds since the Unix epoch
    pub start: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    /// Span length in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TimelineEvent {
    pub fn new(description: impl Into<String>, start: f64) -> Self {
        Self {
            description: description.into(),
            start,
            end: None,
            duration: None,
            data: None,
        }
    }

    /// Close the span at `end`, deriving its duration
    pub fn finish(mut self, end: f64) -> Self {
        self.end = Some(end);
        self.duration = Some((end - self.start) * 1000.0);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Log severity (PSR-3 levels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "emergency" => Ok(LogLevel::Emergency),
            "alert" => Ok(LogLevel::Alert),
            "critical" => Ok(LogLevel::Critical),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "notice" => Ok(LogLevel::Notice),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Application log message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
    pub level: LogLevel,
    /// Time in seconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            time: None,
            context: Map::new(),
        }
    }

    pub fn at(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Registered application route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub method: String,
    pub uri: String,
    /// Handler identity, e.g. `UserController@show`
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
}

impl Route {
    pub fn new(method: impl Into<String>, uri: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            action: action.into(),
            name: None,
            middleware: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_middleware(mut self, middleware: impl Into<String>) -> Self {
        self.middleware.push(middleware.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_database_query_omits_unset_fields() {
        let query = DatabaseQuery::new("select * from users");
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"query": "select * from users"})
        );

        let query = query.with_duration(12.5).with_connection("mysql");
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"query": "select * from users", "duration": 12.5, "connection": "mysql"})
        );
    }

    #[test]
    fn test_cache_query_type_field() {
        let query = CacheQuery::new(CacheOperation::Hit, "user:1").with_duration(0.4);
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"type": "hit", "key": "user:1", "duration": 0.4})
        );
    }

    #[test]
    fn test_timeline_finish_sets_duration() {
        let event = TimelineEvent::new("boot", 1.0).finish(1.5);
        assert_eq!(event.end, Some(1.5));
        assert_eq!(event.duration, Some(500.0));
    }

    #[test]
    fn test_log_level_parse_and_display() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::Critical.to_string(), "critical");
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_message_shape() {
        let message = LogMessage::new(LogLevel::Info, "user logged in")
            .with_context("user_id", json!(7));
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"message": "user logged in", "level": "info", "context": {"user_id": 7}})
        );
    }

    #[test]
    fn test_route_deserialize_defaults() {
        let route: Route = serde_json::from_value(json!({
            "method": "GET",
            "uri": "/users/{id}",
            "action": "UserController@show"
        }))
        .unwrap();
        assert_eq!(route, Route::new("GET", "/users/{id}", "UserController@show"));
    }
}
