//! Custom user data panels
//!
//! A panel has an optional title and an ordered set of data items. Each item
//! holds arbitrary content plus presentation hints for the viewer. The export
//! form of a panel is an object of its items followed by a `__meta` object:
//!
//! ```json
//! {
//!   "0": { "hits": 10, "misses": 2, "__meta": { "showAs": "counters" } },
//!   "__meta": { "title": "Cache" }
//! }
//! ```

use crate::encode::to_value_lossy;
use crate::slots::{SlotKey, Slots};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding presentation metadata in exported panels and items
pub const META_KEY: &str = "__meta";

/// How the viewer should present an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowAs {
    Counters,
    Table,
}

/// Single data item of a panel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDataItem {
    data: Map<String, Value>,
    show_as: Option<ShowAs>,
    title: Option<String>,
    labels: Map<String, Value>,
}

impl UserDataItem {
    fn new(data: Value) -> Self {
        Self {
            data: into_object(data),
            ..Default::default()
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn show_as(&self) -> Option<ShowAs> {
        self.show_as
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn labels(&self) -> &Map<String, Value> {
        &self.labels
    }

    pub fn set_show_as(&mut self, show_as: ShowAs) -> &mut Self {
        self.show_as = Some(show_as);
        self
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    /// Set table column labels, keyed by column name
    pub fn set_labels<T>(&mut self, labels: &T) -> &mut Self
    where
        T: Serialize + ?Sized,
    {
        match to_value_lossy(labels) {
            Value::Object(labels) => self.labels = labels,
            other => tracing::debug!("Ignoring non-object table labels: {}", other),
        }
        self
    }

    pub fn to_value(&self) -> Value {
        let mut meta = Map::new();
        if let Some(show_as) = self.show_as {
            meta.insert("showAs".to_string(), to_value_lossy(&show_as));
        }
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            meta.insert("title".to_string(), Value::String(title.to_string()));
        }
        if !self.labels.is_empty() {
            meta.insert("labels".to_string(), Value::Object(self.labels.clone()));
        }

        let mut object = self.data.clone();
        object.insert(META_KEY.to_string(), Value::Object(meta));
        Value::Object(object)
    }

    fn from_value(value: &Value) -> Self {
        let mut data = into_object(value.clone());
        let meta = data.remove(META_KEY);
        let meta = meta.as_ref().and_then(Value::as_object);

        Self {
            data,
            show_as: meta
                .and_then(|m| m.get("showAs"))
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            title: meta
                .and_then(|m| m.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string),
            labels: meta
                .and_then(|m| m.get("labels"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Custom panel shown as an additional tab in the viewer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
    title: Option<String>,
    items: Slots<UserDataItem>,
}

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: Option<impl Into<String>>) -> &mut Self {
        self.title = title.map(Into::into);
        self
    }

    /// Append a data item
    pub fn data<T>(&mut self, data: &T) -> &mut UserDataItem
    where
        T: Serialize + ?Sized,
    {
        self.items.push(UserDataItem::new(to_value_lossy(data)))
    }

    /// Store a data item under `key`, replacing any item already there
    pub fn data_keyed<T>(&mut self, key: &str, data: &T) -> &mut UserDataItem
    where
        T: Serialize + ?Sized,
    {
        self.items
            .insert(key, UserDataItem::new(to_value_lossy(data)))
    }

    /// Append an item presented as a row of counters
    pub fn counters<T>(&mut self, data: &T) -> &mut UserDataItem
    where
        T: Serialize + ?Sized,
    {
        self.data(data).set_show_as(ShowAs::Counters)
    }

    /// Append an item presented as a titled table
    pub fn table<T>(&mut self, title: impl Into<String>, data: &T) -> &mut UserDataItem
    where
        T: Serialize + ?Sized,
    {
        self.data(data).set_show_as(ShowAs::Table).set_title(title)
    }

    pub fn items(&self) -> impl Iterator<Item = (&SlotKey, &UserDataItem)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Plain value form used in exports
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        for (key, item) in self.items.iter() {
            object.insert(key.to_string(), item.to_value());
        }

        let mut meta = Map::new();
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            meta.insert("title".to_string(), Value::String(title.to_string()));
        }
        object.insert(META_KEY.to_string(), Value::Object(meta));

        Value::Object(object)
    }

    /// Rebuild a panel from its export form
    ///
    /// Returns `None` unless `value` is an object carrying a `__meta` object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if !object.get(META_KEY).is_some_and(Value::is_object) {
            return None;
        }
        let mut panel = UserData::new();

        for (key, value) in object {
            if key == META_KEY {
                panel.title = value
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            } else {
                panel
                    .items
                    .insert(key.as_str(), UserDataItem::from_value(value));
            }
        }

        Some(panel)
    }
}

/// Coerce item content into an object: lists are keyed by position and
/// scalars become a single positional entry
fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item))
            .collect(),
        Value::Null => Map::new(),
        scalar => {
            let mut map = Map::new();
            map.insert("0".to_string(), scalar);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counters_export() {
        let mut panel = UserData::new();
        panel.set_title(Some("Cache"));
        panel.counters(&json!({"hits": 10, "misses": 2}));

        assert_eq!(
            panel.to_value(),
            json!({
                "0": {"hits": 10, "misses": 2, "__meta": {"showAs": "counters"}},
                "__meta": {"title": "Cache"}
            })
        );
    }

    #[test]
    fn test_table_export_with_labels() {
        let mut panel = UserData::new();
        panel
            .table("Jobs", &json!([{"name": "mail", "runs": 3}]))
            .set_labels(&json!({"name": "Job name"}));

        assert_eq!(
            panel.to_value(),
            json!({
                "0": {
                    "0": {"name": "mail", "runs": 3},
                    "__meta": {"showAs": "table", "title": "Jobs", "labels": {"name": "Job name"}}
                },
                "__meta": {}
            })
        );
    }

    #[test]
    fn test_keyed_items_replace() {
        let mut panel = UserData::new();
        panel.data_keyed("stats", &json!({"a": 1}));
        panel.data_keyed("stats", &json!({"a": 2}));

        assert_eq!(panel.len(), 1);
        let (_, item) = panel.items().next().unwrap();
        assert_eq!(item.data().get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_scalar_data_is_wrapped() {
        let mut panel = UserData::new();
        panel.data(&"plain");
        let (_, item) = panel.items().next().unwrap();
        assert_eq!(item.data().get("0"), Some(&json!("plain")));
    }

    #[test]
    fn test_from_value_round_trip() {
        let mut panel = UserData::new();
        panel.set_title(Some("Perf"));
        panel.counters(&json!({"requests": 4}));
        panel.data_keyed("notes", &json!(["slow", "cold cache"]));
        panel.table("Timings", &json!({"boot": 12.5}));

        let exported = panel.to_value();
        let restored = UserData::from_value(&exported).unwrap();

        assert_eq!(restored.title(), Some("Perf"));
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.to_value(), exported);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(UserData::from_value(&json!("text")).is_none());
        assert!(UserData::from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_from_value_requires_meta_object() {
        assert!(UserData::from_value(&json!({"a": 1})).is_none());
        assert!(UserData::from_value(&json!({"a": 1, "__meta": "x"})).is_none());
        assert!(UserData::from_value(&json!({"__meta": {}})).is_some());
    }
}
