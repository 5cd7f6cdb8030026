//! Read-only views over a candidate editing plan.
//!
//! A plan is either `{"elements": [...]}` or a bare array of element
//! objects. Both validators go through these helpers so field aliases
//! (`timestamp`/`start`, `broll`/`brollId`, `sound`/`sfx`) are resolved
//! in one place.

use serde_json::{Map, Value};

/// The element array of a plan, or `None` when the plan has neither shape.
pub fn elements(plan: &Value) -> Option<&Vec<Value>> {
    match plan {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("elements").and_then(Value::as_array),
        _ => None,
    }
}

/// Path of element `index`, e.g. `elements[3]`.
pub fn element_path(index: usize) -> String {
    format!("elements[{}]", index)
}

/// Borrowed view of one plan element object.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    pub index: usize,
    pub fields: &'a Map<String, Value>,
}

impl<'a> Element<'a> {
    pub fn path(&self) -> String {
        element_path(self.index)
    }

    pub fn field_path(&self, field: &str) -> String {
        format!("{}.{}", element_path(self.index), field)
    }

    pub fn str_field(&self, name: &str) -> Option<&'a str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    fn number_field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// The `type` field.
    pub fn kind(&self) -> Option<&'a str> {
        self.str_field("type")
    }

    pub fn layer(&self) -> Option<&'a str> {
        self.str_field("layer")
    }

    pub fn action(&self) -> Option<&'a str> {
        self.str_field("action")
    }

    pub fn context(&self) -> Option<&'a str> {
        self.str_field("context")
    }

    /// Start time in seconds from `timestamp`, falling back to `start`.
    pub fn time(&self) -> Option<f64> {
        self.number_field("timestamp")
            .or_else(|| self.number_field("start"))
    }

    /// Duration in seconds; absent or negative counts as zero.
    pub fn duration(&self) -> f64 {
        self.number_field("duration").unwrap_or(0.0).max(0.0)
    }

    /// B-roll reference and the field it came from.
    pub fn broll(&self) -> Option<(&'static str, &'a str)> {
        ["broll", "brollId"]
            .into_iter()
            .find_map(|f| self.str_field(f).map(|v| (f, v)))
    }

    /// Sound effect reference and the field it came from.
    pub fn sound(&self) -> Option<(&'static str, &'a str)> {
        ["sound", "sfx"]
            .into_iter()
            .find_map(|f| self.str_field(f).map(|v| (f, v)))
    }
}

/// Iterate over the object elements of a plan, skipping non-objects.
pub fn element_views(items: &[Value]) -> impl Iterator<Item = Element<'_>> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, v)| v.as_object().map(|fields| Element { index, fields }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_elements_accepts_both_shapes() {
        let wrapped = json!({"elements": [{"type": "effect"}]});
        let bare = json!([{"type": "effect"}]);
        assert_eq!(elements(&wrapped).map(Vec::len), Some(1));
        assert_eq!(elements(&bare).map(Vec::len), Some(1));
        assert!(elements(&json!({"items": []})).is_none());
        assert!(elements(&json!("plan")).is_none());
    }

    #[test]
    fn test_field_aliases() {
        let items = vec![
            json!({"start": 2.5, "brollId": "city", "sfx": "assets/sfx/pop.wav"}),
            json!("not an object"),
            json!({"timestamp": 1, "start": 9, "duration": -3}),
        ];
        let views: Vec<_> = element_views(&items).collect();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].time(), Some(2.5));
        assert_eq!(views[0].broll(), Some(("brollId", "city")));
        assert_eq!(views[0].sound(), Some(("sfx", "assets/sfx/pop.wav")));
        assert_eq!(views[1].index, 2);
        assert_eq!(views[1].time(), Some(1.0));
        assert_eq!(views[1].duration(), 0.0);
        assert_eq!(views[1].field_path("layer"), "elements[2].layer");
    }
}
