//! Atomic single-document updates.
//!
//! An update is a list of field operations guarded by optional
//! preconditions. Stores evaluate the preconditions and apply the
//! operations against the persisted body in one atomic step, so deltas
//! never race with a stale local copy.

use serde_json::{Map, Value};

use crate::{DocumentId, Result, StoreError};

/// A single change to a document field. Field paths are dotted
/// (`settlement.completed`).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Overwrites the field, creating intermediate objects as needed.
    Set { field: String, value: Value },

    /// Adds a signed delta to an integer field (a missing field counts as 0).
    Increment { field: String, delta: i64 },

    /// Appends a value to an array field unless it is already present.
    ArrayUnion { field: String, value: Value },

    /// Removes every occurrence of a value from an array field. A missing
    /// field is left missing.
    ArrayRemove { field: String, value: Value },
}

/// A condition checked against the persisted document before applying ops.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The integer field must be at least `min` (a missing field counts as 0).
    AtLeast { field: String, min: i64 },

    /// The field must equal `value`.
    Equals { field: String, value: Value },

    /// The array field must not contain `value` (a missing field is empty).
    Excludes { field: String, value: Value },
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precondition::AtLeast { field, min } => write!(f, "{field} >= {min}"),
            Precondition::Equals { field, value } => write!(f, "{field} == {value}"),
            Precondition::Excludes { field, value } => write!(f, "{value} not in {field}"),
        }
    }
}

/// Builder for an atomic document update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    /// Conditions that must all hold for the update to apply.
    pub preconditions: Vec<Precondition>,

    /// Operations applied in order.
    pub ops: Vec<FieldOp>,
}

impl DocumentUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field to a value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a delta to an integer field.
    pub fn increment(mut self, field: impl Into<String>, delta: i64) -> Self {
        self.ops.push(FieldOp::Increment {
            field: field.into(),
            delta,
        });
        self
    }

    /// Appends a value to an array field if not already present.
    pub fn array_union(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::ArrayUnion {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Removes a value from an array field.
    pub fn array_remove(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::ArrayRemove {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Requires an integer field to be at least `min`.
    pub fn require_at_least(mut self, field: impl Into<String>, min: i64) -> Self {
        self.preconditions.push(Precondition::AtLeast {
            field: field.into(),
            min,
        });
        self
    }

    /// Requires a field to equal a value.
    pub fn require_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.preconditions.push(Precondition::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Requires an array field not to contain a value.
    ///
    /// Paired with `array_union` of the same value this makes an update
    /// apply at most once.
    pub fn require_absent(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.preconditions.push(Precondition::Excludes {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Returns true if the update has no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Evaluates the update against a persisted body, returning the new body.
    ///
    /// Fails with `ConditionFailed` without touching anything if a
    /// precondition does not hold.
    pub fn apply_to(&self, collection: &str, id: &DocumentId, body: &Value) -> Result<Value> {
        for condition in &self.preconditions {
            let holds = match condition {
                Precondition::AtLeast { field, min } => integer_at(body, field)? >= *min,
                Precondition::Equals { field, value } => lookup(body, field) == Some(value),
                Precondition::Excludes { field, value } => match lookup(body, field) {
                    None | Some(Value::Null) => true,
                    Some(Value::Array(items)) => !items.contains(value),
                    Some(_) => {
                        return Err(StoreError::InvalidField {
                            field: field.clone(),
                            reason: "not an array".to_string(),
                        });
                    }
                },
            };
            if !holds {
                return Err(StoreError::ConditionFailed {
                    collection: collection.to_string(),
                    id: id.clone(),
                    condition: condition.to_string(),
                });
            }
        }

        let mut next = body.clone();
        for op in &self.ops {
            match op {
                FieldOp::Set { field, value } => {
                    *slot_mut(&mut next, field)? = value.clone();
                }
                FieldOp::Increment { field, delta } => {
                    let current = integer_at(&next, field)?;
                    let updated =
                        current
                            .checked_add(*delta)
                            .ok_or_else(|| StoreError::InvalidField {
                                field: field.clone(),
                                reason: "integer overflow".to_string(),
                            })?;
                    *slot_mut(&mut next, field)? = Value::from(updated);
                }
                FieldOp::ArrayUnion { field, value } => {
                    let slot = slot_mut(&mut next, field)?;
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    match slot {
                        Value::Array(items) => {
                            if !items.contains(value) {
                                items.push(value.clone());
                            }
                        }
                        _ => {
                            return Err(StoreError::InvalidField {
                                field: field.clone(),
                                reason: "not an array".to_string(),
                            });
                        }
                    }
                }
                FieldOp::ArrayRemove { field, value } => {
                    let present = match lookup(&next, field) {
                        None | Some(Value::Null) => false,
                        Some(Value::Array(_)) => true,
                        Some(_) => {
                            return Err(StoreError::InvalidField {
                                field: field.clone(),
                                reason: "not an array".to_string(),
                            });
                        }
                    };
                    if present {
                        if let Value::Array(items) = slot_mut(&mut next, field)? {
                            items.retain(|item| item != value);
                        }
                    }
                }
            }
        }
        Ok(next)
    }
}

/// Reads the value at a dotted path.
pub fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(body, |current, segment| current.get(segment))
}

fn integer_at(body: &Value, field: &str) -> Result<i64> {
    match lookup(body, field) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_i64().ok_or_else(|| StoreError::InvalidField {
            field: field.to_string(),
            reason: format!("expected an integer, found {value}"),
        }),
    }
}

fn slot_mut<'a>(body: &'a mut Value, path: &str) -> Result<&'a mut Value> {
    let mut current = body;
    for segment in path.split('.') {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
            _ => {
                return Err(StoreError::InvalidField {
                    field: path.to_string(),
                    reason: format!("'{segment}' is not inside an object"),
                });
            }
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id() -> DocumentId {
        DocumentId::new("doc")
    }

    #[test]
    fn increment_applies_delta_to_persisted_value() {
        let body = json!({"stock": 5});
        let update = DocumentUpdate::new().increment("stock", -2);

        let next = update.apply_to("products", &id(), &body).unwrap();
        assert_eq!(next["stock"], 3);
    }

    #[test]
    fn increment_treats_missing_field_as_zero() {
        let next = DocumentUpdate::new()
            .increment("clickCount", 1)
            .apply_to("affiliates", &id(), &json!({}))
            .unwrap();
        assert_eq!(next["clickCount"], 1);
    }

    #[test]
    fn increment_rejects_non_integer_field() {
        let result = DocumentUpdate::new()
            .increment("name", 1)
            .apply_to("affiliates", &id(), &json!({"name": "Ana"}));
        assert!(matches!(result, Err(StoreError::InvalidField { .. })));
    }

    #[test]
    fn failed_precondition_leaves_body_untouched() {
        let body = json!({"stock": 1});
        let result = DocumentUpdate::new()
            .require_at_least("stock", 2)
            .increment("stock", -2)
            .apply_to("products", &id(), &body);

        match result {
            Err(StoreError::ConditionFailed { condition, .. }) => {
                assert_eq!(condition, "stock >= 2");
            }
            other => panic!("expected ConditionFailed, got {other:?}"),
        }
        assert_eq!(body["stock"], 1);
    }

    #[test]
    fn equals_precondition() {
        let body = json!({"settlement": {"completed": false}});
        assert!(
            DocumentUpdate::new()
                .require_eq("settlement.completed", false)
                .set("settlement.completed", true)
                .apply_to("orders", &id(), &body)
                .is_ok()
        );
        assert!(
            DocumentUpdate::new()
                .require_eq("settlement.completed", true)
                .apply_to("orders", &id(), &body)
                .is_err()
        );
    }

    #[test]
    fn set_creates_nested_objects() {
        let next = DocumentUpdate::new()
            .set("settlement.completed", true)
            .apply_to("orders", &id(), &json!({}))
            .unwrap();
        assert_eq!(next, json!({"settlement": {"completed": true}}));
    }

    #[test]
    fn set_through_scalar_is_rejected() {
        let result = DocumentUpdate::new()
            .set("total.cents", 1)
            .apply_to("orders", &id(), &json!({"total": 100}));
        assert!(matches!(result, Err(StoreError::InvalidField { .. })));
    }

    #[test]
    fn array_union_is_idempotent() {
        let update = DocumentUpdate::new().array_union("settlement.stockSettled", "p1|M|red");
        let once = update.apply_to("orders", &id(), &json!({})).unwrap();
        let twice = update.apply_to("orders", &id(), &once).unwrap();
        assert_eq!(twice["settlement"]["stockSettled"], json!(["p1|M|red"]));
    }

    #[test]
    fn excludes_guards_a_one_time_update() {
        let update = DocumentUpdate::new()
            .require_absent("creditedOrders", "o1")
            .increment("balance", 2000)
            .array_union("creditedOrders", "o1");

        let once = update.apply_to("affiliates", &id(), &json!({"balance": 0})).unwrap();
        assert_eq!(once["balance"], 2000);

        match update.apply_to("affiliates", &id(), &once) {
            Err(StoreError::ConditionFailed { condition, .. }) => {
                assert_eq!(condition, r#""o1" not in creditedOrders"#);
            }
            other => panic!("expected ConditionFailed, got {other:?}"),
        }
    }

    #[test]
    fn array_remove_drops_marker_and_leaves_missing_fields_alone() {
        let body = json!({"settledLines": ["o1|a", "o2|b", "o1|a"]});

        let next = DocumentUpdate::new()
            .array_remove("settledLines", "o1|a")
            .apply_to("products", &id(), &body)
            .unwrap();
        assert_eq!(next["settledLines"], json!(["o2|b"]));

        let untouched = DocumentUpdate::new()
            .array_remove("settledLines", "o1|a")
            .apply_to("products", &id(), &json!({"stock": 1}))
            .unwrap();
        assert_eq!(untouched, json!({"stock": 1}));

        assert!(matches!(
            DocumentUpdate::new()
                .array_remove("stock", "o1|a")
                .apply_to("products", &id(), &json!({"stock": 1})),
            Err(StoreError::InvalidField { .. })
        ));
    }

    #[test]
    fn lookup_walks_dotted_paths() {
        let body = json!({"a": {"b": {"c": 1}}});
        assert_eq!(lookup(&body, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup(&body, "a.x"), None);
    }
}
