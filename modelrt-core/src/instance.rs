//! Instance handles, the entity capability and typed attribute storage.

use crate::error::CoreError;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type tag of an entity ("Product", "VM", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Kind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an instance, unique within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle naming one instance: kind tag plus identifier.
///
/// Components other than the instance registry hold handles, never the
/// instance itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceRef {
    pub kind: Kind,
    pub id: InstanceId,
}

impl InstanceRef {
    pub fn new(kind: impl Into<Kind>, id: impl Into<InstanceId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<String> for Kind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// An instance stored in the registry.
///
/// Implementations keep their attributes in a typed struct (usually through
/// [`Attributes`]); `get`/`set` are the name-based view over it.
pub trait Entity: Send + Sync + 'static {
    /// Kind tag and identifier.
    fn handle(&self) -> &InstanceRef;

    /// Reads an attribute by name. Unknown names read as `Null`.
    fn get(&self, name: &str) -> Value;

    /// Writes an attribute by name.
    fn set(&self, name: &str, value: Value) -> Result<(), CoreError>;

    /// Upcast used for typed downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn kind(&self) -> &Kind {
        &self.handle().kind
    }

    fn id(&self) -> &InstanceId {
        &self.handle().id
    }
}

/// Downcasts a stored entity to its concrete type.
pub fn downcast<T: Entity>(entity: Arc<dyn Entity>) -> Option<Arc<T>> {
    entity.into_any().downcast::<T>().ok()
}

/// Typed attribute storage with a name-based JSON view.
#[derive(Debug, Default)]
pub struct Attributes<T> {
    inner: RwLock<T>,
}

impl<T> Attributes<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(values: T) -> Self {
        Self {
            inner: RwLock::new(values),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Returns the whole attribute set as a JSON object.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(&*self.inner.read()).unwrap_or(Value::Null)
    }

    /// Reads one attribute, `Null` when the name is not part of the schema.
    pub fn get(&self, name: &str) -> Value {
        match self.snapshot() {
            Value::Object(mut map) => map.remove(name).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Writes one attribute, checking it against the schema.
    pub fn set(&self, kind: &Kind, name: &str, value: Value) -> Result<(), CoreError> {
        let mut guard = self.inner.write();
        let mut map = match serde_json::to_value(&*guard)? {
            Value::Object(map) => map,
            _ => {
                return Err(CoreError::UnknownAttribute {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })
            }
        };

        if !map.contains_key(name) {
            return Err(CoreError::UnknownAttribute {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
        map.insert(name.to_string(), value);

        *guard = serde_json::from_value(Value::Object(map)).map_err(|e| {
            CoreError::AttributeType {
                kind: kind.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        product_code: String,
        stock: i64,
        owner: Option<InstanceRef>,
    }

    #[test]
    fn test_handle_display() {
        let handle = InstanceRef::new("PRD", "p-1");
        assert_eq!(handle.to_string(), "PRD:p-1");
        assert_ne!(InstanceId::generate(), InstanceId::generate());
    }

    #[test]
    fn test_attribute_get_defaults() {
        let attrs = Attributes::new(Sample::default());
        assert_eq!(attrs.get("productCode"), json!(""));
        assert_eq!(attrs.get("stock"), json!(0));
        assert_eq!(attrs.get("owner"), Value::Null);
        assert_eq!(attrs.get("nope"), Value::Null);
    }

    #[test]
    fn test_attribute_set() {
        let kind = Kind::from("PRD");
        let attrs = Attributes::new(Sample::default());

        attrs.set(&kind, "stock", json!(5)).unwrap();
        assert_eq!(attrs.read().stock, 5);

        attrs
            .set(&kind, "owner", json!({"kind": "VM", "id": "m-1"}))
            .unwrap();
        assert_eq!(attrs.read().owner, Some(InstanceRef::new("VM", "m-1")));
    }

    #[test]
    fn test_attribute_set_rejects_bad_input() {
        let kind = Kind::from("PRD");
        let attrs = Attributes::new(Sample::default());

        let result = attrs.set(&kind, "colour", json!("red"));
        assert!(matches!(result, Err(CoreError::UnknownAttribute { .. })));

        let result = attrs.set(&kind, "stock", json!("many"));
        assert!(matches!(result, Err(CoreError::AttributeType { .. })));
        assert_eq!(attrs.read().stock, 0);
    }
}
