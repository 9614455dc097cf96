//! Repository objects and the lookup capability wrappers resolve them through.
//!
//! The repository itself lives outside this crate; wrappers only see the
//! [`ObjectResolver`] trait. [`InMemoryObjectStore`] backs tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{Result, WorkflowError};
use crate::ids::{ObjectId, TenantId};
use crate::types::ObjectType;

/// Typed reference to a repository object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub oid: ObjectId,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

impl ObjectRef {
    pub fn new(object_type: ObjectType, oid: ObjectId) -> Self {
        Self { oid, object_type }
    }

    pub fn user(oid: ObjectId) -> Self {
        Self::new(ObjectType::User, oid)
    }

    pub fn role(oid: ObjectId) -> Self {
        Self::new(ObjectType::Role, oid)
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.object_type, self.oid)
    }
}

/// A repository object as wrappers see it: identity plus a JSON attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedObject {
    pub oid: ObjectId,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ManagedObject {
    pub fn new(object_type: ObjectType, name: impl Into<String>) -> Self {
        Self {
            oid: ObjectId::new(),
            object_type,
            name: name.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Reference pointing at this object.
    #[must_use]
    pub fn reference(&self) -> ObjectRef {
        ObjectRef::new(self.object_type, self.oid)
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Read access to repository objects.
#[async_trait::async_trait]
pub trait ObjectResolver: Send + Sync {
    /// Look an object up; `Ok(None)` when it does not exist.
    async fn find(&self, tenant_id: TenantId, reference: &ObjectRef)
        -> Result<Option<ManagedObject>>;

    /// Look an object up, failing with a not-found error when missing.
    async fn resolve(&self, tenant_id: TenantId, reference: &ObjectRef) -> Result<ManagedObject> {
        self.find(tenant_id, reference)
            .await?
            .ok_or_else(|| WorkflowError::not_found(reference.object_type.as_str(), reference.oid))
    }
}

/// In-memory object store for testing.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<(TenantId, ObjectId), ManagedObject>>>,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store an object, replacing any previous version.
    pub async fn insert(&self, tenant_id: TenantId, object: ManagedObject) -> ObjectRef {
        let reference = object.reference();
        self.objects
            .write()
            .await
            .insert((tenant_id, object.oid), object);
        reference
    }

    /// Remove an object; returns whether it existed.
    pub async fn remove(&self, tenant_id: TenantId, oid: ObjectId) -> bool {
        self.objects
            .write()
            .await
            .remove(&(tenant_id, oid))
            .is_some()
    }

    pub async fn count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn clear(&self) {
        self.objects.write().await.clear();
    }
}

#[async_trait::async_trait]
impl ObjectResolver for InMemoryObjectStore {
    async fn find(
        &self,
        tenant_id: TenantId,
        reference: &ObjectRef,
    ) -> Result<Option<ManagedObject>> {
        let objects = self.objects.read().await;
        match objects.get(&(tenant_id, reference.oid)) {
            Some(object) if object.object_type != reference.object_type => {
                Err(WorkflowError::schema(format!(
                    "object {} is a {}, referenced as {}",
                    reference.oid, object.object_type, reference.object_type
                )))
            }
            found => Ok(found.cloned()),
        }
    }
}
