//! Provider - Trait abstracting the remote resource API
//!
//! A ResourceClient issues single requests against one API generation. It never
//! waits: polling and locking are layered on top by the lifecycle handler.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::resource::{ResourceId, ResourceKind, Snapshot};

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// VPC API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Generation {
    /// VPC on classic infrastructure
    Classic,
    #[default]
    Gen2,
}

impl Generation {
    /// Value of the `generation` query parameter
    pub fn number(&self) -> u8 {
        match self {
            Generation::Classic => 1,
            Generation::Gen2 => 2,
        }
    }

    pub fn from_number(number: u8) -> Result<Self> {
        match number {
            1 => Ok(Generation::Classic),
            2 => Ok(Generation::Gen2),
            other => Err(Error::configuration(format!(
                "Unsupported generation: {} (expected 1 or 2)",
                other
            ))),
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Classic => write!(f, "classic"),
            Generation::Gen2 => write!(f, "gen2"),
        }
    }
}

impl FromStr for Generation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" | "classic" => Ok(Generation::Classic),
            "2" | "gen2" => Ok(Generation::Gen2),
            other => Err(Error::configuration(format!(
                "Unsupported generation: {} (expected 1 or 2)",
                other
            ))),
        }
    }
}

/// Client for one generation of the VPC API
pub trait ResourceClient: Send + Sync {
    fn generation(&self) -> Generation;

    /// Whether this generation has resources of `kind`
    fn supports(&self, kind: ResourceKind) -> bool;

    /// Get the current document of a resource
    ///
    /// Returns `Ok(None)` when the remote reports 404 or a `not_found` error code.
    fn get(&self, id: &ResourceId) -> BoxFuture<'_, Result<Option<Snapshot>>>;

    /// Every resource of `kind` under `parents`, across all pages
    fn list(&self, kind: ResourceKind, parents: &[String]) -> BoxFuture<'_, Result<Vec<Snapshot>>>;

    /// Create a resource under `parents`
    ///
    /// Singleton kinds are attached to the parent itself (PUT) and the returned
    /// document is the attached object.
    fn create(
        &self,
        kind: ResourceKind,
        parents: &[String],
        body: serde_json::Value,
    ) -> BoxFuture<'_, Result<Snapshot>>;

    /// Apply a JSON merge patch
    fn update(&self, id: &ResourceId, patch: serde_json::Value) -> BoxFuture<'_, Result<Snapshot>>;

    /// Delete a resource
    ///
    /// A 404 surfaces as `Error::NotFound`; callers decide whether that is success.
    fn delete(&self, id: &ResourceId) -> BoxFuture<'_, Result<()>>;
}

impl ResourceClient for Box<dyn ResourceClient> {
    fn generation(&self) -> Generation {
        (**self).generation()
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        (**self).supports(kind)
    }

    fn get(&self, id: &ResourceId) -> BoxFuture<'_, Result<Option<Snapshot>>> {
        (**self).get(id)
    }

    fn list(&self, kind: ResourceKind, parents: &[String]) -> BoxFuture<'_, Result<Vec<Snapshot>>> {
        (**self).list(kind, parents)
    }

    fn create(
        &self,
        kind: ResourceKind,
        parents: &[String],
        body: serde_json::Value,
    ) -> BoxFuture<'_, Result<Snapshot>> {
        (**self).create(kind, parents, body)
    }

    fn update(&self, id: &ResourceId, patch: serde_json::Value) -> BoxFuture<'_, Result<Snapshot>> {
        (**self).update(id, patch)
    }

    fn delete(&self, id: &ResourceId) -> BoxFuture<'_, Result<()>> {
        (**self).delete(id)
    }
}

impl<C: ResourceClient + ?Sized> ResourceClient for Arc<C> {
    fn generation(&self) -> Generation {
        (**self).generation()
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        (**self).supports(kind)
    }

    fn get(&self, id: &ResourceId) -> BoxFuture<'_, Result<Option<Snapshot>>> {
        (**self).get(id)
    }

    fn list(&self, kind: ResourceKind, parents: &[String]) -> BoxFuture<'_, Result<Vec<Snapshot>>> {
        (**self).list(kind, parents)
    }

    fn create(
        &self,
        kind: ResourceKind,
        parents: &[String],
        body: serde_json::Value,
    ) -> BoxFuture<'_, Result<Snapshot>> {
        (**self).create(kind, parents, body)
    }

    fn update(&self, id: &ResourceId, patch: serde_json::Value) -> BoxFuture<'_, Result<Snapshot>> {
        (**self).update(id, patch)
    }

    fn delete(&self, id: &ResourceId) -> BoxFuture<'_, Result<()>> {
        (**self).delete(id)
    }
}
