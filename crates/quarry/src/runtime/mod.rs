//! The interface between the executor and whatever owns resource data.

pub mod mock;

pub use mock::MockRuntime;

use crate::error::RuntimeResult;
use crate::schema::Schema;
use crate::value::{RawData, ResourceHandle};

/// Named initialization arguments of a resource.
pub type ResourceArgs = Vec<(String, RawData)>;

/// Creates resource instances and answers field reads.
///
/// Implementations must be callable from any thread: predicate blocks may
/// be evaluated concurrently.
pub trait Runtime: Send + Sync {
    fn schema(&self) -> &Schema;

    /// Instantiate `name`; instances with identical arguments are shared.
    fn create_resource(&self, name: &str, args: ResourceArgs) -> RuntimeResult<ResourceHandle>;

    /// Instantiate `name` under an explicit id, replacing any previous instance with that id.
    fn create_resource_with_id(
        &self,
        name: &str,
        id: &str,
        args: ResourceArgs,
    ) -> RuntimeResult<ResourceHandle>;

    /// Read field `name` of an instance.
    fn field(&self, handle: &ResourceHandle, name: &str) -> RuntimeResult<RawData>;
}
