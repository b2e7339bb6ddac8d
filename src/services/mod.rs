pub mod cascade;
pub mod context;
pub mod crud_service;
pub mod resource;
pub mod result;

pub use cascade::cascade_related;
pub use context::RequestContext;
pub use crud_service::CrudEngine;
pub use resource::{HookError, NoHooks, Resource, ResourceHooks};
pub use result::OperationResult;
