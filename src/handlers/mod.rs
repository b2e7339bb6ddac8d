// Request Dispatcher
//
// A route is served by an `Endpoint`: an ordered guard pipeline in front of a
// `Controller` that declares its verbs. The generic CRUD controllers cover
// collection and item routes; apps add their own controllers for anything
// else (login, session, registration).

pub mod controller;
pub mod crud;
pub mod endpoint;

pub use controller::{dispatch, method_not_allowed, Controller};
pub use crud::{CollectionController, ItemController};
pub use endpoint::Endpoint;
