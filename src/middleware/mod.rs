pub mod auth;
pub mod guard;
pub mod response;

pub use auth::{authorization_header, session_middleware, SessionContext};
pub use guard::{Guard, RequireLogin, RequireOwnership, Stage};
pub use response::Reply;
