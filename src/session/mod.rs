//! Operator sessions: state machine, typed store, handler pipeline and routes.

pub mod history;
pub mod manager;
pub mod routes;
pub mod state;
pub mod store;
pub mod workflow;

pub use history::{HandlerId, HistoryInterceptor, Interceptor, Pipeline};
pub use manager::{SessionHandle, SessionManager};
pub use routes::{AppState, session_routes};
pub use state::WorkflowPhase;
pub use store::{SessionKey, SessionStore, keys};
pub use workflow::{Review, SendOutcome, Session, SessionSnapshot, WorkflowDeps};
