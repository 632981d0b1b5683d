pub mod dispatch;
pub mod router;

pub use dispatch::{Orchestrator, RoutedResponse, Session};
pub use router::{route, AgentKind, AgentSelection, SessionState};
