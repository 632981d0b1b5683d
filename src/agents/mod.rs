pub mod specialists;
pub mod traits;

pub use specialists::{PdfAgent, Specialist};
pub use traits::{
    AgentBehavior, AgentContext, AgentRequest, AgentResponse, NoopProgress, ProgressObserver,
    ProgressUpdate, TracingProgress,
};
