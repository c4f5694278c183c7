//! Builder infrastructure - session registry, checkpoint sealing and the
//! three managers that drive a builder session

mod node_manager;
mod registry;
mod rollback_manager;
mod sealer;
mod secret;
mod session_manager;

pub use node_manager::{AddNodeOutcome, NodeManager, NodeTestResult};
pub use registry::{SessionHandle, SessionRegistry};
pub use rollback_manager::{RollbackManager, RollbackOutcome};
pub use sealer::{CheckpointSealer, SealedSnapshot};
pub use secret::{SigningSecret, SECRET_LEN};
pub use session_manager::{CheckpointOutcome, SessionManager};
