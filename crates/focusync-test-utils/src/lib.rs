mod clock;
mod llm;
mod remote;

pub use clock::ManualClock;
pub use llm::ScriptedLLM;
pub use remote::{InMemoryRemote, RemoteCall, RemoteOp};
