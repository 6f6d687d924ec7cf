//! Question answering: the orchestrator and the interactive session

mod orchestrator;
mod session;

pub use orchestrator::RetrievalQa;
pub use session::{format_answer, AnswerFormatter, QaSession, SessionState, SessionStats, EXIT_COMMAND};
