//! Interactive question loop

use std::io::{BufRead, Write};

use crate::error::Result;
use crate::types::Answer;

use super::orchestrator::RetrievalQa;

/// Word that ends the session (case-insensitive, surrounding whitespace ignored)
pub const EXIT_COMMAND: &str = "exit";

/// Session state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next input line
    AwaitingQuestion,
    /// A question has been read and is being answered
    Answering(String),
    /// Finished; no more input is read
    Terminated,
}

/// Counters reported when the session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Questions answered
    pub answered: usize,
    /// Questions that failed with a per-question error
    pub failed: usize,
}

/// Renders an answer for display
pub type AnswerFormatter = fn(&Answer) -> String;

/// Plain-text answer rendering with numbered sources
pub fn format_answer(answer: &Answer) -> String {
    let mut out = format!("\nAnswer: {}\n", answer.answer);
    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for (i, source) in answer.sources.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] {} (score {:.3})\n",
                i + 1,
                source.format_inline(),
                source.score
            ));
        }
    }
    out
}

/// Line-oriented question/answer loop over any reader and writer
pub struct QaSession<R, W> {
    qa: RetrievalQa,
    input: R,
    output: W,
    state: SessionState,
    stats: SessionStats,
    prompt: String,
    formatter: AnswerFormatter,
}

impl<R: BufRead, W: Write> QaSession<R, W> {
    /// Create a session reading questions from `input`
    pub fn new(qa: RetrievalQa, input: R, output: W) -> Self {
        Self {
            qa,
            input,
            output,
            state: SessionState::AwaitingQuestion,
            stats: SessionStats::default(),
            prompt: "Question: ".to_string(),
            formatter: format_answer,
        }
    }

    /// Replace the input prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Replace the answer renderer
    pub fn with_formatter(mut self, formatter: AnswerFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Counters so far
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Give back the writer
    pub fn into_output(self) -> W {
        self.output
    }

    /// Run until `exit`, end of input, or a structural error
    pub async fn run(&mut self) -> Result<SessionStats> {
        writeln!(
            self.output,
            "Ask questions about your documents (type '{}' to quit)\n",
            EXIT_COMMAND
        )?;
        while self.state != SessionState::Terminated {
            self.step().await?;
        }
        Ok(self.stats)
    }

    /// Perform one state transition
    pub async fn step(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, SessionState::Terminated);
        self.state = match state {
            SessionState::AwaitingQuestion => self.read_question()?,
            SessionState::Answering(question) => self.answer(&question).await?,
            SessionState::Terminated => SessionState::Terminated,
        };
        Ok(())
    }

    fn read_question(&mut self) -> Result<SessionState> {
        write!(self.output, "{}", self.prompt)?;
        self.output.flush()?;

        let mut line = Vec::new();
        if self.input.read_until(b'\n', &mut line)? == 0 {
            writeln!(self.output)?;
            tracing::debug!("End of input, closing session");
            return Ok(SessionState::Terminated);
        }

        // Undecodable bytes become U+FFFD rather than ending the session
        let line = String::from_utf8_lossy(&line);
        let question = line.trim();
        if question.eq_ignore_ascii_case(EXIT_COMMAND) {
            return Ok(SessionState::Terminated);
        }
        Ok(SessionState::Answering(question.to_string()))
    }

    async fn answer(&mut self, question: &str) -> Result<SessionState> {
        match self.qa.ask(question).await {
            Ok(answer) => {
                self.stats.answered += 1;
                writeln!(self.output, "{}", (self.formatter)(&answer))?;
                Ok(SessionState::AwaitingQuestion)
            }
            Err(e) if e.is_question_scoped() => {
                self.stats.failed += 1;
                tracing::warn!("Question failed: {}", e);
                writeln!(self.output, "\nError: {}\n", e)?;
                Ok(SessionState::AwaitingQuestion)
            }
            Err(e) => {
                tracing::error!("Session aborted: {}", e);
                Err(e)
            }
        }
    }
}
