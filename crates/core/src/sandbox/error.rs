use rhai::EvalAltResult;

/// Failures of one snippet run. Always folded into `ExecutionResult::stderr`.
#[derive(Debug, thiserror::Error)]
pub enum SnippetError {
    #[error("{message}")]
    Script { message: String, trace: Vec<String> },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Snippet worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Executor is shut down")]
    PoolClosed,
}

impl SnippetError {
    /// Unwind nested call frames into a message plus an outermost-first trace.
    pub fn from_eval(err: &EvalAltResult) -> Self {
        let mut trace = Vec::new();
        let mut current = err;
        loop {
            match current {
                EvalAltResult::ErrorInFunctionCall(name, source, inner, pos) => {
                    let origin = if source.is_empty() {
                        String::new()
                    } else {
                        format!(" in {source}")
                    };
                    trace.push(format!("call to '{name}'{origin} at {pos}"));
                    current = &**inner;
                }
                EvalAltResult::ErrorInModule(module, inner, pos) => {
                    trace.push(format!("module '{module}' at {pos}"));
                    current = &**inner;
                }
                EvalAltResult::ErrorTerminated(..) => return Self::Cancelled,
                other => {
                    if !other.position().is_none() {
                        trace.push(format!("raised at {}", other.position()));
                    }
                    return Self::Script {
                        message: other.to_string(),
                        trace,
                    };
                }
            }
        }
    }

    /// The text appended to stderr: the message, then the trace section.
    pub fn render(&self) -> String {
        let mut out = format!("{self}\n");
        if let Self::Script { trace, .. } = self {
            if !trace.is_empty() {
                out.push_str("Trace (outermost first):\n");
                for frame in trace {
                    out.push_str("  ");
                    out.push_str(frame);
                    out.push('\n');
                }
            }
        }
        out
    }
}
