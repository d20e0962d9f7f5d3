//! Scripted query processor for unit tests

use parking_lot::Mutex;
use std::sync::mpsc;
use tessera_core::{Error, PreparedQuery, QueryProcessor, QueryRequest, Result, RowBatch};

/// Answers statements by substring match and records everything it ran
#[derive(Default)]
pub(crate) struct ScriptedProcessor {
    responses: Mutex<Vec<(String, RowBatch)>>,
    failures: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    pauses: Mutex<Vec<Pause>>,
}

/// Holds the first statement matching `pattern` until resumed
struct Pause {
    pattern: String,
    reached: mpsc::Sender<()>,
    resume: mpsc::Receiver<()>,
}

impl ScriptedProcessor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return `batch` for statements containing `pattern`
    pub(crate) fn respond(&self, pattern: &str, batch: RowBatch) {
        self.responses.lock().push((pattern.to_string(), batch));
    }

    /// Fail statements containing `pattern`
    pub(crate) fn fail_on(&self, pattern: &str) {
        self.failures.lock().push(pattern.to_string());
    }

    /// Block the first statement containing `pattern`
    ///
    /// The first channel fires once the statement is reached; sending on the
    /// second lets it run.
    pub(crate) fn pause_on(&self, pattern: &str) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (reached, reached_rx) = mpsc::channel();
        let (resume_tx, resume) = mpsc::channel();
        self.pauses.lock().push(Pause {
            pattern: pattern.to_string(),
            reached,
            resume,
        });
        (reached_rx, resume_tx)
    }

    /// Texts of all statements that ran, in order
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

struct Prepared(Option<RowBatch>);

impl PreparedQuery for Prepared {
    fn execute(&mut self) -> Result<RowBatch> {
        Ok(self.0.take().unwrap_or_default())
    }
}

impl QueryProcessor for ScriptedProcessor {
    fn prepare(&self, request: &QueryRequest) -> Result<Box<dyn PreparedQuery>> {
        if self
            .failures
            .lock()
            .iter()
            .any(|pattern| request.text.contains(pattern.as_str()))
        {
            return Err(Error::backend(format!("scripted failure: {}", request.text)));
        }
        let pause = {
            let mut pauses = self.pauses.lock();
            pauses
                .iter()
                .position(|pause| request.text.contains(pause.pattern.as_str()))
                .map(|at| pauses.remove(at))
        };
        if let Some(pause) = pause {
            let _ = pause.reached.send(());
            let _ = pause.resume.recv();
        }
        self.executed.lock().push(request.text.clone());
        let batch = self
            .responses
            .lock()
            .iter()
            .find(|(pattern, _)| request.text.contains(pattern.as_str()))
            .map(|(_, batch)| batch.clone());
        Ok(Box::new(Prepared(batch)))
    }
}
