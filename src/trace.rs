use chrono::Utc;

/// Lifecycle events for one chain execution.
///
/// Observational only: nothing in here feeds the execution result.
#[derive(Debug, Clone)]
pub struct Trace {
    pub signature: Option<String>,
    pub events: Vec<TraceEvent>,
    run_started_ms: i64,
}

#[derive(Debug, Clone)]
pub enum TraceEvent {
    RunStarted {
        ts_ms: i64,
        step_count: usize,
    },
    StepStarted {
        ts_ms: i64,
        step_id: String,
        step_type: String,
    },
    PromptAssembled {
        ts_ms: i64,
        step_id: String,
        prompt_hash: String,
    },
    StepFinished {
        ts_ms: i64,
        step_id: String,
        success: bool,
    },
    RunFailed {
        ts_ms: i64,
        message: String,
    },
    RunFinished {
        ts_ms: i64,
        success: bool,
        elapsed_ms: i64,
    },
}

impl TraceEvent {
    pub fn ts_ms(&self) -> i64 {
        match self {
            TraceEvent::RunStarted { ts_ms, .. }
            | TraceEvent::StepStarted { ts_ms, .. }
            | TraceEvent::PromptAssembled { ts_ms, .. }
            | TraceEvent::StepFinished { ts_ms, .. }
            | TraceEvent::RunFailed { ts_ms, .. }
            | TraceEvent::RunFinished { ts_ms, .. } => *ts_ms,
        }
    }

    pub fn summarize(&self) -> String {
        let body = match self {
            TraceEvent::RunStarted { step_count, .. } => format!("RunStarted steps={step_count}"),
            TraceEvent::StepStarted {
                step_id, step_type, ..
            } => format!("StepStarted step={step_id} type={step_type}"),
            TraceEvent::PromptAssembled {
                step_id,
                prompt_hash,
                ..
            } => format!("PromptAssembled step={step_id} hash={prompt_hash}"),
            TraceEvent::StepFinished {
                step_id, success, ..
            } => format!("StepFinished step={step_id} success={success}"),
            TraceEvent::RunFailed { message, .. } => format!("RunFailed message={message}"),
            TraceEvent::RunFinished {
                success,
                elapsed_ms,
                ..
            } => format!(
                "RunFinished success={success} elapsed={:.2}s",
                *elapsed_ms as f64 / 1000.0
            ),
        };
        format!("{} {body}", self.ts_ms())
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Trace {
    pub fn new(signature: Option<String>) -> Self {
        Self {
            signature,
            events: Vec::new(),
            run_started_ms: Utc::now().timestamp_millis(),
        }
    }

    fn push(&mut self, event: impl FnOnce(i64) -> TraceEvent) {
        self.events.push(event(Utc::now().timestamp_millis()));
    }

    pub fn run_started(&mut self, step_count: usize) {
        self.run_started_ms = Utc::now().timestamp_millis();
        let ts_ms = self.run_started_ms;
        self.events.push(TraceEvent::RunStarted { ts_ms, step_count });
    }

    pub fn step_started(&mut self, step_id: &str, step_type: &str) {
        self.push(|ts_ms| TraceEvent::StepStarted {
            ts_ms,
            step_id: step_id.to_string(),
            step_type: step_type.to_string(),
        });
    }

    pub fn prompt_assembled(&mut self, step_id: &str, prompt_hash: &str) {
        self.push(|ts_ms| TraceEvent::PromptAssembled {
            ts_ms,
            step_id: step_id.to_string(),
            prompt_hash: prompt_hash.to_string(),
        });
    }

    pub fn step_finished(&mut self, step_id: &str, success: bool) {
        self.push(|ts_ms| TraceEvent::StepFinished {
            ts_ms,
            step_id: step_id.to_string(),
            success,
        });
    }

    pub fn run_failed(&mut self, message: &str) {
        self.push(|ts_ms| TraceEvent::RunFailed {
            ts_ms,
            message: message.to_string(),
        });
    }

    pub fn run_finished(&mut self, success: bool) {
        let started = self.run_started_ms;
        self.push(|ts_ms| TraceEvent::RunFinished {
            ts_ms,
            success,
            elapsed_ms: (ts_ms - started).max(0),
        });
    }
}

/// Print a human-readable trace to stdout (one event per line).
pub fn print_trace(tr: &Trace) {
    println!(
        "TRACE signature={}",
        tr.signature.as_deref().unwrap_or("<unsigned>")
    );
    for ev in &tr.events {
        println!("{}", ev.summarize());
    }
}
