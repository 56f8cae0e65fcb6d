//! Subprocess doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::builder::{CommandRunner, Invocation, ProcessExit};

/// Records every invocation and replays queued outcomes, exiting 0 once the
/// queue is empty.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    outcomes: Mutex<VecDeque<std::io::Result<ProcessExit>>>,
    calls: Mutex<Vec<Invocation>>,
    launch_fails: bool,
}

impl ScriptedRunner {
    pub(crate) fn with_exits(codes: impl IntoIterator<Item = Option<i32>>) -> Self {
        Self {
            outcomes: Mutex::new(
                codes
                    .into_iter()
                    .map(|code| Ok(ProcessExit { code }))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub(crate) fn failing_launch() -> Self {
        Self {
            launch_fails: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessExit> {
        self.calls.lock().expect("calls lock").push(invocation.clone());
        if self.launch_fails {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: not found", invocation.program),
            ));
        }
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or(Ok(ProcessExit { code: Some(0) }))
    }
}

/// Never finishes, for exercising timeouts.
pub(crate) struct HangingRunner;

#[async_trait]
impl CommandRunner for HangingRunner {
    async fn run(&self, _invocation: &Invocation) -> std::io::Result<ProcessExit> {
        std::future::pending().await
    }
}
