pub mod dds;
pub mod delivery;
pub mod external_program;
pub mod staging;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::oneshot;

    use crate::error::AppError;
    use crate::service::external_program::{Execution, ExecutionResult, ExternalProgramService};

    enum FakeOutcome {
        Complete(i32, &'static str),
        NeverComplete,
        LaunchFailure,
    }

    /// Runner that completes synchronously with a canned result, hangs
    /// forever, or refuses to launch. Every received command line is
    /// recorded so tests can assert on (non-)invocation.
    pub(crate) struct FakeRunner {
        outcome: FakeOutcome,
        commands: Mutex<Vec<Vec<String>>>,
        starts: AtomicUsize,
    }

    impl FakeRunner {
        fn new(outcome: FakeOutcome) -> Self {
            Self {
                outcome,
                commands: Mutex::new(Vec::new()),
                starts: AtomicUsize::new(0),
            }
        }

        pub(crate) fn succeeding_with(exit_code: i32, stdout: &'static str) -> Self {
            Self::new(FakeOutcome::Complete(exit_code, stdout))
        }

        pub(crate) fn never_completing() -> Self {
            Self::new(FakeOutcome::NeverComplete)
        }

        pub(crate) fn launch_failing() -> Self {
            Self::new(FakeOutcome::LaunchFailure)
        }

        pub(crate) fn commands(&self) -> Vec<Vec<String>> {
            self.commands.lock().unwrap().clone()
        }

        pub(crate) fn start_count(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ExternalProgramService for FakeRunner {
        async fn start(&self, cmd: &[String]) -> Result<Execution, AppError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.commands.lock().unwrap().push(cmd.to_vec());
            match self.outcome {
                FakeOutcome::LaunchFailure => {
                    Err(AppError::Launch("fake runner refused to launch".to_string()))
                }
                FakeOutcome::NeverComplete => {
                    let (tx, rx) = oneshot::channel();
                    // Keep the sender alive so the receiver waits forever.
                    std::mem::forget(tx);
                    Ok(Execution { pid: 4711, done: rx })
                }
                FakeOutcome::Complete(exit_code, stdout) => {
                    let (tx, rx) = oneshot::channel();
                    let _ = tx.send(ExecutionResult {
                        exit_code,
                        stdout: stdout.to_string(),
                        stderr: String::new(),
                    });
                    Ok(Execution { pid: 4711, done: rx })
                }
            }
        }
    }
}
