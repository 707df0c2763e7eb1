//! Run polling with a deadline

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::assistant::{AssistantApi, Run, RunStatus};
use crate::config::PollerConfig;
use crate::{Error, Result};

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The provider gave up; carries its reason when one was reported
    Failed { reason: Option<String> },
}

/// Polls a run at a fixed interval until it is terminal or the timeout passes
#[derive(Debug, Clone, Copy)]
pub struct RunPoller {
    interval: Duration,
    timeout: Duration,
}

impl Default for RunPoller {
    fn default() -> Self {
        Self::from_config(&PollerConfig::default())
    }
}

impl RunPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(config.interval(), config.timeout())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for `run` to finish
    ///
    /// Transient poll errors are retried until the deadline; any other error
    /// is returned as is. A run still active at the deadline is cancelled
    /// so its session accepts new messages. Dropping the future stops polling.
    pub async fn wait(&self, api: &dyn AssistantApi, session_id: &str, run: Run) -> Result<RunOutcome> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut run = run;
        let mut polls = 0u32;

        loop {
            match run.status {
                RunStatus::Completed => {
                    debug!("Run {} completed after {} polls", run.id, polls);
                    return Ok(RunOutcome::Completed);
                }
                RunStatus::Failed => {
                    warn!("Run {} failed: {:?}", run.id, run.last_error);
                    return Ok(RunOutcome::Failed {
                        reason: run.last_error,
                    });
                }
                RunStatus::Pending | RunStatus::Running => {}
            }

            if Instant::now() + self.interval > deadline {
                if let Err(e) = api.cancel_run(session_id, &run.id).await {
                    warn!("Cancelling run {} failed: {}", run.id, e);
                }
                return Err(Error::RunTimeout {
                    run_id: run.id,
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.interval).await;
            polls += 1;

            match api.get_run_status(session_id, &run.id).await {
                Ok(latest) => run = latest,
                Err(e) if e.is_transient() => {
                    warn!("Polling run {} failed, retrying: {}", run.id, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers status polls from a script; repeats the last entry forever
    struct ScriptedRuns {
        script: Mutex<VecDeque<Result<RunStatus>>>,
        polls: Mutex<u32>,
        cancelled: Mutex<Vec<String>>,
        fail_cancel: bool,
    }

    impl ScriptedRuns {
        fn new(script: Vec<Result<RunStatus>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                polls: Mutex::new(0),
                cancelled: Mutex::new(Vec::new()),
                fail_cancel: false,
            }
        }

        fn cancelled(&self) -> Vec<String> {
            self.cancelled.lock().unwrap().clone()
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AssistantApi for ScriptedRuns {
        async fn create_session(&self) -> Result<String> {
            unreachable!()
        }

        async fn retrieve_session(&self, _: &str) -> Result<()> {
            unreachable!()
        }

        async fn post_message(&self, _: &str, _: Role, _: &str) -> Result<()> {
            unreachable!()
        }

        async fn start_run(&self, _: &str, _: &str) -> Result<Run> {
            unreachable!()
        }

        async fn get_run_status(&self, _: &str, run_id: &str) -> Result<Run> {
            *self.polls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front().unwrap() {
                    Ok(status) => Ok(*status),
                    Err(_) => Err(Error::TransientProvider("still down".into())),
                }
            };
            next.map(|status| Run::new(run_id, status))
        }

        async fn cancel_run(&self, _: &str, run_id: &str) -> Result<()> {
            self.cancelled.lock().unwrap().push(run_id.to_string());
            if self.fail_cancel {
                return Err(Error::Api("run already finished".into()));
            }
            Ok(())
        }

        async fn list_latest_message(&self, _: &str) -> Result<String> {
            unreachable!()
        }
    }

    fn fast_poller() -> RunPoller {
        RunPoller::new(Duration::from_millis(5), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_polls_until_completed() {
        let api = ScriptedRuns::new(vec![
            Ok(RunStatus::Pending),
            Ok(RunStatus::Running),
            Ok(RunStatus::Completed),
        ]);

        let outcome = fast_poller()
            .wait(&api, "thread_1", Run::new("run_1", RunStatus::Pending))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(api.polls(), 3);
    }

    #[tokio::test]
    async fn test_already_terminal_run_is_not_polled() {
        let api = ScriptedRuns::new(vec![Ok(RunStatus::Running)]);

        let outcome = fast_poller()
            .wait(&api, "thread_1", Run::new("run_1", RunStatus::Completed))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(api.polls(), 0);
    }

    #[tokio::test]
    async fn test_failed_run_is_a_sentinel() {
        let api = ScriptedRuns::new(vec![Ok(RunStatus::Failed)]);

        let outcome = fast_poller()
            .wait(&api, "thread_1", Run::new("run_1", RunStatus::Pending))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Failed { reason: None });
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let api = ScriptedRuns::new(vec![
            Err(Error::TransientProvider("502".into())),
            Err(Error::TransientProvider("timeout".into())),
            Ok(RunStatus::Completed),
        ]);

        let outcome = fast_poller()
            .wait(&api, "thread_1", Run::new("run_1", RunStatus::Pending))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(api.polls(), 3);
    }

    #[tokio::test]
    async fn test_terminal_errors_propagate() {
        let api = ScriptedRuns::new(vec![
            Err(Error::Api("400 bad request".into())),
            Ok(RunStatus::Completed),
        ]);

        let err = fast_poller()
            .wait(&api, "thread_1", Run::new("run_1", RunStatus::Pending))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api(_)));
        assert_eq!(api.polls(), 1);
    }

    #[tokio::test]
    async fn test_times_out() {
        let api = ScriptedRuns::new(vec![Ok(RunStatus::Running)]);
        let poller = RunPoller::new(Duration::from_millis(10), Duration::from_millis(50));

        let err = poller
            .wait(&api, "thread_1", Run::new("run_9", RunStatus::Pending))
            .await
            .unwrap_err();

        match err {
            Error::RunTimeout { run_id, .. } => assert_eq!(run_id, "run_9"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(api.polls() <= 5);
        assert_eq!(api.cancelled(), vec!["run_9".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_failure_still_times_out() {
        let mut api = ScriptedRuns::new(vec![Ok(RunStatus::Running)]);
        api.fail_cancel = true;
        let poller = RunPoller::new(Duration::from_millis(10), Duration::from_millis(50));

        let err = poller
            .wait(&api, "thread_1", Run::new("run_2", RunStatus::Pending))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RunTimeout { .. }));
        assert_eq!(api.cancelled().len(), 1);
    }

    #[tokio::test]
    async fn test_finished_runs_are_not_cancelled() {
        let api = ScriptedRuns::new(vec![Ok(RunStatus::Failed)]);

        fast_poller()
            .wait(&api, "thread_1", Run::new("run_1", RunStatus::Pending))
            .await
            .unwrap();

        assert!(api.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_persistent_transient_errors_time_out() {
        let api = ScriptedRuns::new(vec![Err(Error::TransientProvider("down".into()))]);
        let poller = RunPoller::new(Duration::from_millis(10), Duration::from_millis(50));

        let err = poller
            .wait(&api, "thread_1", Run::new("run_1", RunStatus::Pending))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RunTimeout { .. }));
    }
}
