//! The watch/announce cycle.
//!
//! Each pass polls every source in configuration order. A non-empty batch is
//! announced as a summary line followed by one line per commit, oldest first.
//! Batches larger than the threshold get a fixed pause between consecutive
//! commit lines so the network's flood protection does not kick in.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AnnounceConfig;
use crate::error::IrcError;
use crate::irc::Connection;
use crate::watch::{Commit, CommitSource};

use super::format::{batch_summary, commit_line};
use super::stop::StopSignal;

/// Destination for announcement lines.
pub trait ChannelSink {
    fn send_to_channel(&self, text: &str) -> Result<(), IrcError>;
}

impl ChannelSink for Connection {
    fn send_to_channel(&self, text: &str) -> Result<(), IrcError> {
        Connection::send_to_channel(self, text)
    }
}

impl<T: ChannelSink + ?Sized> ChannelSink for Arc<T> {
    fn send_to_channel(&self, text: &str) -> Result<(), IrcError> {
        (**self).send_to_channel(text)
    }
}

/// Takes a rate-limit pause; returns `true` when the loop should stop instead.
type Pause = Box<dyn Fn(&StopSignal, Duration) -> bool + Send>;

pub struct Orchestrator<S, W> {
    sink: S,
    sources: Vec<W>,
    settings: AnnounceConfig,
    pause: Pause,
}

impl<S: ChannelSink, W: CommitSource> Orchestrator<S, W> {
    pub fn new(sink: S, sources: Vec<W>, settings: AnnounceConfig) -> Self {
        Orchestrator {
            sink,
            sources,
            settings,
            pause: Box::new(|stop, delay| stop.wait(delay)),
        }
    }

    /// Replace how rate-limit pauses are taken (tests record instead of sleeping).
    pub fn with_pause(
        mut self,
        pause: impl Fn(&StopSignal, Duration) -> bool + Send + 'static,
    ) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn sources(&self) -> &[W] {
        &self.sources
    }

    /// Poll until `stop` is requested.
    ///
    /// # Errors
    ///
    /// Returns the first send failure; the connection is then unusable and
    /// the process should exit.
    pub fn run(&mut self, stop: &StopSignal) -> Result<(), IrcError> {
        tracing::info!(
            "watching {} repositories every {:?}",
            self.sources.len(),
            self.settings.poll_interval()
        );
        while !stop.is_requested() {
            self.poll_once(stop)?;
            if stop.wait(self.settings.poll_interval()) {
                break;
            }
        }
        Ok(())
    }

    /// One full pass over every source. Returns the number of commit lines
    /// sent.
    ///
    /// A stop request abandons the pass: remaining sources are not polled and
    /// the rest of the current batch is not sent.
    pub fn poll_once(&mut self, stop: &StopSignal) -> Result<usize, IrcError> {
        let mut announced = 0;
        for idx in 0..self.sources.len() {
            if stop.is_requested() {
                break;
            }
            let source = &mut self.sources[idx];
            let commits = match source.get_new_commits() {
                Ok(commits) => commits,
                Err(e) => {
                    tracing::error!("{}: skipping this pass: {}", source.name(), e);
                    continue;
                }
            };
            if commits.is_empty() || stop.is_requested() {
                continue;
            }
            let name = source.name().to_string();
            announced += self.announce(&name, &commits, stop)?;
        }
        Ok(announced)
    }

    /// Send one batch: summary, then each commit in order.
    ///
    /// Returns the number of commit lines sent, which is short of the batch
    /// when `stop` was requested part way.
    pub fn announce(
        &self,
        name: &str,
        commits: &[Commit],
        stop: &StopSignal,
    ) -> Result<usize, IrcError> {
        tracing::info!("{} new commits found for {}", commits.len(), name);
        self.sink
            .send_to_channel(&batch_summary(name, commits.len()))?;

        let rate_limited = commits.len() > self.settings.rate_limit_threshold;
        for (i, commit) in commits.iter().enumerate() {
            let stopping = if rate_limited && i > 0 {
                (self.pause)(stop, self.settings.rate_limit_delay())
            } else {
                stop.is_requested()
            };
            if stopping {
                tracing::info!("{}: abandoning batch after {} of {}", name, i, commits.len());
                return Ok(i);
            }
            self.sink.send_to_channel(&commit_line(name, commit))?;
        }
        Ok(commits.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::format::strip_formatting;
    use crate::announce::StopReason;
    use crate::error::WatchError;
    use git2::Oid;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
        fail_after: Option<usize>,
    }

    impl ChannelSink for Recorder {
        fn send_to_channel(&self, text: &str) -> Result<(), IrcError> {
            let mut lines = self.lines.lock();
            if self.fail_after.is_some_and(|n| lines.len() >= n) {
                return Err(IrcError::Closed);
            }
            lines.push(strip_formatting(text));
            Ok(())
        }
    }

    struct Scripted {
        name: String,
        polls: VecDeque<Result<Vec<Commit>, WatchError>>,
    }

    impl Scripted {
        fn new(name: &str, polls: Vec<Result<Vec<Commit>, WatchError>>) -> Self {
            Scripted {
                name: name.to_string(),
                polls: polls.into(),
            }
        }
    }

    impl CommitSource for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn get_new_commits(&mut self) -> Result<Vec<Commit>, WatchError> {
            self.polls.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn commits(n: usize) -> Vec<Commit> {
        (0..n)
            .map(|i| Commit {
                id: Oid::zero(),
                short_id: format!("{:08x}", i),
                summary: format!("change {}", i),
                author: "dev".into(),
                timestamp: 1_700_000_000 + i as i64,
                offset_minutes: 0,
                insertions: i,
                deletions: 0,
            })
            .collect()
    }

    fn counting_pauses<S: ChannelSink, W: CommitSource>(
        orch: Orchestrator<S, W>,
    ) -> (Orchestrator<S, W>, Arc<Mutex<Vec<Duration>>>) {
        let taken = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&taken);
        let orch = orch.with_pause(move |stop, d| {
            sink.lock().push(d);
            stop.is_requested()
        });
        (orch, taken)
    }

    #[test]
    fn batch_of_six_pauses_five_times() {
        let orch = Orchestrator::new(
            Recorder::default(),
            Vec::<Scripted>::new(),
            AnnounceConfig::default(),
        );
        let (orch, taken) = counting_pauses(orch);
        assert_eq!(orch.announce("p", &commits(6), &StopSignal::new()).unwrap(), 6);
        let taken = taken.lock();
        assert_eq!(taken.len(), 5);
        assert!(taken.iter().all(|d| *d == Duration::from_secs(1)));
    }

    #[test]
    fn batch_of_five_is_not_rate_limited() {
        let orch = Orchestrator::new(
            Recorder::default(),
            Vec::<Scripted>::new(),
            AnnounceConfig::default(),
        );
        let (orch, taken) = counting_pauses(orch);
        assert_eq!(orch.announce("p", &commits(5), &StopSignal::new()).unwrap(), 5);
        assert!(taken.lock().is_empty());
    }

    #[test]
    fn summary_precedes_commits_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut orch = Orchestrator::new(
            Arc::clone(&recorder),
            vec![
                Scripted::new("alpha", vec![Ok(commits(2))]),
                Scripted::new("beta", vec![Ok(Vec::new())]),
                Scripted::new("gamma", vec![Ok(commits(1))]),
            ],
            AnnounceConfig::default(),
        );
        assert_eq!(orch.poll_once(&StopSignal::new()).unwrap(), 3);

        let lines = recorder.lines.lock().clone();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "alpha (2)");
        assert!(lines[1].starts_with("alpha ") && lines[1].contains("change 0"));
        assert!(lines[2].starts_with("alpha ") && lines[2].contains("change 1"));
        assert_eq!(lines[3], "gamma (1)");
        assert!(lines[4].contains("00000000 change 0 (+0 -0)"));
    }

    #[test]
    fn empty_pass_sends_nothing() {
        let recorder = Arc::new(Recorder::default());
        let mut orch = Orchestrator::new(
            Arc::clone(&recorder),
            vec![Scripted::new("alpha", vec![])],
            AnnounceConfig::default(),
        );
        assert_eq!(orch.poll_once(&StopSignal::new()).unwrap(), 0);
        assert!(recorder.lines.lock().is_empty());
    }

    #[test]
    fn watcher_error_skips_only_that_repository() {
        let recorder = Arc::new(Recorder::default());
        let broken = Err(WatchError::Git(git2::Error::from_str("clone unreadable")));
        let mut orch = Orchestrator::new(
            Arc::clone(&recorder),
            vec![
                Scripted::new("broken", vec![broken]),
                Scripted::new("fine", vec![Ok(commits(1))]),
            ],
            AnnounceConfig::default(),
        );
        assert_eq!(orch.poll_once(&StopSignal::new()).unwrap(), 1);
        assert_eq!(recorder.lines.lock()[0], "fine (1)");
    }

    #[test]
    fn sink_failure_ends_the_pass() {
        let recorder = Arc::new(Recorder {
            lines: Mutex::new(Vec::new()),
            fail_after: Some(1),
        });
        let mut orch = Orchestrator::new(
            Arc::clone(&recorder),
            vec![Scripted::new("alpha", vec![Ok(commits(3))])],
            AnnounceConfig::default(),
        );
        assert!(matches!(orch.poll_once(&StopSignal::new()), Err(IrcError::Closed)));
        assert_eq!(recorder.lines.lock().len(), 1);
    }

    #[test]
    fn run_returns_once_stopped() {
        let stop = StopSignal::new();
        stop.request(StopReason::Interrupted);
        let recorder = Arc::new(Recorder::default());
        let mut orch = Orchestrator::new(
            Arc::clone(&recorder),
            vec![Scripted::new("alpha", vec![Ok(commits(1))])],
            AnnounceConfig::default(),
        );
        orch.run(&stop).unwrap();
        assert!(recorder.lines.lock().is_empty());
    }

    #[test]
    fn threshold_is_configurable() {
        let settings = AnnounceConfig {
            rate_limit_threshold: 1,
            rate_limit_delay_ms: 250,
            ..AnnounceConfig::default()
        };
        let orch = Orchestrator::new(Recorder::default(), Vec::<Scripted>::new(), settings);
        let (orch, taken) = counting_pauses(orch);
        assert_eq!(orch.announce("p", &commits(2), &StopSignal::new()).unwrap(), 2);
        assert_eq!(taken.lock().len(), 1);
        assert_eq!(taken.lock()[0], Duration::from_millis(250));
    }

    #[test]
    fn stop_during_pause_abandons_rest_of_batch() {
        let recorder = Arc::new(Recorder::default());
        let pauses = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&pauses);
        let mut orch = Orchestrator::new(
            Arc::clone(&recorder),
            vec![
                Scripted::new("alpha", vec![Ok(commits(30))]),
                Scripted::new("beta", vec![Ok(commits(2))]),
            ],
            AnnounceConfig::default(),
        )
        .with_pause(move |stop, _| {
            *counter.lock() += 1;
            stop.request(StopReason::Interrupted);
            stop.is_requested()
        });

        let stop = StopSignal::new();
        assert_eq!(orch.poll_once(&stop).unwrap(), 1);
        assert_eq!(*pauses.lock(), 1);
        assert_eq!(recorder.lines.lock().len(), 2);
        // The second source was never polled.
        assert_eq!(orch.sources()[1].polls.len(), 1);
    }

    #[test]
    fn stopped_pass_polls_nothing() {
        let stop = StopSignal::new();
        stop.request(StopReason::Interrupted);
        let mut orch = Orchestrator::new(
            Recorder::default(),
            vec![Scripted::new("alpha", vec![Ok(commits(3))])],
            AnnounceConfig::default(),
        );
        assert_eq!(orch.poll_once(&stop).unwrap(), 0);
        assert_eq!(orch.sources()[0].polls.len(), 1);
    }

    #[test]
    fn rate_limit_pause_is_cut_short_by_stop() {
        let settings = AnnounceConfig {
            rate_limit_delay_ms: 60_000,
            ..AnnounceConfig::default()
        };
        let recorder = Arc::new(Recorder::default());
        let orch = Orchestrator::new(Arc::clone(&recorder), Vec::<Scripted>::new(), settings);

        let stop = Arc::new(StopSignal::new());
        let waker = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            waker.request(StopReason::Interrupted);
        });

        let started = std::time::Instant::now();
        assert_eq!(orch.announce("p", &commits(10), &stop).unwrap(), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
    }
}
