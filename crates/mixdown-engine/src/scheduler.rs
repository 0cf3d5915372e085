//! Automation scheduler.
//!
//! A single timer drives every playing clip's automation at the configured
//! rate. Each job belongs to one play session; it is dropped when the session
//! is cancelled, when the clip stops playing or when the clip reaches its end
//! marker.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clip::{Clip, ClipShared, StepOutcome};
use crate::voice::PlaySession;

struct Job {
    clip: Weak<ClipShared>,
    session: Arc<PlaySession>,
}

struct Jobs {
    list: Mutex<Vec<Arc<Job>>>,
}

impl Jobs {
    fn tick(&self) -> usize {
        let snapshot: Vec<Arc<Job>> = self.list.lock().clone();
        let mut finished = Vec::new();
        for job in &snapshot {
            let done = if job.session.is_cancelled() {
                true
            } else {
                match job.clip.upgrade() {
                    Some(shared) => Clip::from_shared(shared).automation_step(&job.session) == StepOutcome::Finished,
                    None => true,
                }
            };
            if done {
                finished.push(job.session.id());
            }
        }
        if !finished.is_empty() {
            trace!(count = finished.len(), "automation jobs finished");
            self.list
                .lock()
                .retain(|job| !finished.contains(&job.session.id()));
        }
        snapshot.len() - finished.len()
    }
}

/// Drives clip automation at a fixed cadence.
pub struct AutomationScheduler {
    jobs: Arc<Jobs>,
    period: Duration,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AutomationScheduler {
    /// Start a scheduler thread ticking every `period`.
    pub fn start(period: Duration) -> std::io::Result<Self> {
        let jobs = Arc::new(Jobs {
            list: Mutex::new(Vec::new()),
        });
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let worker = Arc::clone(&jobs);
        let thread = std::thread::Builder::new()
            .name("mixdown-automation".into())
            .spawn(move || {
                let ticker = tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            worker.tick();
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })?;
        debug!(period_ms = period.as_secs_f64() * 1000.0, "automation scheduler started");
        Ok(Self {
            jobs,
            period,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// A scheduler without a thread; automation advances only on `tick`.
    pub fn manual(period: Duration) -> Self {
        Self {
            jobs: Arc::new(Jobs {
                list: Mutex::new(Vec::new()),
            }),
            period,
            stop_tx: None,
            thread: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_threaded(&self) -> bool {
        self.thread.is_some()
    }

    pub(crate) fn register(&self, clip: Weak<ClipShared>, session: Arc<PlaySession>) {
        self.jobs.list.lock().push(Arc::new(Job { clip, session }));
    }

    /// Run one evaluation pass now. Returns the number of jobs still active.
    pub fn tick(&self) -> usize {
        self.jobs.tick()
    }

    pub fn active_jobs(&self) -> usize {
        self.jobs.list.lock().len()
    }

    /// Cancel every job.
    pub fn cancel_all(&self) {
        let jobs = std::mem::take(&mut *self.jobs.list.lock());
        for job in &jobs {
            job.session.cancel();
        }
    }
}

impl Drop for AutomationScheduler {
    fn drop(&mut self) {
        self.cancel_all();
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
