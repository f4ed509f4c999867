// Keeps the observed service status in step with in-flight batches.
// Lives on one thread; workers only send events back over a channel.

use super::brew::ServiceController;
use super::model::{BatchOperation, ServiceName, ServiceStatus};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Source of "now" for the settle deadline.
pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Receives every status change together with the busy flag.
pub trait StatusObserver {
    fn on_status_changed(&mut self, status: &ServiceStatus, busy: bool);
}

impl<F: FnMut(&ServiceStatus, bool)> StatusObserver for F {
    fn on_status_changed(&mut self, status: &ServiceStatus, busy: bool) {
        self(status, busy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// Another batch was still in flight; nothing was issued.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOrigin {
    Manual,
    Batch(u64),
}

#[derive(Debug)]
enum Event {
    CommandFinished { batch: u64 },
    StatusReady { status: ServiceStatus, origin: RefreshOrigin },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Dispatching { batch: u64, pending: usize },
    Settling { batch: u64, until: Instant },
    Refreshing { batch: u64 },
}

pub struct SyncCoordinator<O, C = SystemClock> {
    controller: ServiceController,
    clock: C,
    observer: O,
    settle_delay: Duration,
    status: ServiceStatus,
    phase: Phase,
    next_batch: u64,
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl<O: StatusObserver> SyncCoordinator<O> {
    pub fn new(controller: ServiceController, observer: O, settle_delay: Duration) -> Self {
        Self::with_clock(controller, observer, settle_delay, SystemClock)
    }
}

impl<O: StatusObserver, C: Clock> SyncCoordinator<O, C> {
    pub fn with_clock(
        controller: ServiceController,
        observer: O,
        settle_delay: Duration,
        clock: C,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            controller,
            clock,
            observer,
            settle_delay,
            status: ServiceStatus::default(),
            phase: Phase::Idle,
            next_batch: 0,
            tx,
            rx,
        }
    }

    /// Last known status. Not a live query.
    pub fn current_status(&self) -> ServiceStatus {
        self.status
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn formula(&self, name: ServiceName) -> &str {
        self.controller.formulae().get(name)
    }

    /// Queries status in the background. Allowed while busy; the latest
    /// answer to arrive wins.
    pub fn refresh(&mut self) {
        self.spawn_refresh(RefreshOrigin::Manual);
    }

    pub fn submit(&mut self, batch: BatchOperation) -> Submission {
        if self.is_busy() {
            warn!("Rejected batch of {} step(s): another batch is in flight", batch.len());
            return Submission::Rejected;
        }

        let id = self.next_batch;
        self.next_batch += 1;
        info!("Submitting batch {}: {:?}", id, batch.steps());

        self.phase = Phase::Dispatching {
            batch: id,
            pending: batch.len(),
        };
        self.notify();

        for &(action, name) in batch.steps() {
            let tx = self.tx.clone();
            self.controller.set_service_state(name, action, move || {
                let _ = tx.send(Event::CommandFinished { batch: id });
            });
        }

        if batch.is_empty() {
            self.begin_settle(id);
        }
        Submission::Accepted
    }

    /// Applies every completion received so far and fires the post-batch
    /// refresh once the settle delay has passed.
    pub fn pump(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
        }
        self.check_settled();
    }

    /// Waits up to `timeout` for one completion, then pumps. Returns whether
    /// anything arrived.
    pub fn wait_event(&mut self, timeout: Duration) -> bool {
        let received = match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            // We hold a sender ourselves, so this never happens.
            Err(RecvTimeoutError::Disconnected) => false,
        };
        self.pump();
        received
    }

    pub fn run_until_idle(&mut self, tick: Duration) {
        self.pump();
        while self.is_busy() {
            self.wait_event(tick);
        }
    }

    /// Stops every service in order, blocking until each command exits.
    pub fn shutdown(&self) {
        info!("Stopping all services before exit");
        for &(action, name) in BatchOperation::stop_all().steps() {
            self.controller.set_service_state_blocking(name, action);
        }
    }

    fn spawn_refresh(&self, origin: RefreshOrigin) {
        let tx = self.tx.clone();
        self.controller.query_status(move |status| {
            let _ = tx.send(Event::StatusReady { status, origin });
        });
    }

    fn begin_settle(&mut self, batch: u64) {
        self.phase = Phase::Settling {
            batch,
            until: self.clock.now() + self.settle_delay,
        };
        self.check_settled();
    }

    fn check_settled(&mut self) {
        if let Phase::Settling { batch, until } = self.phase {
            if self.clock.now() >= until {
                debug!("Batch {} settled, refreshing status", batch);
                self.phase = Phase::Refreshing { batch };
                self.spawn_refresh(RefreshOrigin::Batch(batch));
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::CommandFinished { batch } => match self.phase {
                Phase::Dispatching { batch: current, pending } if current == batch => {
                    let pending = pending.saturating_sub(1);
                    if pending == 0 {
                        self.begin_settle(batch);
                    } else {
                        self.phase = Phase::Dispatching { batch, pending };
                    }
                }
                _ => debug!("Ignoring stray completion for batch {}", batch),
            },
            Event::StatusReady { status, origin } => {
                self.status = status;
                self.notify();

                if let RefreshOrigin::Batch(batch) = origin {
                    if self.phase == (Phase::Refreshing { batch }) {
                        info!("Batch {} complete", batch);
                        self.phase = Phase::Idle;
                        self.notify();
                    }
                }
            }
        }
    }

    fn notify(&mut self) {
        let busy = self.is_busy();
        self.observer.on_status_changed(&self.status, busy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::brew::ServiceManager;
    use crate::app::model::{Action, Formulae};
    use anyhow::Result;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    const WAIT: Duration = Duration::from_secs(5);

    /// Pretends to be brew: remembers what it was told and lists accordingly.
    #[derive(Default)]
    struct FakeBrew {
        running: Mutex<HashSet<String>>,
        calls: Mutex<Vec<(Action, String)>>,
        lists: Mutex<usize>,
    }

    impl FakeBrew {
        fn calls(&self) -> Vec<(Action, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn lists(&self) -> usize {
            *self.lists.lock().unwrap()
        }
    }

    impl ServiceManager for FakeBrew {
        fn set_state(&self, formula: &str, action: Action) -> Result<()> {
            self.calls.lock().unwrap().push((action, formula.to_string()));
            let mut running = self.running.lock().unwrap();
            match action {
                Action::Start => running.insert(formula.to_string()),
                Action::Stop => running.remove(formula),
            };
            Ok(())
        }

        fn list(&self) -> Result<String> {
            *self.lists.lock().unwrap() += 1;
            let running = self.running.lock().unwrap();
            Ok(["mariadb", "nginx", "php@8.3"]
                .iter()
                .map(|f| {
                    let state = if running.contains(*f) { "started" } else { "none" };
                    format!("{} {}\n", f, state)
                })
                .collect())
        }
    }

    #[derive(Clone)]
    struct ManualClock(Rc<Cell<Instant>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Rc::new(Cell::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.0.get()
        }
    }

    type Seen = Rc<RefCell<Vec<(ServiceStatus, bool)>>>;

    fn coordinator(
        brew: &Arc<FakeBrew>,
        settle: Duration,
        clock: ManualClock,
    ) -> (SyncCoordinator<impl StatusObserver, ManualClock>, Seen) {
        let seen: Seen = Rc::default();
        let sink = seen.clone();
        let observer = move |status: &ServiceStatus, busy: bool| {
            sink.borrow_mut().push((*status, busy));
        };
        let controller = ServiceController::new(brew.clone(), Formulae::default());
        (
            SyncCoordinator::with_clock(controller, observer, settle, clock),
            seen,
        )
    }

    fn drain_until_idle<O: StatusObserver>(coordinator: &mut SyncCoordinator<O, ManualClock>) {
        let deadline = Instant::now() + WAIT;
        while coordinator.is_busy() {
            assert!(Instant::now() < deadline, "batch never finished");
            coordinator.wait_event(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_toggle_web_starts_web_and_runtime_then_refreshes() {
        let brew = Arc::new(FakeBrew::default());
        let (mut coordinator, seen) = coordinator(&brew, Duration::ZERO, ManualClock::new());

        let batch = BatchOperation::toggle(ServiceName::Web, &coordinator.current_status());
        assert_eq!(coordinator.submit(batch), Submission::Accepted);
        assert!(coordinator.is_busy());
        // Observer hears about busy before anything completes.
        assert_eq!(seen.borrow()[0], (ServiceStatus::default(), true));

        drain_until_idle(&mut coordinator);

        let mut calls = brew.calls();
        calls.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(
            calls,
            vec![
                (Action::Start, "nginx".to_string()),
                (Action::Start, "php@8.3".to_string())
            ]
        );
        assert_eq!(brew.lists(), 1);

        let status = coordinator.current_status();
        assert!(status.is_running(ServiceName::Web));
        assert!(status.is_running(ServiceName::Runtime));
        assert!(!status.is_running(ServiceName::Database));

        let seen = seen.borrow();
        assert_eq!(seen.last(), Some(&(status, false)));
        assert!(seen[..seen.len() - 1].iter().all(|(_, busy)| *busy));
    }

    #[test]
    fn test_second_submit_while_busy_is_rejected() {
        let brew = Arc::new(FakeBrew::default());
        let (mut coordinator, _seen) = coordinator(&brew, Duration::ZERO, ManualClock::new());

        assert_eq!(coordinator.submit(BatchOperation::stop_all()), Submission::Accepted);
        assert_eq!(coordinator.submit(BatchOperation::stop_all()), Submission::Rejected);

        drain_until_idle(&mut coordinator);

        assert_eq!(brew.calls().len(), 3);
        assert_eq!(brew.lists(), 1);
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn test_refresh_waits_for_settle_delay() {
        let brew = Arc::new(FakeBrew::default());
        let clock = ManualClock::new();
        let settle = Duration::from_millis(500);
        let (mut coordinator, _seen) = coordinator(&brew, settle, clock.clone());

        coordinator.submit(BatchOperation::start_all());
        let deadline = Instant::now() + WAIT;
        while coordinator.is_dispatching() {
            assert!(Instant::now() < deadline, "commands never finished");
            coordinator.wait_event(Duration::from_millis(20));
        }
        coordinator.pump();
        assert_eq!(brew.lists(), 0);
        assert!(coordinator.is_busy());

        clock.advance(Duration::from_millis(499));
        coordinator.pump();
        assert_eq!(brew.lists(), 0);

        clock.advance(Duration::from_millis(1));
        drain_until_idle(&mut coordinator);
        assert_eq!(brew.lists(), 1);
        assert!(coordinator.current_status().iter().all(|(_, running)| running));
    }

    #[test]
    fn test_empty_batch_still_refreshes() {
        let brew = Arc::new(FakeBrew::default());
        let (mut coordinator, _seen) = coordinator(&brew, Duration::ZERO, ManualClock::new());

        assert_eq!(coordinator.submit(BatchOperation::default()), Submission::Accepted);
        drain_until_idle(&mut coordinator);
        assert_eq!(brew.lists(), 1);
        assert!(brew.calls().is_empty());
    }

    #[test]
    fn test_manual_refresh_updates_status_without_touching_busy() {
        let brew = Arc::new(FakeBrew::default());
        brew.running.lock().unwrap().insert("mariadb".to_string());
        let (mut coordinator, seen) = coordinator(&brew, Duration::ZERO, ManualClock::new());

        coordinator.refresh();
        assert!(coordinator.wait_event(WAIT));

        assert!(coordinator.current_status().is_running(ServiceName::Database));
        assert!(!coordinator.is_busy());
        assert_eq!(seen.borrow().len(), 1);
        assert!(!seen.borrow()[0].1);
    }

    #[test]
    fn test_manual_refresh_during_batch_keeps_busy() {
        let brew = Arc::new(FakeBrew::default());
        let clock = ManualClock::new();
        let (mut coordinator, seen) = coordinator(&brew, Duration::from_secs(1), clock.clone());

        coordinator.submit(BatchOperation::toggle(ServiceName::Database, &ServiceStatus::default()));
        coordinator.refresh();

        let deadline = Instant::now() + WAIT;
        while brew.lists() < 1 || seen.borrow().len() < 2 || coordinator.is_dispatching() {
            assert!(Instant::now() < deadline, "manual refresh never arrived");
            coordinator.wait_event(Duration::from_millis(20));
        }
        assert!(coordinator.is_busy());
        assert!(seen.borrow().iter().all(|(_, busy)| *busy));

        clock.advance(Duration::from_secs(1));
        drain_until_idle(&mut coordinator);
        assert!(coordinator.current_status().is_running(ServiceName::Database));
    }

    #[test]
    fn test_shutdown_stops_everything_in_order() {
        let brew = Arc::new(FakeBrew::default());
        let (coordinator, seen) = coordinator(&brew, Duration::ZERO, ManualClock::new());

        coordinator.shutdown();

        assert_eq!(
            brew.calls(),
            vec![
                (Action::Stop, "mariadb".to_string()),
                (Action::Stop, "nginx".to_string()),
                (Action::Stop, "php@8.3".to_string())
            ]
        );
        assert!(seen.borrow().is_empty());
    }

    impl<O: StatusObserver> SyncCoordinator<O, ManualClock> {
        /// True while the coordinator is still dispatching commands.
        fn is_dispatching(&self) -> bool {
            matches!(self.phase, Phase::Dispatching { .. })
        }
    }
}
