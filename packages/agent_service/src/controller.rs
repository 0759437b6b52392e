//! Drives an [`AgentWorker`] from the control requests of a [`ServiceHost`].
//!
//! A run goes `StartPending -> Running -> StopPending -> Stopped`. While running
//! the controller waits on two sources: control requests from the host and the
//! result of the worker's start routine. Whichever asks for shutdown first wins,
//! the shutdown path runs exactly once and the other source is no longer read.

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;

use crate::events::{EventLog, ServiceEvent};
use crate::host::ServiceHost;
use crate::state::{AcceptedCommands, ControlRequest, ServiceState, ServiceStatus};
use crate::worker::{AgentWorker, ConfigRecovery, NoRecovery};

pub struct ServiceController<W: AgentWorker, R: ConfigRecovery = NoRecovery> {
    service_name: String,
    worker: Arc<W>,
    recovery: R,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    Stop,
    Shutdown,
    WorkerFailed,
    HostDisconnected,
}

#[derive(Debug)]
pub struct ServiceExit<E> {
    pub trigger: ShutdownTrigger,
    /// Start error of the worker, also set when the error arrived after an
    /// external request had already started the shutdown.
    pub worker_error: Option<E>,
    /// The start routine ended without a result, most likely a panic.
    pub start_aborted: bool,
}

impl<E> ServiceExit<E> {
    pub fn is_failure(&self) -> bool {
        self.trigger == ShutdownTrigger::WorkerFailed || self.worker_error.is_some() || self.start_aborted
    }

    /// Service specific exit code reported to the host.
    pub fn exit_code(&self) -> u32 {
        if self.is_failure() { 1 } else { 0 }
    }
}

impl<W: AgentWorker> ServiceController<W, NoRecovery> {
    pub fn new<S: Into<String>>(service_name: S, worker: Arc<W>) -> Self {
        ServiceController::with_recovery(service_name, worker, NoRecovery)
    }
}

impl<W: AgentWorker, R: ConfigRecovery> ServiceController<W, R> {
    pub fn with_recovery<S: Into<String>>(service_name: S, worker: Arc<W>, recovery: R) -> Self {
        ServiceController {
            service_name: service_name.into(),
            worker,
            recovery,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Runs the service once, from `StartPending` until `Stopped` has been reported.
    pub async fn execute<H: ServiceHost, L: EventLog>(
        &self,
        mut requests: Receiver<ControlRequest>,
        host: &H,
        log: &L,
    ) -> ServiceExit<W::Error> {
        let mut status = StatusReporter::start_pending(host);

        if let Err(error) = self.recovery.import_legacy_config().await {
            tracing::warn!(%error, "failed to import legacy configuration, continuing with existing config");
            log.report(ServiceEvent::LegacyImportFailed, &error.to_string());
        }

        if let Err(error) = self.recovery.upgrade_config().await {
            tracing::warn!(%error, "failed to upgrade configuration, continuing with what we have");
            log.report(ServiceEvent::ConfigUpgradeFailed, &error.to_string());
        }

        /* single shot, fresh for every run */
        let (start_tx, mut start_rx) = oneshot::channel::<Result<(), W::Error>>();
        let worker = self.worker.clone();
        let start_task = tokio::spawn(async move {
            let _ = start_tx.send(worker.start().await);
        });

        status.transition(
            ServiceState::Running,
            AcceptedCommands::STOP | AcceptedCommands::SHUTDOWN,
        );
        log.report(ServiceEvent::ServiceStarted, &self.service_name);
        tracing::info!("initialization complete, starting event loop");

        let mut start_observed = false;
        let mut worker_error = None;
        let mut start_aborted = false;

        let trigger = loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(ControlRequest::Interrogate) => {
                        tracing::debug!("interrogated by service host");
                        status.echo();
                    }
                    Some(ControlRequest::Stop) => {
                        tracing::info!("received stop request from service host");
                        log.report(ServiceEvent::StopReceived, &self.service_name);
                        break ShutdownTrigger::Stop;
                    }
                    Some(ControlRequest::Shutdown) => {
                        tracing::info!("received shutdown request from service host");
                        log.report(ServiceEvent::ShutdownReceived, &self.service_name);
                        break ShutdownTrigger::Shutdown;
                    }
                    Some(request @ ControlRequest::Other(_)) => {
                        tracing::warn!(%request, "unexpected control request");
                        log.report(ServiceEvent::UnexpectedControl, &request.to_string());
                    }
                    None => {
                        tracing::warn!("service host closed the control channel");
                        break ShutdownTrigger::HostDisconnected;
                    }
                },
                result = &mut start_rx, if !start_observed => {
                    start_observed = true;

                    match result {
                        Ok(Ok(())) => tracing::info!("agent started"),
                        Ok(Err(error)) => {
                            tracing::error!(%error, "failed to start agent");
                            log.report(ServiceEvent::WorkerStartFailed, &error.to_string());
                            log.report(ServiceEvent::WorkerStopSignal, &self.service_name);
                            worker_error = Some(error);
                            break ShutdownTrigger::WorkerFailed;
                        }
                        Err(_) => {
                            tracing::error!("agent start task ended without a result");
                            log.report(ServiceEvent::WorkerStartFailed, "start task ended without a result");
                            log.report(ServiceEvent::WorkerStopSignal, &self.service_name);
                            start_aborted = true;
                            break ShutdownTrigger::WorkerFailed;
                        }
                    }
                }
            }
        };

        tracing::info!(?trigger, "initiating service shutdown");
        status.transition(ServiceState::StopPending, AcceptedCommands::NONE);

        self.worker.stop().await;

        if let Err(error) = start_task.await {
            tracing::error!(?error, "agent start task failed");

            if !start_observed {
                log.report(ServiceEvent::WorkerStartFailed, "start task ended without a result");
                start_aborted = true;
            }
        }

        if !start_observed {
            if let Ok(Err(error)) = start_rx.try_recv() {
                tracing::error!(%error, "agent failed to start before shutdown completed");
                log.report(ServiceEvent::WorkerStartFailed, &error.to_string());
                worker_error = Some(error);
            }
        }

        status.transition(ServiceState::Stopped, AcceptedCommands::NONE);

        ServiceExit {
            trigger,
            worker_error,
            start_aborted,
        }
    }
}

/// Reports statuses to the host, refusing anything that would move the run
/// backwards or report a state twice.
struct StatusReporter<'a, H: ServiceHost> {
    host: &'a H,
    current: ServiceStatus,
}

impl<'a, H: ServiceHost> StatusReporter<'a, H> {
    fn start_pending(host: &'a H) -> Self {
        let current = ServiceStatus::new(ServiceState::StartPending);
        host.report_status(current);
        StatusReporter { host, current }
    }

    fn transition(&mut self, state: ServiceState, accepts: AcceptedCommands) {
        if !self.current.state.can_transition_to(state) {
            tracing::error!(from = %self.current.state, to = %state, "refusing invalid service state transition");
            return;
        }

        self.current = ServiceStatus::accepting(state, accepts);
        self.host.report_status(self.current);
    }

    fn echo(&self) {
        self.host.report_status(self.current);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;
    use tokio::sync::mpsc::{self, Sender};

    use super::*;

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, Clone, Copy)]
    enum StartBehavior {
        Succeed,
        Fail,
        RunUntilStopped,
        FailWhenStopped,
        PanicWhenStopped,
        /* finishes on its own, without looking at stop */
        SucceedAfter(Duration),
    }

    struct TestWorker {
        behavior: StartBehavior,
        journal: Journal,
        starts: AtomicUsize,
        stops: AtomicUsize,
        stop_requested: Notify,
    }

    impl TestWorker {
        fn new(behavior: StartBehavior, journal: Journal) -> Arc<Self> {
            Arc::new(TestWorker {
                behavior,
                journal,
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                stop_requested: Notify::new(),
            })
        }
    }

    impl AgentWorker for TestWorker {
        type Error = String;

        async fn start(&self) -> Result<(), String> {
            self.starts.fetch_add(1, Ordering::SeqCst);

            match self.behavior {
                StartBehavior::Succeed => Ok(()),
                StartBehavior::Fail => Err("boom".to_string()),
                StartBehavior::RunUntilStopped => {
                    self.stop_requested.notified().await;
                    Ok(())
                }
                StartBehavior::FailWhenStopped => {
                    self.stop_requested.notified().await;
                    Err("interrupted".to_string())
                }
                StartBehavior::PanicWhenStopped => {
                    self.stop_requested.notified().await;
                    panic!("agent crashed while stopping");
                }
                StartBehavior::SucceedAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    self.journal.lock().unwrap().push("worker:started".to_string());
                    Ok(())
                }
            }
        }

        async fn stop(&self) {
            self.journal.lock().unwrap().push("worker:stop".to_string());
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stop_requested.notify_one();
            self.journal.lock().unwrap().push("worker:stopped".to_string());
        }
    }

    struct RecordingHost {
        journal: Journal,
        statuses: Mutex<Vec<ServiceStatus>>,
    }

    impl RecordingHost {
        fn new(journal: Journal) -> Self {
            RecordingHost {
                journal,
                statuses: Mutex::new(Vec::new()),
            }
        }

        fn states(&self) -> Vec<ServiceState> {
            self.statuses.lock().unwrap().iter().map(|s| s.state).collect()
        }
    }

    impl ServiceHost for RecordingHost {
        type Error = std::convert::Infallible;

        fn connect(&mut self, _service_name: &str) -> Result<Receiver<ControlRequest>, Self::Error> {
            unreachable!("controller tests pass the request channel directly")
        }

        fn report_status(&self, status: ServiceStatus) {
            self.journal.lock().unwrap().push(format!("status:{}", status.state));
            self.statuses.lock().unwrap().push(status);
        }
    }

    #[derive(Default)]
    struct RecordingLog {
        events: Mutex<Vec<(ServiceEvent, String)>>,
    }

    impl RecordingLog {
        fn events(&self) -> Vec<ServiceEvent> {
            self.events.lock().unwrap().iter().map(|(e, _)| *e).collect()
        }

        fn count(&self, event: ServiceEvent) -> usize {
            self.events().iter().filter(|e| **e == event).count()
        }
    }

    impl EventLog for RecordingLog {
        fn report(&self, event: ServiceEvent, detail: &str) {
            self.events.lock().unwrap().push((event, detail.to_string()));
        }
    }

    struct FailingRecovery;

    impl ConfigRecovery for FailingRecovery {
        type Error = String;

        async fn import_legacy_config(&self) -> Result<(), String> {
            Err("legacy settings unreadable".to_string())
        }

        async fn upgrade_config(&self) -> Result<(), String> {
            Err("config file is read only".to_string())
        }
    }

    fn setup(behavior: StartBehavior) -> (Journal, Arc<TestWorker>, RecordingHost, RecordingLog) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let journal = Journal::default();
        let worker = TestWorker::new(behavior, journal.clone());
        let host = RecordingHost::new(journal.clone());
        (journal, worker, host, RecordingLog::default())
    }

    fn requests(sent: &[ControlRequest]) -> (Sender<ControlRequest>, Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(16);
        for request in sent {
            tx.try_send(*request).unwrap();
        }
        (tx, rx)
    }

    fn position(journal: &Journal, entry: &str) -> usize {
        journal.lock().unwrap().iter().position(|e| e == entry).unwrap()
    }

    #[tokio::test]
    async fn stop_request_stops_worker_once() {
        let (journal, worker, host, log) = setup(StartBehavior::Succeed);
        let (_tx, rx) = requests(&[
            ControlRequest::Interrogate,
            ControlRequest::Other(128),
            ControlRequest::Stop,
        ]);

        let controller = ServiceController::new("logship-agent", worker.clone());
        let exit = tokio::time::timeout(Duration::from_secs(5), controller.execute(rx, &host, &log))
            .await
            .unwrap();

        assert_eq!(exit.trigger, ShutdownTrigger::Stop);
        assert!(exit.worker_error.is_none());
        assert_eq!(exit.exit_code(), 0);

        assert_eq!(worker.starts.load(Ordering::SeqCst), 1);
        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);

        let states = host.states();
        assert_eq!(states.first(), Some(&ServiceState::StartPending));
        assert_eq!(states.last(), Some(&ServiceState::Stopped));
        assert_eq!(states.iter().filter(|s| **s == ServiceState::Stopped).count(), 1);
        assert_eq!(states.iter().filter(|s| **s == ServiceState::StopPending).count(), 1);

        assert!(position(&journal, "status:stop_pending") < position(&journal, "worker:stop"));
        assert!(position(&journal, "worker:stopped") < position(&journal, "status:stopped"));

        assert_eq!(log.count(ServiceEvent::StopReceived), 1);
        assert_eq!(log.count(ServiceEvent::UnexpectedControl), 1);
        assert_eq!(log.count(ServiceEvent::ServiceStarted), 1);
    }

    #[tokio::test]
    async fn running_status_declares_stop_and_shutdown() {
        let (_journal, worker, host, log) = setup(StartBehavior::Succeed);
        let (_tx, rx) = requests(&[ControlRequest::Shutdown]);

        let exit = ServiceController::new("logship-agent", worker)
            .execute(rx, &host, &log)
            .await;
        assert_eq!(exit.trigger, ShutdownTrigger::Shutdown);
        assert_eq!(log.count(ServiceEvent::ShutdownReceived), 1);

        let statuses = host.statuses.lock().unwrap().clone();
        assert_eq!(statuses[0], ServiceStatus::new(ServiceState::StartPending));
        assert_eq!(statuses[1].state, ServiceState::Running);
        assert_eq!(statuses[1].accepts, AcceptedCommands::STOP | AcceptedCommands::SHUTDOWN);
    }

    #[tokio::test]
    async fn interrogate_echoes_running_status() {
        let (_journal, worker, host, log) = setup(StartBehavior::RunUntilStopped);
        let (tx, rx) = requests(&[ControlRequest::Interrogate, ControlRequest::Interrogate]);

        let controller = ServiceController::new("logship-agent", worker);
        let run = controller.execute(rx, &host, &log);
        tokio::pin!(run);

        /* nothing asks for shutdown yet, the run keeps going */
        assert!(tokio::time::timeout(Duration::from_millis(100), &mut run).await.is_err());
        assert_eq!(
            host.states(),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::Running,
                ServiceState::Running,
            ]
        );

        tx.send(ControlRequest::Stop).await.unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap();
        assert_eq!(exit.trigger, ShutdownTrigger::Stop);
        assert_eq!(host.states().last(), Some(&ServiceState::Stopped));
    }

    #[tokio::test]
    async fn worker_start_failure_stops_service_without_host_request() {
        let (journal, worker, host, log) = setup(StartBehavior::Fail);

        /* sender kept alive, the host never sends anything */
        let (_tx, rx) = requests(&[]);

        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            ServiceController::new("logship-agent", worker.clone()).execute(rx, &host, &log),
        )
        .await
        .unwrap();

        assert_eq!(exit.trigger, ShutdownTrigger::WorkerFailed);
        assert_eq!(exit.worker_error.as_deref(), Some("boom"));
        assert_eq!(exit.exit_code(), 1);

        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);
        assert_eq!(
            host.states(),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::StopPending,
                ServiceState::Stopped,
            ]
        );
        assert!(position(&journal, "status:stop_pending") < position(&journal, "worker:stop"));

        assert_eq!(log.count(ServiceEvent::WorkerStartFailed), 1);
        assert_eq!(log.count(ServiceEvent::WorkerStopSignal), 1);
        assert_eq!(log.count(ServiceEvent::StopReceived), 0);
    }

    #[tokio::test]
    async fn start_error_after_stop_request_is_observed_once() {
        let (_journal, worker, host, log) = setup(StartBehavior::FailWhenStopped);
        let (_tx, rx) = requests(&[ControlRequest::Stop]);

        let exit = ServiceController::new("logship-agent", worker.clone())
            .execute(rx, &host, &log)
            .await;

        assert_eq!(exit.trigger, ShutdownTrigger::Stop);
        assert_eq!(exit.worker_error.as_deref(), Some("interrupted"));
        assert_eq!(exit.exit_code(), 1);
        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);
        assert_eq!(log.count(ServiceEvent::WorkerStartFailed), 1);
        assert_eq!(log.count(ServiceEvent::WorkerStopSignal), 0);
        assert_eq!(host.states().iter().filter(|s| **s == ServiceState::Stopped).count(), 1);
    }

    #[tokio::test]
    async fn slow_start_finishes_before_stopped_is_reported() {
        let (journal, worker, host, log) = setup(StartBehavior::SucceedAfter(Duration::from_millis(100)));
        let (_tx, rx) = requests(&[ControlRequest::Stop]);

        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            ServiceController::new("logship-agent", worker.clone()).execute(rx, &host, &log),
        )
        .await
        .unwrap();

        assert_eq!(exit.trigger, ShutdownTrigger::Stop);
        assert_eq!(exit.exit_code(), 0);
        assert_eq!(worker.starts.load(Ordering::SeqCst), 1);
        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);

        /* stop returned first, the start still completed while StopPending */
        assert!(position(&journal, "worker:stopped") < position(&journal, "worker:started"));
        assert!(position(&journal, "worker:started") < position(&journal, "status:stopped"));
        assert_eq!(journal.lock().unwrap().last().map(String::as_str), Some("status:stopped"));
        assert_eq!(host.states().iter().filter(|s| **s == ServiceState::Stopped).count(), 1);
        assert_eq!(log.count(ServiceEvent::WorkerStartFailed), 0);
    }

    #[tokio::test]
    async fn start_panic_after_stop_request_fails_the_run() {
        let (_journal, worker, host, log) = setup(StartBehavior::PanicWhenStopped);
        let (_tx, rx) = requests(&[ControlRequest::Stop]);

        let exit = ServiceController::new("logship-agent", worker.clone())
            .execute(rx, &host, &log)
            .await;

        assert_eq!(exit.trigger, ShutdownTrigger::Stop);
        assert!(exit.worker_error.is_none());
        assert!(exit.start_aborted);
        assert_eq!(exit.exit_code(), 1);
        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);
        assert_eq!(log.count(ServiceEvent::WorkerStartFailed), 1);
        assert_eq!(host.states().last(), Some(&ServiceState::Stopped));
    }

    #[tokio::test]
    async fn closed_control_channel_stops_worker() {
        let (_journal, worker, host, log) = setup(StartBehavior::RunUntilStopped);
        let (tx, rx) = requests(&[]);
        drop(tx);

        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            ServiceController::new("logship-agent", worker.clone()).execute(rx, &host, &log),
        )
        .await
        .unwrap();

        assert_eq!(exit.trigger, ShutdownTrigger::HostDisconnected);
        assert!(!exit.is_failure());
        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);
        assert_eq!(host.states().last(), Some(&ServiceState::Stopped));
    }

    #[tokio::test]
    async fn recovery_failures_are_only_warnings() {
        let (_journal, worker, host, log) = setup(StartBehavior::Succeed);
        let (_tx, rx) = requests(&[ControlRequest::Stop]);

        let controller = ServiceController::with_recovery("logship-agent", worker.clone(), FailingRecovery);
        let exit = controller.execute(rx, &host, &log).await;

        assert_eq!(exit.trigger, ShutdownTrigger::Stop);
        assert_eq!(worker.starts.load(Ordering::SeqCst), 1);

        let events = log.events();
        assert_eq!(events[0], ServiceEvent::LegacyImportFailed);
        assert_eq!(events[1], ServiceEvent::ConfigUpgradeFailed);
        assert_eq!(events[2], ServiceEvent::ServiceStarted);
        assert_eq!(
            host.states(),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::StopPending,
                ServiceState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn each_run_gets_its_own_stop_signal() {
        let (_journal, worker, host, log) = setup(StartBehavior::Fail);
        let controller = ServiceController::new("logship-agent", worker.clone());

        for _ in 0..2 {
            let (_tx, rx) = requests(&[]);
            let exit = controller.execute(rx, &host, &log).await;
            assert_eq!(exit.trigger, ShutdownTrigger::WorkerFailed);
        }

        assert_eq!(worker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(worker.stops.load(Ordering::SeqCst), 2);
        assert_eq!(log.count(ServiceEvent::WorkerStartFailed), 2);
    }
}
