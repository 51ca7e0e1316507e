//! End-to-end tests of the adapter runtime over a mock transport


use iothub_adapter::adapter::{
    AdapterOptions, CloudAdapter, Command, CommandResponse, ConnectionStatus, Timing,
};
use iothub_adapter::error::AdapterError;
use iothub_adapter::runtime::{AdapterHandle, AdapterRuntime, MethodTable};
use iothub_adapter::testing::{MockLink, MockRestart, MockTransport};
use iothub_adapter::transport::TransportEvent;
use std::time::Duration;
use test_helpers::CONN_STR;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const TICK: Duration = Duration::from_millis(10);
const WAIT: Duration = Duration::from_secs(10);

struct Running {
    handle: AdapterHandle,
    transport: MockTransport,
    restart: MockRestart,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<iothub_adapter::AdapterResult<()>>,
}

fn start(timing: Timing) -> Running {
    let transport = MockTransport::new();
    let restart = MockRestart::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let adapter = CloudAdapter::new(
        transport.clone(),
        Box::new(MockLink::up()),
        AdapterOptions {
            device_id: 7,
            timing,
            ..Default::default()
        },
    )
    .with_restart(Box::new(restart.clone()));

    let dispatcher = MethodTable::new().register("echo", |args: &[f64]| Ok(args.to_vec()));
    let (runtime, handle) = AdapterRuntime::new(adapter, events_rx, TICK);
    let runtime = runtime.with_dispatcher(Box::new(dispatcher));
    let task = tokio::spawn(runtime.run(shutdown_rx));

    Running {
        handle,
        transport,
        restart,
        events_tx,
        shutdown_tx,
        task,
    }
}

impl Running {
    async fn wait_for_status(&self, expected: ConnectionStatus) {
        timeout(WAIT, async {
            loop {
                let response = self.handle.execute(Command::GetStatus).await.unwrap();
                if response == CommandResponse::Status(expected) {
                    return;
                }
                sleep(TICK).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("adapter never reached {expected}"));
    }

    async fn connect(&self) {
        let response = self
            .handle
            .execute(Command::SetCredentials(CONN_STR.to_vec()))
            .await
            .unwrap();
        assert_eq!(response, CommandResponse::Ack);
        self.events_tx.send(TransportEvent::Connected).unwrap();
        self.wait_for_status(ConnectionStatus::Connected).await;
    }
}

#[tokio::test]
async fn test_commands_reach_the_adapter() {
    let running = start(Timing::default());

    assert_eq!(
        running.handle.execute(Command::GetStatus).await.unwrap(),
        CommandResponse::Status(ConnectionStatus::Disconnected)
    );
    assert_eq!(
        running.handle.execute(Command::SetPushPeriod(10)).await.unwrap(),
        CommandResponse::Period(1000)
    );

    running.connect().await;
    assert_eq!(
        running.handle.execute(Command::GetHubName).await.unwrap(),
        CommandResponse::Text("h.example".to_string())
    );
    assert_eq!(running.transport.opened().len(), 1);

    running.shutdown_tx.send(true).unwrap();
    let result = timeout(WAIT, running.task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_method_call_is_answered() {
    let running = start(Timing::default());
    running.connect().await;

    running
        .events_tx
        .send(TransportEvent::Message {
            topic: "$iothub/methods/POST/echo/?$rid=7".to_string(),
            payload: b"[1.5, 2]".to_vec(),
        })
        .unwrap();
    running
        .events_tx
        .send(TransportEvent::Message {
            topic: "$iothub/methods/POST/reboot/?$rid=8".to_string(),
            payload: b"[]".to_vec(),
        })
        .unwrap();

    let responses = timeout(WAIT, async {
        loop {
            let sent = running.transport.sent();
            if sent.len() >= 2 {
                return sent;
            }
            sleep(TICK).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(responses[0].0, "$iothub/methods/res/200/?$rid=7");
    assert_eq!(responses[0].1, b"[1.500000,2.000000]".to_vec());
    assert_eq!(responses[1].0, "$iothub/methods/res/404/?$rid=8");
    assert_eq!(responses[1].1, b"[]".to_vec());
}

#[tokio::test]
async fn test_recorded_samples_flush_when_connected() {
    let running = start(Timing::new(1000, 0));
    running.handle.record("temp", vec![20.0]).await.unwrap();
    running.handle.record("temp", vec![22.0]).await.unwrap();
    running.connect().await;

    let sent = timeout(WAIT, async {
        loop {
            let sent = running.transport.sent();
            if !sent.is_empty() {
                return sent;
            }
            sleep(TICK).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(sent[0].0, "devices/dev1/messages/events/");
    assert_eq!(
        String::from_utf8(sent[0].1.clone()).unwrap(),
        r#"{"device":"0700000000000000","label":"temp","values":[21.000000]}"#
    );
}

#[tokio::test]
async fn test_shutdown_closes_session() {
    let running = start(Timing::default());
    running.connect().await;

    running.shutdown_tx.send(true).unwrap();
    timeout(WAIT, running.task).await.unwrap().unwrap().unwrap();
    assert_eq!(running.transport.close_count(), 1);
}

#[tokio::test]
async fn test_handle_fails_after_runtime_stops() {
    let running = start(Timing::default());
    running.shutdown_tx.send(true).unwrap();
    timeout(WAIT, running.task).await.unwrap().unwrap().unwrap();

    let err = running
        .handle
        .execute(Command::GetStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::RuntimeStopped));
    assert!(running.handle.record("temp", vec![1.0]).await.is_err());
}

#[tokio::test]
async fn test_silent_connection_trips_watchdog() {
    // 1 s pushes raise the watchdog to 3 s
    let running = start(Timing::new(1000, 1));
    running.connect().await;

    let result = timeout(WAIT, running.task).await.unwrap().unwrap();
    assert!(matches!(result, Err(AdapterError::WatchdogExpired { .. })));
    assert_eq!(running.restart.count(), 1);
}
