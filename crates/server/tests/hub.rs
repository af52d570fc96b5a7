use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use longrun_core::{CancellationToken, JobId, JobStatus, WorkerConfig};
use longrun_server::{create_app, Services};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn fast() -> WorkerConfig {
    WorkerConfig {
        unit_delay_min: Duration::from_millis(1),
        unit_delay_max: Duration::from_millis(3),
        start_delay: Duration::from_millis(1),
        cancel_grace: Duration::from_millis(1),
    }
}

fn stalled() -> WorkerConfig {
    WorkerConfig {
        unit_delay_min: Duration::from_secs(30),
        unit_delay_max: Duration::from_secs(30),
        start_delay: Duration::from_millis(1),
        cancel_grace: Duration::from_millis(1),
    }
}

async fn serve(config: WorkerConfig) -> (SocketAddr, Services, CancellationToken) {
    let shutdown = CancellationToken::new();
    let services = Services::start(config, shutdown.clone());
    let app = create_app(services.state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, services, shutdown)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/hub/job-progress"))
        .await
        .unwrap();
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn next_frame(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within timeout")
            .expect("socket open")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn events_until_terminal(ws: &mut Client) -> Vec<Value> {
    let mut events = Vec::new();
    loop {
        let frame = next_frame(ws).await;
        let terminal = matches!(
            frame["event"].as_str(),
            Some("jobCompleted" | "jobCancelled" | "jobFailed")
        );
        events.push(frame);
        if terminal {
            return events;
        }
    }
}

async fn wait_for_status(services: &Services, id: &JobId, want: JobStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while services.state.store.get_job(id).map(|j| j.status()) != Some(want) {
        assert!(tokio::time::Instant::now() < deadline, "job never reached {want}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn assert_stream_for(events: &[Value], job: &JobId, result: &str) {
    assert!(events.iter().all(|e| e["jobId"] == job.to_string()));
    assert_eq!(events[0]["event"], "jobStarted");

    let units: String = events
        .iter()
        .filter(|e| e["event"] == "unitDelivered")
        .map(|e| e["value"].as_str().unwrap())
        .collect();
    assert_eq!(units, result);

    let last = events.last().unwrap();
    assert_eq!(last["event"], "jobCompleted");
    assert_eq!(last["result"], result);

    let progress: Vec<f64> = events
        .iter()
        .filter(|e| e["event"] == "progressUpdated")
        .map(|e| e["percentage"].as_f64().unwrap())
        .collect();
    assert_eq!(progress.len(), result.chars().count());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(100.0));
}

#[tokio::test]
async fn late_subscriber_receives_buffered_stream_in_order() {
    let (addr, services, _shutdown) = serve(fast()).await;
    let job = services.state.store.create_job("abc").unwrap().id;
    wait_for_status(&services, &job, JobStatus::Completed).await;
    // the terminal event is buffered just after the status flips
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "type": "join", "jobId": job })).await;

    let joined = next_frame(&mut ws).await;
    assert_eq!(joined["type"], "joined");
    assert_eq!(joined["jobId"], job.to_string());
    // started + unit/progress per char + completed
    assert_eq!(joined["pending"], 1 + 2 * 11 + 1);

    let events = events_until_terminal(&mut ws).await;
    assert_stream_for(&events, &job, "a1b1c1/YWJj");
}

#[tokio::test]
async fn live_subscriber_receives_full_stream() {
    let (addr, services, _shutdown) = serve(fast()).await;
    let mut ws = connect(addr).await;
    let job = services.state.store.create_job("Hello").unwrap().id;
    send(&mut ws, json!({ "type": "join", "jobId": job })).await;

    assert_eq!(next_frame(&mut ws).await["type"], "joined");
    let events = events_until_terminal(&mut ws).await;
    assert_stream_for(&events, &job, "H1e1l2o1/SGVsbG8=");
}

#[tokio::test]
async fn leave_cancels_the_job() {
    let (addr, services, _shutdown) = serve(stalled()).await;
    let job = services.state.store.create_job("abc").unwrap().id;
    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "type": "join", "jobId": job })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "joined");

    send(&mut ws, json!({ "type": "leave", "jobId": job })).await;

    // events already in flight for the job may precede the ack
    loop {
        let frame = next_frame(&mut ws).await;
        if frame["type"] == "left" {
            break;
        }
        assert!(frame.get("event").is_some(), "unexpected frame: {frame}");
    }
    wait_for_status(&services, &job, JobStatus::Cancelled).await;
    assert!(!services.state.connections().is_connected(&job));
}

#[tokio::test]
async fn disconnect_cancels_subscribed_jobs() {
    let (addr, services, _shutdown) = serve(stalled()).await;
    let job = services.state.store.create_job("abc").unwrap().id;
    let mut ws = connect(addr).await;
    send(&mut ws, json!({ "type": "join", "jobId": job })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "joined");

    ws.close(None).await.unwrap();
    drop(ws);

    wait_for_status(&services, &job, JobStatus::Cancelled).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !services.state.sessions.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "session never removed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn join_unknown_job_is_an_error() {
    let (addr, _services, _shutdown) = serve(fast()).await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "type": "join", "jobId": JobId::new() })).await;

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["message"].as_str().unwrap().contains("job not found"));
}
