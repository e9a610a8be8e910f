//! End-to-end pool lifecycle scenarios against an in-memory runtime.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    async_trait::async_trait,
    tokio::sync::mpsc,
};

use berth_pool::{
    AgentEvent, LinkEvent, PoolConfig, PoolManager, PoolMode, SlotState, Viewport,
    error::Error,
    link::{AgentConnector, AgentLink},
    runtime::{ContainerInfo, ContainerRuntime, PsEntry},
    types::SessionInfo,
};

#[derive(Debug, Clone)]
struct Call {
    verb: &'static str,
    name: String,
    envs: BTreeMap<String, String>,
    ports: Vec<(u16, u16)>,
}

#[derive(Clone)]
struct FakeContainer {
    name: String,
    ports_line: String,
    created: SystemTime,
    running: bool,
}

/// In-memory stand-in for the docker CLI.
#[derive(Default)]
struct FakeRuntime {
    calls: Mutex<Vec<Call>>,
    fail_run_for: Mutex<Vec<String>>,
    containers: Mutex<Vec<FakeContainer>>,
}

impl FakeRuntime {
    fn record(&self, verb: &'static str, name: &str) {
        self.calls.lock().unwrap().push(Call {
            verb,
            name: name.to_string(),
            envs: BTreeMap::new(),
            ports: Vec::new(),
        });
    }

    fn count(&self, verb: &str, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.verb == verb && c.name == name)
            .count()
    }

    fn total(&self, verb: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.verb == verb).count()
    }

    fn runs_for(&self, name: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.verb == "run" && c.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_available(&self) -> berth_pool::Result<()> {
        Ok(())
    }

    async fn pull_image(&self, _image: &str) -> berth_pool::Result<()> {
        self.record("pull", "");
        Ok(())
    }

    async fn run(
        &self,
        name: &str,
        _image: &str,
        envs: &BTreeMap<String, String>,
        ports: &[(u16, u16)],
        _extra_args: &BTreeMap<String, String>,
    ) -> berth_pool::Result<()> {
        self.calls.lock().unwrap().push(Call {
            verb: "run",
            name: name.to_string(),
            envs: envs.clone(),
            ports: ports.to_vec(),
        });
        if self.fail_run_for.lock().unwrap().iter().any(|n| n == name) {
            return Err(Error::RunFailed(format!("{name}: boom")));
        }
        Ok(())
    }

    async fn stop(&self, name: &str) -> berth_pool::Result<()> {
        self.record("stop", name);
        Ok(())
    }

    async fn restart(&self, name: &str) -> berth_pool::Result<()> {
        self.record("restart", name);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> berth_pool::Result<Vec<String>> {
        let name_prefix = format!("{prefix}-");
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name.starts_with(&name_prefix))
            .map(|c| c.name.clone())
            .collect())
    }

    async fn ps_entries(&self, prefix: &str) -> berth_pool::Result<Vec<PsEntry>> {
        let name_prefix = format!("{prefix}-");
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name.starts_with(&name_prefix))
            .map(|c| PsEntry {
                name: c.name.clone(),
                image: "test-image".into(),
                status: "Up 2 minutes".into(),
                ports: c.ports_line.clone(),
            })
            .collect())
    }

    async fn inspect(&self, name: &str) -> berth_pool::Result<ContainerInfo> {
        let containers = self.containers.lock().unwrap();
        let c = containers
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::Parse(format!("no such fake container: {name}")))?;
        Ok(ContainerInfo {
            name: c.name.clone(),
            labels: Default::default(),
            created: Some(c.created),
            running: c.running,
            ports: Vec::new(),
        })
    }
}

/// Connector that never dials anything; tests inject events directly.
#[derive(Default)]
struct NullConnector {
    opened: Mutex<Vec<String>>,
}

impl NullConnector {
    fn opens_for(&self, slot: &str) -> usize {
        self.opened.lock().unwrap().iter().filter(|s| *s == slot).count()
    }
}

impl AgentConnector for NullConnector {
    fn open(&self, slot: &str, _url: &str, _events: mpsc::UnboundedSender<LinkEvent>) -> AgentLink {
        self.opened.lock().unwrap().push(slot.to_string());
        AgentLink::from_task(tokio::spawn(std::future::pending::<()>()))
    }
}

fn test_config() -> PoolConfig {
    PoolConfig {
        prefix: "bx".into(),
        num_browsers: 2,
        base_browser_port: 10222,
        base_app_port: 7070,
        base_vnc_port: 15900,
        resolution: Viewport { width: 1280, height: 720 },
        max_retries: 3,
        kill_wait_time_ms: 100,
        ..Default::default()
    }
}

struct TestPool {
    manager: PoolManager,
    runtime: Arc<FakeRuntime>,
    connector: Arc<NullConnector>,
}

fn new_pool(mode: PoolMode) -> TestPool {
    new_pool_with(mode, test_config(), FakeRuntime::default())
}

fn new_pool_with(mode: PoolMode, config: PoolConfig, runtime: FakeRuntime) -> TestPool {
    let runtime = Arc::new(runtime);
    let connector = Arc::new(NullConnector::default());
    let manager = PoolManager::with_parts(config, mode, runtime.clone(), connector.clone());
    TestPool { manager, runtime, connector }
}

/// Let spawned tasks and the event loop run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn inject(pool: &TestPool, slot: &str, event: AgentEvent) {
    pool.manager
        .events()
        .send(LinkEvent::Agent { slot: slot.into(), event })
        .expect("event loop alive");
    settle().await;
}

async fn make_ready(pool: &TestPool, slot: &str, id: &str) {
    inject(pool, slot, AgentEvent::SetState { id: id.into(), ip: "10.0.0.1".into() }).await;
}

fn assert_ports_disjoint(slots: &[berth_pool::Slot]) {
    for a in slots {
        for b in slots {
            if a.name != b.name {
                assert!(!a.ports.overlaps(&b.ports), "{} and {} share a port", a.name, b.name);
            }
        }
    }
}

// ── scenarios ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn happy_lease() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;
    make_ready(&pool, "bx-10223", "B").await;

    let slot = pool.manager.reserve(5).await.expect("a ready slot");
    assert_eq!(slot.name, "bx-10222");
    assert_eq!(slot.state, SlotState::Leased);

    let remaining = slot
        .lease_deadline
        .unwrap()
        .duration_since(SystemTime::now())
        .unwrap()
        .as_secs_f64();
    assert!(remaining > 299.0 && remaining <= 300.0, "remaining = {remaining}");

    let status = pool.manager.status().await;
    assert_eq!(status.used, 1);
    assert_eq!(status.capacity, 2);
    assert_ports_disjoint(&status.slots);
}

#[tokio::test(start_paused = true)]
async fn capacity_exhaustion_is_not_an_error() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;
    make_ready(&pool, "bx-10223", "B").await;

    assert_eq!(pool.manager.reserve(5).await.unwrap().name, "bx-10222");
    assert_eq!(pool.manager.reserve(5).await.unwrap().name, "bx-10223");
    assert!(pool.manager.reserve(5).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn reserve_never_returns_a_slot_that_is_not_ready() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    // No agent has reported in yet.
    assert!(pool.manager.reserve(5).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn lease_expiry_recycles_the_slot() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;
    make_ready(&pool, "bx-10223", "B").await;

    let slot = pool.manager.reserve(1).await.unwrap();
    assert_eq!(slot.name, "bx-10222");
    let stops_before = pool.runtime.count("stop", "bx-10222");
    let runs_before = pool.runtime.count("run", "bx-10222");

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    // The container was stopped and a replacement launched.
    assert_eq!(pool.runtime.count("stop", "bx-10222"), stops_before + 1);
    assert_eq!(pool.runtime.count("run", "bx-10222"), runs_before + 1);

    let slots = pool.manager.browsers().await;
    let recycled = slots.iter().find(|s| s.name == "bx-10222").unwrap();
    assert_eq!(recycled.state, SlotState::Creating);
    assert!(recycled.session.is_empty());
    assert!(recycled.labels.is_empty());

    // Once the agent re-sends setState the slot is Ready again.
    make_ready(&pool, "bx-10222", "A2").await;
    let slots = pool.manager.browsers().await;
    assert_eq!(slots[0].state, SlotState::Ready);
    assert_ports_disjoint(&slots);
}

#[tokio::test(start_paused = true)]
async fn disconnect_recovery_replaces_the_container() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;
    make_ready(&pool, "bx-10223", "B").await;
    let runs_before = pool.runtime.count("run", "bx-10222");

    pool.manager
        .events()
        .send(LinkEvent::Disconnected { slot: "bx-10222".into() })
        .unwrap();
    settle().await;

    let slots = pool.manager.browsers().await;
    let dropped = slots.iter().find(|s| s.name == "bx-10222").unwrap();
    assert_eq!(dropped.state, SlotState::Empty);
    assert!(dropped.labels.is_empty());
    assert_ports_disjoint(&slots);

    // Re-creation fires 2 seconds after the disconnect.
    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(pool.runtime.count("run", "bx-10222"), runs_before + 1);

    make_ready(&pool, "bx-10222", "A2").await;
    let slots = pool.manager.browsers().await;
    assert_eq!(slots[0].state, SlotState::Ready);
    assert_ports_disjoint(&slots);
}

#[tokio::test(start_paused = true)]
async fn manage_only_release_restarts_in_place() {
    let created = UNIX_EPOCH + Duration::from_secs(1_000_000);
    let ports_line = |i: u16| {
        format!(
            "0.0.0.0:{}->5900/tcp, 0.0.0.0:{}->3000/tcp, 0.0.0.0:{}->4444/tcp",
            15900 + i,
            7070 + i,
            10222 + i
        )
    };
    let runtime = FakeRuntime::default();
    runtime.containers.lock().unwrap().extend([
        FakeContainer {
            name: "bx-10222".into(),
            ports_line: ports_line(0),
            created,
            running: true,
        },
        FakeContainer {
            name: "bx-10223".into(),
            ports_line: ports_line(1),
            created,
            running: true,
        },
    ]);

    let pool = new_pool_with(PoolMode::ManageOnly, test_config(), runtime);
    pool.manager.init(false).await.unwrap();

    // Discovery adopts, never creates.
    assert_eq!(pool.runtime.total("run"), 0);
    assert_eq!(pool.connector.opens_for("bx-10222"), 1);

    let slots = pool.manager.browsers().await;
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].ports.app, 7070);
    assert_eq!(slots[0].created_at, Some(created));

    make_ready(&pool, "bx-10222", "A").await;
    make_ready(&pool, "bx-10223", "B").await;
    let slot = pool.manager.reserve(5).await.unwrap();
    assert_eq!(slot.name, "bx-10222");

    pool.manager.release("bx-10222").await.unwrap();
    settle().await;

    // Restart, not stop; the container (and its birth time) survives.
    assert_eq!(pool.runtime.count("restart", "bx-10222"), 1);
    assert_eq!(pool.runtime.count("stop", "bx-10222"), 0);
    assert_eq!(pool.runtime.total("run"), 0);

    let slots = pool.manager.browsers().await;
    let restarted = slots.iter().find(|s| s.name == "bx-10222").unwrap();
    assert_eq!(restarted.created_at, Some(created));
    assert!(restarted.session.is_empty());
    assert_eq!(restarted.state, SlotState::Creating);
    // A fresh agent link was opened after the restart.
    assert_eq!(pool.connector.opens_for("bx-10222"), 2);
}

#[tokio::test(start_paused = true)]
async fn manage_only_discovery_ignores_extras() {
    let runtime = FakeRuntime::default();
    runtime.containers.lock().unwrap().extend((0..3).map(|i| FakeContainer {
        name: format!("bx-{}", 10222 + i),
        ports_line: String::new(),
        created: UNIX_EPOCH,
        running: true,
    }));

    let pool = new_pool_with(PoolMode::ManageOnly, test_config(), runtime);
    pool.manager.init(false).await.unwrap();
    assert_eq!(pool.manager.browsers().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn release_is_idempotent() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;

    pool.manager.reserve(5).await.unwrap();
    let stops_before = pool.runtime.count("stop", "bx-10222");

    pool.manager.release("bx-10222").await.unwrap();
    pool.manager.release("bx-10222").await.unwrap();

    assert_eq!(pool.runtime.count("stop", "bx-10222"), stops_before + 1);
}

#[tokio::test(start_paused = true)]
async fn released_slot_is_cleared_and_not_reservable() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;

    let slot = pool.manager.reserve(5).await.unwrap();
    let mut session = SessionInfo::default();
    session.session_id = Some("sess-1".into());
    session.client_id = Some("client-1".into());
    pool.manager.set_internals(&slot.name, session).await.unwrap();

    pool.manager.release(&slot.name).await.unwrap();

    let slots = pool.manager.browsers().await;
    let released = slots.iter().find(|s| s.name == slot.name).unwrap();
    assert!(released.session.is_empty());
    assert!(released.labels.is_empty());
    assert!(released.lease_deadline.is_none());
    assert!(released.last_used.is_none());
    assert!(pool.manager.find_by_session("sess-1").await.is_none());
    // Not Ready again until the replacement's agent reports in.
    assert!(pool.manager.reserve(5).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn extend_resets_the_expiry_timer() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;

    let slot = pool.manager.reserve(1).await.unwrap();
    pool.manager.extend(&slot.name, 2).await.unwrap();

    // Past the original deadline: the lease must still be alive.
    tokio::time::sleep(Duration::from_secs(90)).await;
    settle().await;
    assert_eq!(pool.runtime.count("stop", &slot.name), 1); // init cleanup only
    let state = pool.manager.browsers().await[0].state;
    assert_eq!(state, SlotState::Leased);

    // Past the extended deadline: now it expires.
    tokio::time::sleep(Duration::from_secs(40)).await;
    settle().await;
    assert_eq!(pool.runtime.count("stop", &slot.name), 2);
}

#[tokio::test(start_paused = true)]
async fn extend_requires_a_lease() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;

    assert!(matches!(
        pool.manager.extend("bx-10222", 5).await,
        Err(Error::NotLeased(_))
    ));
    assert!(matches!(
        pool.manager.extend("nope", 5).await,
        Err(Error::SlotNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn first_slot_create_failure_is_fatal() {
    let runtime = FakeRuntime::default();
    runtime.fail_run_for.lock().unwrap().push("bx-10222".into());
    let pool = new_pool_with(PoolMode::Full, test_config(), runtime);

    assert!(matches!(pool.manager.init(false).await, Err(Error::RunFailed(_))));
    // The create was retried up to the cap before giving up.
    assert_eq!(pool.runtime.count("run", "bx-10222"), 3);
}

#[tokio::test(start_paused = true)]
async fn later_slot_create_failure_leaves_it_empty() {
    let runtime = FakeRuntime::default();
    runtime.fail_run_for.lock().unwrap().push("bx-10223".into());
    let pool = new_pool_with(PoolMode::Full, test_config(), runtime);

    pool.manager.init(false).await.unwrap();
    let slots = pool.manager.browsers().await;
    assert_eq!(slots[1].state, SlotState::Empty);

    make_ready(&pool, "bx-10222", "A").await;
    assert_eq!(pool.manager.reserve(5).await.unwrap().name, "bx-10222");
    assert!(pool.manager.reserve(5).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn reinit_with_resolution_is_stable_across_calls() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;

    let resolution = Viewport { width: 1920, height: 1080 };
    pool.manager.reinit_with_resolution("bx-10222", resolution).await.unwrap();
    pool.manager.reinit_with_resolution("bx-10222", resolution).await.unwrap();

    let runs = pool.runtime.runs_for("bx-10222");
    assert!(runs.len() >= 3); // init + two re-inits
    let reinits = &runs[runs.len() - 2..];
    for call in reinits {
        assert_eq!(call.envs["XVFB_RESOLUTION"], "1920x1080");
        assert_eq!(call.ports, reinits[0].ports);
        assert_eq!(call.envs.get("XVFB_RESOLUTION"), reinits[0].envs.get("XVFB_RESOLUTION"));
    }
    // Ports never drift from the slot's assignment.
    assert_eq!(reinits[0].ports, vec![(7070, 8080), (10222, 19222), (15900, 15900)]);
}

#[tokio::test(start_paused = true)]
async fn reinit_rejects_unlisted_resolutions() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();

    let result = pool
        .manager
        .reinit_with_resolution("bx-10222", Viewport { width: 640, height: 480 })
        .await;
    assert!(matches!(result, Err(Error::UnsupportedResolution(_))));
}

#[tokio::test(start_paused = true)]
async fn shutdown_suppresses_all_recreation() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;
    make_ready(&pool, "bx-10223", "B").await;
    pool.manager.reserve(5).await.unwrap();

    pool.manager.shutdown().await;
    let runs_after_shutdown = pool.runtime.total("run");

    // Neither the releases above nor later disconnects may create containers.
    let _ = pool
        .manager
        .events()
        .send(LinkEvent::Disconnected { slot: "bx-10223".into() });
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(pool.runtime.total("run"), runs_after_shutdown);
}

#[tokio::test(start_paused = true)]
async fn labels_upsert_in_arrival_order() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();

    // Label events before setState never mutate state.
    inject(
        &pool,
        "bx-10222",
        AgentEvent::SetLabel { label_name: "k".into(), label_value: "early".into() },
    )
    .await;
    assert!(pool.manager.browsers().await[0].labels.is_empty());

    make_ready(&pool, "bx-10222", "A").await;
    inject(
        &pool,
        "bx-10222",
        AgentEvent::SetLabel { label_name: "k".into(), label_value: "v1".into() },
    )
    .await;
    inject(
        &pool,
        "bx-10222",
        AgentEvent::SetParam { param: "k".into(), value: "v2".into() },
    )
    .await;

    let slots = pool.manager.browsers().await;
    assert_eq!(slots[0].labels["k"], "v2");
    assert_eq!(pool.manager.find_by_id("A").await.unwrap().name, "bx-10222");
}

#[tokio::test(start_paused = true)]
async fn events_for_unknown_slots_are_ignored() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();

    inject(
        &pool,
        "bx-99999",
        AgentEvent::SetState { id: "X".into(), ip: "10.0.0.9".into() },
    )
    .await;

    let slots = pool.manager.browsers().await;
    assert_eq!(slots.len(), 2);
    assert!(slots.iter().all(|s| s.labels.is_empty()));
}

// ── webhook dispatch (real HTTP against a local listener) ───────────────────

async fn recv_http_request(listener: tokio::net::TcpListener) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (mut stream, _) = listener.accept().await.expect("webhook connection");
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.expect("read");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().ok()))
                .flatten()
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    let _ = stream
        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
        .await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn deleted_webhook_body(fingerprint: Option<&str>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request = tokio::spawn(recv_http_request(listener));

    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;
    let slot = pool.manager.reserve(5).await.unwrap();

    let session = SessionInfo {
        session_id: Some("sess-1".into()),
        client_id: Some("client-1".into()),
        fingerprint_id: fingerprint.map(String::from),
        driver: None,
        webhook: Some(format!("http://{addr}/x")),
        report_key: Some("k".into()),
        session_uuid: Some("u".into()),
    };
    pool.manager.set_internals(&slot.name, session).await.unwrap();

    inject(
        &pool,
        "bx-10222",
        AgentEvent::Deleted {
            is_error: true,
            message: "m".into(),
            session_data: Some("S".into()),
        },
    )
    .await;

    tokio::time::timeout(Duration::from_secs(5), request)
        .await
        .expect("webhook POST within deadline")
        .unwrap()
}

#[tokio::test]
async fn deleted_event_posts_webhook_with_session_data() {
    let request = deleted_webhook_body(Some("f")).await;
    assert!(request.starts_with("POST /x"));
    assert!(request.contains("content-type: application/json"));
    assert!(request.contains(r#""sessionData":"S""#));
    assert!(request.contains(r#""clientID":"client-1""#));
    assert!(request.contains(r#""sessionUUID":"u""#));
    assert!(request.contains(r#""reportKey":"k""#));
    assert!(request.contains(r#""isError":true"#));
    assert!(request.contains(r#""error":"m""#));
}

#[tokio::test]
async fn webhook_session_data_empty_without_fingerprint() {
    let request = deleted_webhook_body(None).await;
    assert!(request.contains(r#""sessionData":"""#));
}

#[tokio::test(start_paused = true)]
async fn deleted_without_webhook_fields_posts_nothing_and_releases() {
    let pool = new_pool(PoolMode::Full);
    pool.manager.init(false).await.unwrap();
    make_ready(&pool, "bx-10222", "A").await;
    let slot = pool.manager.reserve(5).await.unwrap();

    inject(
        &pool,
        "bx-10222",
        AgentEvent::Deleted { is_error: false, message: String::new(), session_data: None },
    )
    .await;

    // The slot was still released and recycled.
    let slots = pool.manager.browsers().await;
    let recycled = slots.iter().find(|s| s.name == slot.name).unwrap();
    assert!(recycled.session.is_empty());
    assert_ne!(recycled.state, SlotState::Leased);
}
