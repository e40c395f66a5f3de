use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use reader_api::{
    Authorizer, Message, MessageId, MessageReader, ReaderFactory, ReaderOptions,
    SourceError, StartPosition,
};

use crate::{
    BridgeError, CloseReason, DeliveryStats, FlowState, ReaderParams, ReaderRegistry,
    SessionBridge, SessionRegistry, TransportError, WindowSize, WireTransport, collect_stats,
};

// ═══════════════════════════════════════════════════════════════
//  Mocks
// ═══════════════════════════════════════════════════════════════

type ReadResult = Result<Message, SourceError>;

struct MockReader {
    tx: mpsc::UnboundedSender<ReadResult>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReadResult>>,
    reads: AtomicUsize,
    closes: AtomicUsize,
    closed: CancellationToken,
}

impl MockReader {
    fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            reads: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            closed: CancellationToken::new(),
        })
    }

    fn push(&self, msg: Message) {
        self.tx.send(Ok(msg)).unwrap();
    }

    fn fail(&self, err: SourceError) {
        self.tx.send(Err(err)).unwrap();
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MessageReader for MockReader {
    fn read_next(&self) -> Pin<Box<dyn Future<Output = ReadResult> + Send + '_>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let mut rx = tokio::select! {
                rx = self.rx.lock() => rx,
                _ = self.closed.cancelled() => return Err(SourceError::closed("closed")),
            };
            tokio::select! {
                msg = rx.recv() => msg.unwrap_or_else(|| Err(SourceError::closed("eof"))),
                _ = self.closed.cancelled() => Err(SourceError::closed("closed")),
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        Box::pin(async { Ok(()) })
    }

    fn subscription(&self) -> &str {
        "reader-mock"
    }

    fn topic(&self) -> &str {
        "quotes"
    }
}

struct MockFactory {
    reader: Option<Arc<MockReader>>,
    starts: Mutex<Vec<StartPosition>>,
}

impl MockFactory {
    fn with(reader: &Arc<MockReader>) -> Self {
        Self { reader: Some(reader.clone()), starts: Mutex::new(Vec::new()) }
    }

    fn failing() -> Self {
        Self { reader: None, starts: Mutex::new(Vec::new()) }
    }
}

impl ReaderFactory for MockFactory {
    fn create_reader(
        &self,
        _topic: &str,
        start: StartPosition,
        _options: ReaderOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn MessageReader>, SourceError>> + Send + '_>> {
        self.starts.lock().unwrap().push(start);
        let reader = self.reader.clone();
        Box::pin(async move {
            match reader {
                Some(r) => Ok(r as Arc<dyn MessageReader>),
                None => Err(SourceError::io("broker unavailable")),
            }
        })
    }
}

struct StaticAuth(bool);

impl Authorizer for StaticAuth {
    fn can_consume(&self, _topic: &str, _role: &str) -> bool {
        self.0
    }
}

#[derive(Default)]
struct MockTransport {
    frames: Mutex<Vec<String>>,
    sends: AtomicUsize,
    fail_on: HashSet<usize>,
    closed_with: Mutex<Option<CloseReason>>,
}

impl MockTransport {
    fn failing_on(sends: &[usize]) -> Arc<Self> {
        Arc::new(Self { fail_on: sends.iter().copied().collect(), ..Default::default() })
    }

    fn frames(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn closed_with(&self) -> Option<CloseReason> {
        *self.closed_with.lock().unwrap()
    }
}

impl WireTransport for MockTransport {
    fn send_text(
        &self,
        frame: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'static>> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Box::pin(async { Err(TransportError::Send("broken pipe".into())) });
        }
        self.frames.lock().unwrap().push(frame);
        Box::pin(async { Ok(()) })
    }

    fn close(&self, reason: CloseReason) {
        self.closed_with.lock().unwrap().get_or_insert(reason);
    }

    fn remote(&self) -> &str {
        "127.0.0.1:50000"
    }
}

struct MockRegistry {
    accept: bool,
    adds: AtomicUsize,
    removes: AtomicUsize,
}

impl MockRegistry {
    fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self { accept, adds: AtomicUsize::new(0), removes: AtomicUsize::new(0) })
    }
}

impl SessionRegistry for MockRegistry {
    fn add(&self, _session: Arc<SessionBridge>) -> bool {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.accept
    }

    fn remove(&self, _session: &SessionBridge) -> bool {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.accept
    }
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

/// Сообщение с payload длины `len`.
fn message(len: usize) -> Message {
    Message {
        id: MessageId::from_bytes((len as u64).to_be_bytes().to_vec()),
        payload: vec![b'x'; len],
        properties: HashMap::new(),
        publish_time_ms: 1_700_000_000_000,
        key: None,
    }
}

fn params(window: i64) -> ReaderParams {
    ReaderParams { window: WindowSize::new(window), ..Default::default() }
}

async fn open(
    reader: &Arc<MockReader>,
    transport: &Arc<MockTransport>,
    registry: Arc<dyn SessionRegistry>,
    window: i64,
) -> Arc<SessionBridge> {
    let pending = SessionBridge::prepare(
        &MockFactory::with(reader),
        &StaticAuth(true),
        "quotes",
        "reader",
        params(window),
    )
    .await
    .unwrap();
    pending.attach(transport.clone(), registry)
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Дать отработать запланированным задачам.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ═══════════════════════════════════════════════════════════════
//  Flow control scenarios
// ═══════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn window_of_one_pauses_without_acks() {
    let reader = MockReader::new();
    for len in 1..=3 {
        reader.push(message(len));
    }
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 1).await;

    wait_until("first delivery", || bridge.msg_delivered_counter() == 1).await;
    settle().await;

    assert_eq!(reader.reads(), 1);
    assert_eq!(transport.frames(), 1);
    assert_eq!(bridge.pending(), 1);
    assert_eq!(bridge.state(), FlowState::Paused);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_ack_resumes_paused_loop() {
    let reader = MockReader::new();
    reader.push(message(1));
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 1).await;

    wait_until("first delivery", || transport.frames() == 1).await;
    settle().await;
    assert_eq!(reader.reads(), 1);

    bridge.on_client_text("ack");
    wait_until("second pull", || reader.reads() == 2).await;
    assert_eq!(bridge.pending(), 0);
    assert_eq!(bridge.state(), FlowState::Flowing);

    reader.push(message(2));
    wait_until("second delivery", || transport.frames() == 2).await;
    assert_eq!(bridge.pending(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_window_pipelines_without_acks() {
    let reader = MockReader::new();
    for _ in 0..1000 {
        reader.push(message(4));
    }
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 1000).await;

    wait_until("1000 deliveries", || bridge.msg_delivered_counter() == 1000).await;
    settle().await;

    assert_eq!(reader.reads(), 1000);
    assert_eq!(bridge.pending(), 1000);
    assert_eq!(bridge.state(), FlowState::Paused);
    assert_eq!(bridge.take_stats(), DeliveryStats { count: 1000, bytes: 4000 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn push_failure_releases_credit_and_skips_stats() {
    let reader = MockReader::new();
    for len in 1..=10 {
        reader.push(message(len));
    }
    let transport = MockTransport::failing_on(&[5]);
    let bridge = open(&reader, &transport, MockRegistry::new(true), 10).await;

    wait_until("nine deliveries", || bridge.msg_delivered_counter() == 9).await;
    wait_until("pull after failure", || reader.reads() >= 11).await;
    settle().await;

    assert_eq!(transport.frames(), 9);
    assert_eq!(bridge.pending(), 9);
    // 1 + 2 + ... + 10 без сообщения #5
    assert_eq!(bridge.take_stats(), DeliveryStats { count: 9, bytes: 50 });
    assert_eq!(transport.closed_with(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pending_never_exceeds_window_plus_one() {
    let reader = MockReader::new();
    for len in 1..=50 {
        reader.push(message(len));
    }
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 8).await;

    for _ in 0..20 {
        wait_until("window filled", || bridge.pending() >= 8).await;
        assert!(bridge.pending() <= 9);
        bridge.on_client_text("");
    }
    settle().await;
    assert!(bridge.pending() <= 9);
    assert_eq!(bridge.msg_delivered_counter() as usize, transport.frames());
}

// ═══════════════════════════════════════════════════════════════
//  Terminal errors
// ═══════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn encode_failure_closes_without_advancing_window() {
    let reader = MockReader::new();
    let mut bad = message(3);
    bad.publish_time_ms = i64::MAX;
    reader.push(bad);
    reader.push(message(1));
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 10).await;

    wait_until("close", || transport.closed_with().is_some()).await;
    settle().await;

    assert_eq!(transport.closed_with(), Some(CloseReason::FailedToSerialize));
    assert_eq!(transport.frames(), 0);
    assert_eq!(bridge.pending(), 0);
    assert_eq!(reader.reads(), 1);
    assert_eq!(bridge.state(), FlowState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pull_failure_is_terminal() {
    let reader = MockReader::new();
    reader.push(message(1));
    reader.fail(SourceError::io("ledger unavailable"));
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 10).await;

    wait_until("close", || transport.closed_with().is_some()).await;
    assert_eq!(transport.closed_with(), Some(CloseReason::ReaderFailed));
    assert_eq!(bridge.state(), FlowState::Closed);

    settle().await;
    assert_eq!(reader.reads(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reader_closed_under_open_session_is_terminal() {
    let reader = MockReader::new();
    reader.fail(SourceError::closed("topic dropped"));
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 10).await;

    wait_until("close", || transport.closed_with().is_some()).await;
    assert_eq!(transport.closed_with(), Some(CloseReason::ReaderFailed));
    assert_eq!(bridge.state(), FlowState::Closed);

    for _ in 0..3 {
        reader.push(message(8));
    }
    bridge.on_client_text("ack");
    settle().await;
    assert_eq!(reader.reads(), 1);
    assert_eq!(transport.frames(), 0);
}

// ═══════════════════════════════════════════════════════════════
//  Lifecycle
// ═══════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_shutdown_sends_going_away() {
    let reader = MockReader::new();
    let transport = Arc::new(MockTransport::default());
    let registry = MockRegistry::new(true);
    let bridge = open(&reader, &transport, registry.clone(), 5).await;
    wait_until("first pull", || reader.reads() == 1).await;

    bridge.shutdown(CloseReason::GoingAway);
    assert_eq!(transport.closed_with(), Some(CloseReason::GoingAway));
    assert_eq!(bridge.state(), FlowState::Closed);
    assert_eq!(registry.removes.load(Ordering::SeqCst), 1);

    wait_until("reader close", || reader.closes.load(Ordering::SeqCst) == 1).await;
    // повторное закрытие со стороны соединения: no-op
    bridge.close();
    settle().await;
    assert_eq!(registry.removes.load(Ordering::SeqCst), 1);
    assert_eq!(reader.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_after_close_sends_nothing() {
    let reader = MockReader::new();
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, MockRegistry::new(true), 5).await;
    wait_until("first pull", || reader.reads() == 1).await;

    bridge.close();
    bridge.shutdown(CloseReason::GoingAway);
    settle().await;
    assert_eq!(transport.closed_with(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_close_is_idempotent() {
    let reader = MockReader::new();
    let transport = Arc::new(MockTransport::default());
    let registry = MockRegistry::new(true);
    let bridge = open(&reader, &transport, registry.clone(), 5).await;
    wait_until("first pull", || reader.reads() == 1).await;

    let closers: Vec<_> = (0..16)
        .map(|_| {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.close() })
        })
        .collect();
    for c in closers {
        c.await.unwrap();
    }

    wait_until("reader close", || reader.closes.load(Ordering::SeqCst) == 1).await;
    settle().await;
    assert_eq!(registry.adds.load(Ordering::SeqCst), 1);
    assert_eq!(registry.removes.load(Ordering::SeqCst), 1);
    assert_eq!(reader.closes.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.state(), FlowState::Closed);

    // in-flight pull завершился ошибкой Closed: это не повод закрывать transport
    assert_eq!(transport.closed_with(), None);

    bridge.on_client_text("late ack");
    reader.push(message(1));
    settle().await;
    assert_eq!(reader.reads(), 1);
    assert_eq!(transport.frames(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_rejection_is_not_fatal() {
    let reader = MockReader::new();
    reader.push(message(2));
    let transport = Arc::new(MockTransport::default());
    let registry = MockRegistry::new(false);
    let bridge = open(&reader, &transport, registry.clone(), 10).await;

    wait_until("delivery", || bridge.msg_delivered_counter() == 1).await;

    bridge.close();
    assert_eq!(registry.removes.load(Ordering::SeqCst), 1);
    wait_until("reader close", || reader.closes.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn earliest_is_resolved_before_reader_creation() {
    let reader = MockReader::new();
    let factory = MockFactory::with(&reader);
    let query = HashMap::from([("messageId".to_string(), "earliest".to_string())]);

    let pending = SessionBridge::prepare(
        &factory,
        &StaticAuth(true),
        "quotes",
        "",
        ReaderParams::from_query(&query).unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(*factory.starts.lock().unwrap(), vec![StartPosition::Earliest]);
    assert_eq!(pending.subscription(), "reader-mock");
    pending.abandon().await;
    assert_eq!(reader.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthorized_role_never_creates_reader() {
    let reader = MockReader::new();
    let factory = MockFactory::with(&reader);
    let err = SessionBridge::prepare(&factory, &StaticAuth(false), "quotes", "guest", params(1))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, BridgeError::Unauthorized { .. }));
    assert!(factory.starts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reader_creation_failure_is_a_construction_error() {
    let err = SessionBridge::prepare(&MockFactory::failing(), &StaticAuth(true), "quotes", "", params(1))
        .await
        .err()
        .unwrap();

    match err {
        BridgeError::ReaderCreate { topic, source } => {
            assert_eq!(topic, "quotes");
            assert_eq!(source.message(), "broker unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reader_registry_tracks_sessions_and_stats() {
    let registry = Arc::new(ReaderRegistry::new());
    let reader = MockReader::new();
    reader.push(message(7));
    reader.push(message(3));
    let transport = Arc::new(MockTransport::default());
    let bridge = open(&reader, &transport, registry.clone(), 10).await;

    assert_eq!(registry.len(), 1);
    wait_until("deliveries", || bridge.msg_delivered_counter() == 2).await;

    let info = bridge.info();
    assert_eq!(info.topic, "quotes");
    assert_eq!(info.subscription, "reader-mock");
    assert_eq!(info.window_size, 10);

    let stats = collect_stats(&registry);
    assert_eq!(stats["quotes"].readers, 1);
    assert_eq!(stats["quotes"].msgs, 2);
    assert_eq!(stats["quotes"].bytes, 10);
    assert_eq!(collect_stats(&registry)["quotes"].msgs, 0);
    assert_eq!(bridge.msg_delivered_counter(), 2);

    bridge.close();
    assert!(registry.is_empty());
}
