//! Consumer, producer and consumer-service behavior against an
//! in-process stub broker.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use mqprobe::broker::{Channel, Connection, ConnectionExt, BrokerKind, Consumer};
use mqprobe::config::{BrokerConfig, RetryConfig, ServiceConfig};
use mqprobe::service::{ConsumeService, ServiceManager};
use mqprobe::{Destination, Message};

#[derive(Default)]
struct StubState {
    queue: Mutex<VecDeque<Bytes>>,
    published: Mutex<Vec<(Destination, Bytes)>>,
}

struct StubConnection {
    config: BrokerConfig,
    retry: RetryConfig,
    state: Arc<StubState>,
    auto_reconnect: AtomicBool,
    connected: AtomicBool,
}

impl StubConnection {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            config: BrokerConfig {
                host: "stub".into(),
                port: 1,
                vhost: "/".into(),
                user: "tester".into(),
                password: "tester".into(),
                ..Default::default()
            },
            // Non-zero poll interval so an empty queue parks in sleep
            // instead of spinning; cancellation is still observed
            // promptly through the select in the consume loop.
            retry: RetryConfig {
                max_attempts: 1,
                base_backoff_secs: 0,
                poll_interval_secs: 1,
            },
            state: Arc::new(StubState::default()),
            auto_reconnect: AtomicBool::new(true),
            connected: AtomicBool::new(false),
        })
    }

    fn preload<const N: usize>(&self, bodies: [&str; N]) {
        let mut queue = self.state.queue.lock().unwrap();
        for body in bodies {
            queue.push_back(Bytes::copy_from_slice(body.as_bytes()));
        }
    }

    fn published(&self) -> Vec<(Destination, Bytes)> {
        self.state.published.lock().unwrap().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

struct StubChannel {
    state: Arc<StubState>,
}

#[async_trait]
impl Channel for StubChannel {
    async fn declare_queue(&mut self, queue: &str) -> mqprobe::Result<String> {
        Ok(queue.to_string())
    }

    async fn bind_topic(&mut self, _topic: &str, _key: &str) -> mqprobe::Result<String> {
        Ok("gen-exclusive-1".to_string())
    }

    async fn publish(
        &mut self,
        destination: &Destination,
        message: &Message,
    ) -> mqprobe::Result<()> {
        self.state
            .published
            .lock()
            .unwrap()
            .push((destination.clone(), message.payload.clone()));
        Ok(())
    }

    async fn fetch(&mut self, _queue: &str) -> mqprobe::Result<Option<Bytes>> {
        Ok(self.state.queue.lock().unwrap().pop_front())
    }

    fn is_open(&self) -> bool {
        true
    }
}

#[async_trait]
impl Connection for StubConnection {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Rabbit
    }

    fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    async fn connect(&self) -> mqprobe::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> mqprobe::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn open_channel(&self) -> mqprobe::Result<Box<dyn Channel>> {
        Ok(Box::new(StubChannel {
            state: Arc::clone(&self.state),
        }))
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn produce_requires_exactly_one_addressing_mode() {
    assert!(Destination::resolve(None, None, None).is_err());
    assert!(Destination::resolve(None, Some("events"), None).is_err());

    let conn = StubConnection::new();
    let dyn_conn: Arc<dyn Connection> = conn.clone();
    let mut producer = dyn_conn.create_producer();

    let destination = Destination::resolve(Some("inbox"), None, None).unwrap();
    producer
        .produce(&Message::from("payload"), &destination)
        .await
        .unwrap();

    let published = conn.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, Destination::Queue("inbox".into()));
    assert_eq!(&published[0].1[..], b"payload");
}

#[tokio::test]
async fn failing_callback_does_not_kill_the_poll_loop() {
    let conn = StubConnection::new();
    conn.preload(["one", "two", "three"]);
    let dyn_conn: Arc<dyn Connection> = conn.clone();
    let consumer = Arc::new(Consumer::new(dyn_conn));

    let seen = Arc::new(AtomicUsize::new(0));
    let token = CancellationToken::new();

    let counter = Arc::clone(&seen);
    let loop_token = token.clone();
    let loop_consumer = Arc::clone(&consumer);
    let handle = tokio::spawn(async move {
        loop_consumer
            .consume(
                &Destination::Queue("inbox".into()),
                move |_body| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("malformed message")
                },
                Some(loop_token),
            )
            .await
    });

    // Every synthetic message is still processed despite the failures.
    wait_until(|| seen.load(Ordering::SeqCst) == 3).await;
    token.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn consume_without_stop_signal_is_single_shot() {
    let conn = StubConnection::new();
    conn.preload(["only"]);
    let dyn_conn: Arc<dyn Connection> = conn.clone();
    let consumer = dyn_conn.create_consumer();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    consumer
        .consume(
            &Destination::Queue("inbox".into()),
            move |_body| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn consumer_stop_ends_the_loop() {
    let conn = StubConnection::new();
    let dyn_conn: Arc<dyn Connection> = conn.clone();
    let consumer = Arc::new(Consumer::new(dyn_conn));

    let external = CancellationToken::new();
    let loop_consumer = Arc::clone(&consumer);
    let loop_token = external.clone();
    let handle = tokio::spawn(async move {
        loop_consumer
            .consume(
                &Destination::Topic {
                    topic: "events".into(),
                    key: "#".into(),
                },
                |_body| Ok(()),
                Some(loop_token),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    consumer.stop();
    handle.await.unwrap().unwrap();
    assert!(!external.is_cancelled());
}

#[tokio::test]
async fn consume_service_writes_messages_and_banners() {
    let conn = StubConnection::new();
    conn.preload([r#"{"uuid":"u-1","n":1}"#]);
    let dyn_conn: Arc<dyn Connection> = conn.clone();

    let manager = ServiceManager::new(
        "test",
        ServiceConfig {
            max_consumers: 2,
            buffer_capacity: 32,
        },
    );
    let service = ConsumeService::new(dyn_conn, Destination::Queue("inbox".into()));
    let sid = manager.start(Arc::new(service)).unwrap();
    let wrapper = manager.get(sid).unwrap();
    assert!(wrapper.name().contains("rabbit"));

    let mut captured: Vec<String> = Vec::new();
    wait_until(|| {
        captured.extend(wrapper.flush_output().into_iter().map(|e| e.message));
        captured.iter().any(|m| m.contains("u-1"))
    })
    .await;
    assert!(conn.is_connected());

    manager.stop(sid).await;
    captured.extend(wrapper.flush_output().into_iter().map(|e| e.message));
    assert!(captured.iter().any(|m| m == "[*] Consumer quit."));
    assert!(!conn.is_connected());
    assert!(!wrapper.is_alive());
}
