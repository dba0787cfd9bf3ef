use crate::domain::errors::SubscriptionError;
use crate::domain::types::{PredictionRequest, PredictionResult, Timeframe};
use crate::infrastructure::observability::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::coordinator::InferenceCoordinator;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Per-subscription delivery queue size; beyond it the oldest
    /// undelivered message is dropped (freshness over completeness)
    pub queue_capacity: usize,
    /// Interval between prediction pushes per subscription
    pub poll_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Message delivered to a streaming listener
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BrokerMessage {
    Prediction(PredictionResult),
    Error { message: String },
}

/// Inbound client message on an open subscription, relayed verbatim by
/// the transport layer
#[derive(Debug, Deserialize)]
struct ClientMessage {
    symbol: Option<String>,
    timeframe: Option<String>,
}

struct Topics {
    symbols: Vec<String>,
    timeframe: Timeframe,
}

struct SubscriptionInner {
    id: Uuid,
    topics: RwLock<Topics>,
    queue: Mutex<VecDeque<BrokerMessage>>,
    capacity: usize,
    dropped: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriptionInner {
    /// Drop-oldest enqueue; never blocks the producer on a slow consumer
    async fn push(&self, message: BrokerMessage, metrics: &Metrics) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.queue.lock().await;
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics.subscription_dropped_total.inc();
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<BrokerMessage> {
        self.queue.lock().await.pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Listener-side view of one subscription
pub struct SubscriptionHandle {
    inner: Arc<SubscriptionInner>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Messages dropped so far under backpressure
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Next delivered message. Pending while the queue is empty; yields
    /// `SubscriptionError::Closed` once the subscription is closed and
    /// drained.
    pub async fn next(&self) -> Result<BrokerMessage, SubscriptionError> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.inner.pop().await {
                return Ok(message);
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(SubscriptionError::Closed(self.inner.id));
            }
            notified.await;
        }
    }
}

struct SubscriptionEntry {
    inner: Arc<SubscriptionInner>,
    pump: JoinHandle<()>,
}

/// Fans repeated predictions out to connected listeners. Every
/// subscription has its own pump task and delivery queue, so a slow or
/// faulty listener never delays a sibling or the coordinator.
pub struct SubscriptionBroker {
    coordinator: Arc<InferenceCoordinator>,
    metrics: Metrics,
    config: BrokerConfig,
    subscriptions: RwLock<HashMap<Uuid, SubscriptionEntry>>,
}

impl SubscriptionBroker {
    pub fn new(
        coordinator: Arc<InferenceCoordinator>,
        metrics: Metrics,
        config: BrokerConfig,
    ) -> Self {
        Self {
            coordinator,
            metrics,
            config,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(
        self: &Arc<Self>,
        symbols: Vec<String>,
        timeframe: Timeframe,
    ) -> SubscriptionHandle {
        let inner = Arc::new(SubscriptionInner {
            id: Uuid::new_v4(),
            topics: RwLock::new(Topics {
                symbols: symbols.iter().map(|s| s.trim().to_uppercase()).collect(),
                timeframe,
            }),
            queue: Mutex::new(VecDeque::new()),
            capacity: self.config.queue_capacity.max(1),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let pump = tokio::spawn(Self::pump(
            Arc::clone(&self.coordinator),
            Arc::clone(&inner),
            self.metrics.clone(),
            self.config.poll_interval,
        ));

        let id = inner.id;
        self.subscriptions.write().await.insert(
            id,
            SubscriptionEntry {
                inner: Arc::clone(&inner),
                pump,
            },
        );
        self.metrics.active_subscriptions.inc();
        info!(subscription_id = %id, "Subscription opened");

        SubscriptionHandle { inner }
    }

    /// Per-subscription delivery loop. Prediction failures become inline
    /// error messages to this listener only.
    async fn pump(
        coordinator: Arc<InferenceCoordinator>,
        inner: Arc<SubscriptionInner>,
        metrics: Metrics,
        poll_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if inner.closed.load(Ordering::Acquire) {
                break;
            }
            let (symbols, timeframe) = {
                let topics = inner.topics.read().await;
                (topics.symbols.clone(), topics.timeframe)
            };
            for symbol in symbols {
                let message = match coordinator
                    .predict(PredictionRequest::new(symbol, timeframe))
                    .await
                {
                    Ok(result) => BrokerMessage::Prediction(result),
                    Err(e) => BrokerMessage::Error {
                        message: e.to_string(),
                    },
                };
                inner.push(message, &metrics).await;
            }
        }
    }

    /// Handles a raw inbound message from a listener. Malformed input
    /// (unparseable JSON, missing symbol) yields an inline error to that
    /// listener without closing the subscription.
    pub async fn handle_message(
        &self,
        subscription_id: Uuid,
        raw: &str,
    ) -> Result<(), SubscriptionError> {
        let inner = {
            let subs = self.subscriptions.read().await;
            subs.get(&subscription_id)
                .map(|entry| Arc::clone(&entry.inner))
                .ok_or(SubscriptionError::Unknown(subscription_id))?
        };

        let parsed: Result<ClientMessage, _> = serde_json::from_str(raw);
        let message = match parsed {
            Err(e) => {
                inner
                    .push(
                        BrokerMessage::Error {
                            message: format!("Malformed message: {}", e),
                        },
                        &self.metrics,
                    )
                    .await;
                return Ok(());
            }
            Ok(message) => message,
        };

        let Some(symbol) = message.symbol.filter(|s| !s.trim().is_empty()) else {
            inner
                .push(
                    BrokerMessage::Error {
                        message: "Symbol required".to_string(),
                    },
                    &self.metrics,
                )
                .await;
            return Ok(());
        };

        let timeframe = match message.timeframe {
            Some(raw_tf) => match raw_tf.parse::<Timeframe>() {
                Ok(tf) => Some(tf),
                Err(e) => {
                    inner
                        .push(
                            BrokerMessage::Error {
                                message: e.to_string(),
                            },
                            &self.metrics,
                        )
                        .await;
                    return Ok(());
                }
            },
            None => None,
        };

        let mut topics = inner.topics.write().await;
        topics.symbols = vec![symbol.trim().to_uppercase()];
        if let Some(tf) = timeframe {
            topics.timeframe = tf;
        }
        Ok(())
    }

    /// Closes one subscription; siblings and the broker are unaffected
    pub async fn close(&self, subscription_id: Uuid) -> Result<(), SubscriptionError> {
        let entry = self
            .subscriptions
            .write()
            .await
            .remove(&subscription_id)
            .ok_or(SubscriptionError::Unknown(subscription_id))?;
        entry.inner.close();
        entry.pump.abort();
        self.metrics.active_subscriptions.dec();
        info!(subscription_id = %subscription_id, "Subscription closed");
        Ok(())
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Closes every subscription (shutdown path)
    pub async fn close_all(&self) {
        let mut subs = self.subscriptions.write().await;
        for (id, entry) in subs.drain() {
            entry.inner.close();
            entry.pump.abort();
            self.metrics.active_subscriptions.dec();
            warn!(subscription_id = %id, "Subscription closed during shutdown");
        }
    }
}
