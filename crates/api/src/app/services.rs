use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use vevurn_events::{EventBus, EventEnvelope, InMemoryEventBus};
use vevurn_infra::{
    ConfigError, InMemoryPosStore, InMemorySequence, PosConfig, PosStore, ReceiptNumberAllocator,
    RecordingGateway, SaleEngine, SequenceError, SequenceGenerator, StoreError,
};
#[cfg(feature = "redis")]
use vevurn_infra::{PostgresPosStore, RedisSequence};

pub type PosBus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
pub type PosEngine = SaleEngine<PosBus>;

/// How often stale mobile-money payments are expired.
pub const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("sequence setup failed: {0}")]
    Sequence(#[from] SequenceError),
}

pub struct AppServices {
    engine: Arc<PosEngine>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    backend: &'static str,
}

impl AppServices {
    pub fn engine(&self) -> &Arc<PosEngine> {
        &self.engine
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    /// `"in_memory"` or `"persistent"`.
    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

pub async fn build_services(config: &PosConfig) -> Result<AppServices, ServiceError> {
    if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    build_in_memory_services(config)
}

fn build_in_memory_services(config: &PosConfig) -> Result<AppServices, ServiceError> {
    // In-memory wiring (dev/test): state is lost on restart.
    let store: Arc<dyn PosStore> = Arc::new(InMemoryPosStore::new());
    let sequence: Arc<dyn SequenceGenerator> = Arc::new(InMemorySequence::new());
    assemble(store, sequence, config, "in_memory")
}

#[cfg(feature = "redis")]
async fn build_persistent_services(config: &PosConfig) -> Result<AppServices, ServiceError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or(ConfigError::Missing { key: "DATABASE_URL" })?;

    let store = PostgresPosStore::connect(database_url).await?;
    store.migrate().await?;
    let sequence = RedisSequence::new(&config.redis_url)?;

    tracing::info!("using postgres store with redis receipt sequence");
    assemble(Arc::new(store), Arc::new(sequence), config, "persistent")
}

fn assemble(
    store: Arc<dyn PosStore>,
    sequence: Arc<dyn SequenceGenerator>,
    config: &PosConfig,
    backend: &'static str,
) -> Result<AppServices, ServiceError> {
    let engine_config = config.engine_config()?;
    let receipts = ReceiptNumberAllocator::new(sequence, engine_config.clock);
    let bus: PosBus = Arc::new(InMemoryEventBus::new());

    // Realtime channel (SSE): lossy broadcast.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> realtime channel.
    {
        let sub = bus.subscribe();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            while let Ok(envelope) = sub.recv() {
                let payload = match serde_json::to_value(&envelope) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode event for realtime relay");
                        continue;
                    }
                };
                // No receivers is fine; nobody is watching the dashboard.
                let _ = realtime_tx.send(RealtimeMessage {
                    topic: envelope.event_type().to_string(),
                    payload,
                });
            }
        });
    }
    tracing::debug!(subscribers = bus.subscriber_count(), "realtime relay attached");

    let engine = SaleEngine::new(
        store,
        receipts,
        Arc::new(RecordingGateway::new()),
        bus,
        engine_config,
    );

    Ok(AppServices {
        engine: Arc::new(engine),
        realtime_tx,
        backend,
    })
}

/// Periodically expire mobile-money payments nobody confirmed in time.
pub fn spawn_expiry_sweep(engine: Arc<PosEngine>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match engine.expire_pending_payments(Utc::now()).await {
                Ok(expired) if !expired.is_empty() => {
                    tracing::info!(count = expired.len(), "expired pending mobile money payments");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "mobile money expiry sweep failed"),
            }
        }
    })
}

/// The stream owns its broadcast receiver and outlives the borrow of `services`.
pub fn event_sse_stream(
    services: &AppServices,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>> + use<>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
