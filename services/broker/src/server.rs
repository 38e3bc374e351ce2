//! Broker instance: shared registries plus the TCP accept loop

use crate::connection::serve_connection;
use crate::dispatch::Dispatcher;
use crate::queues::QueueTable;
use crate::{BrokerConfig, BrokerResult};
use codec::{FrameCodec, MethodRegistry};
use exchange::ExchangeRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Everything connections share. Built once at startup.
#[derive(Debug)]
pub struct Broker {
    config: BrokerConfig,
    methods: Arc<MethodRegistry>,
    exchanges: Arc<ExchangeRegistry>,
    queues: Arc<QueueTable>,
    connections: AtomicU64,
}

impl Broker {
    pub fn from_config(config: BrokerConfig) -> BrokerResult<Self> {
        config.validate()?;
        let exchanges = Arc::new(config.build_exchanges()?);
        Ok(Self {
            config,
            methods: Arc::new(MethodRegistry::new()),
            exchanges,
            queues: Arc::new(QueueTable::new()),
            connections: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn exchanges(&self) -> &Arc<ExchangeRegistry> {
        &self.exchanges
    }

    pub fn queues(&self) -> &Arc<QueueTable> {
        &self.queues
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(Arc::clone(&self.methods))
            .with_max_frame_size(self.config.codec.max_frame_size)
    }

    /// Fresh per-connection dispatcher over the shared registries
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.exchanges), Arc::clone(&self.queues))
            .with_max_frame_size(self.config.codec.max_frame_size)
    }

    /// Accept connections forever, one task per connection
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> BrokerResult<()> {
        info!("Broker listening on {}", listener.local_addr()?);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let id = self.connections.fetch_add(1, Ordering::Relaxed);
                    info!("Connection {} accepted from {}", id, peer);

                    let codec = self.codec();
                    let dispatcher = self.dispatcher();
                    tokio::spawn(async move {
                        match serve_connection(stream, codec, dispatcher).await {
                            Ok(()) => info!("Connection {} closed", id),
                            Err(e) => warn!("Connection {} terminated: {}", id, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
