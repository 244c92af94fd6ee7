//! Consumer pool: one dispatcher plus N workers draining one tenant queue
//! into that tenant's partition.
//!
//! The dispatcher forwards deliveries in broker-FIFO order into a bounded job
//! buffer; a full buffer blocks the dispatcher, which in turn slows broker
//! delivery. Workers compete for the buffer, so interleaving across workers
//! is arbitrary and insertion order is not guaranteed to match delivery
//! order. Every suspension point also observes the pool's cancellation
//! token.
//!
//! Deliveries are auto-acknowledged at consumption, so an insert failure
//! means the message is logged and dropped, and an insert abandoned at
//! cancellation is equivalent to a drop.
use crate::model::Message;
use crate::store::MessageStore;
use futures_util::StreamExt;
use hive_broker::{Broker, Channel as _, Delivery};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// Back-pressure window between broker delivery and persistence.
const JOB_BUFFER_CAPACITY: usize = 100;

pub(crate) struct PoolSpec {
    pub tenant_id: Uuid,
    pub queue: String,
    pub workers: usize,
    pub cancel: CancellationToken,
}

/// Run one tenant's pool to completion.
///
/// Returns when cancelled or when the delivery stream ends (channel or
/// connection close). Either way the channel is closed, the job buffer is
/// closed, and the workers are drained before returning; the controller
/// holds the task's join handle as the pool's completion signal.
pub(crate) async fn run_pool(
    broker: Arc<dyn Broker>,
    store: Arc<dyn MessageStore>,
    spec: PoolSpec,
) {
    let channel = match broker.open_channel().await {
        Ok(channel) => channel,
        Err(err) => {
            tracing::error!(error = %err, tenant_id = %spec.tenant_id, "failed to open consumer channel");
            return;
        }
    };
    let consumer_tag = format!("consumer-{}", spec.tenant_id);
    let mut deliveries = match channel.consume(&spec.queue, &consumer_tag).await {
        Ok(deliveries) => deliveries,
        Err(err) => {
            tracing::error!(error = %err, tenant_id = %spec.tenant_id, "failed to start consuming");
            return;
        }
    };

    let (job_tx, job_rx) = mpsc::channel::<Delivery>(JOB_BUFFER_CAPACITY);
    let job_rx = Arc::new(Mutex::new(job_rx));

    let mut workers = Vec::with_capacity(spec.workers);
    for worker_id in 0..spec.workers {
        workers.push(tokio::spawn(worker_loop(
            worker_id,
            spec.tenant_id,
            Arc::clone(&store),
            Arc::clone(&job_rx),
            spec.cancel.clone(),
        )));
    }

    loop {
        tokio::select! {
            _ = spec.cancel.cancelled() => break,
            delivery = deliveries.next() => match delivery {
                Some(delivery) => {
                    // Full buffer blocks here until a worker frees a slot.
                    tokio::select! {
                        _ = spec.cancel.cancelled() => break,
                        sent = job_tx.send(delivery) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    // Transport failure or queue deletion; terminal for the
                    // pool, the controller does not restart it.
                    tracing::warn!(tenant_id = %spec.tenant_id, "delivery stream ended, pool terminating");
                    break;
                }
            }
        }
    }

    if let Err(err) = channel.close().await {
        tracing::debug!(error = %err, tenant_id = %spec.tenant_id, "consumer channel close failed");
    }
    drop(job_tx);
    let _ = futures_util::future::join_all(workers).await;
    tracing::info!(tenant_id = %spec.tenant_id, "consumer pool shut down");
}

async fn worker_loop(
    worker_id: usize,
    tenant_id: Uuid,
    store: Arc<dyn MessageStore>,
    jobs: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    cancel: CancellationToken,
) {
    loop {
        let delivery = {
            let mut jobs = jobs.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                delivery = jobs.recv() => delivery,
            }
        };
        // Buffer closed: dispatcher is gone and the backlog is drained.
        let Some(delivery) = delivery else { return };

        let message = Message::new(tenant_id, delivery.body.to_vec());
        tracing::debug!(
            worker = worker_id,
            tenant_id = %tenant_id,
            message_id = %message.id,
            "processing delivery"
        );
        tokio::select! {
            // Cancellation abandons the in-flight write; under auto-ack this
            // is indistinguishable from a drop.
            _ = cancel.cancelled() => return,
            result = store.insert(&message) => match result {
                Ok(()) => {
                    metrics::counter!("ingest_consumed_messages_total").increment(1);
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        tenant_id = %tenant_id,
                        message_id = %message.id,
                        "insert failed, delivery dropped"
                    );
                }
            }
        }
    }
}
