//! Live event subscriptions and historical event queries.
//!
//! At most one listener exists per `(contract, event)` pair: subscribing
//! again replaces the previous callback. Subscriptions are not restored
//! after the connection is re-established; callers re-subscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::dyn_abi::{DynSolType, DynSolValue, EventExt, Specifier};
use alloy::json_abi::Event;
use alloy::primitives::{keccak256, Address, B256};
use alloy::rpc::types::BlockNumberOrTag;
use chzkit_core::{AgentError, Result};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::contract::ContractHandle;
use crate::types::{ChainLog, LogQuery};

const MAX_TOPICS: usize = 4;

/// An ABI-decoded event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedLog {
    pub event: String,
    /// Indexed parameters in declaration order.
    #[serde(skip)]
    pub indexed: Vec<DynSolValue>,
    /// Non-indexed parameters in declaration order.
    #[serde(skip)]
    pub body: Vec<DynSolValue>,
    pub log: ChainLog,
}

/// Positional constraints on an event's indexed parameters.
///
/// `None` at a position matches any value. Dynamic types (`string`,
/// `bytes`, arrays) are matched by the keccak hash of their packed encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    values: Vec<Option<DynSolValue>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the next indexed parameter to equal `value`.
    pub fn arg(mut self, value: DynSolValue) -> Self {
        self.values.push(Some(value));
        self
    }

    /// Leaves the next indexed parameter unconstrained.
    pub fn any(mut self) -> Self {
        self.values.push(None);
        self
    }

    fn apply(&self, event: &Event, mut query: LogQuery) -> Result<LogQuery> {
        let indexed: Vec<_> = event.inputs.iter().filter(|p| p.indexed).collect();
        if self.values.len() > indexed.len() {
            return Err(AgentError::Validation(format!(
                "event '{}' has {} indexed parameter(s), filter has {}",
                event.name,
                indexed.len(),
                self.values.len()
            )));
        }
        let offset = usize::from(!event.anonymous);
        if indexed.len() + offset > MAX_TOPICS {
            return Err(AgentError::Validation(format!(
                "event '{}' needs {} topics, logs carry at most {MAX_TOPICS}",
                event.name,
                indexed.len() + offset
            )));
        }
        for (i, (param, value)) in indexed.iter().zip(&self.values).enumerate() {
            let Some(value) = value else { continue };
            let ty = Specifier::<DynSolType>::resolve(*param).map_err(|e| {
                AgentError::Validation(format!("unsupported ABI type in {}: {e}", event.name))
            })?;
            if !ty.matches(value) {
                return Err(AgentError::Validation(format!(
                    "filter value {i} of '{}': expected {ty}",
                    event.name
                )));
            }
            let topic = value
                .as_word()
                .unwrap_or_else(|| keccak256(value.abi_encode_packed()));
            query.topics[i + offset] = Some(topic);
        }
        Ok(query)
    }
}

fn base_query(contract: &ContractHandle, event: &Event) -> LogQuery {
    let query = LogQuery::new().address(contract.address());
    if event.anonymous {
        query
    } else {
        query.event_signature(event.selector())
    }
}

fn decode(event: &Event, log: ChainLog) -> Option<DecodedLog> {
    match event.decode_log(&log.log_data()) {
        Ok(decoded) => Some(DecodedLog {
            event: event.name.clone(),
            indexed: decoded.indexed,
            body: decoded.body,
            log,
        }),
        Err(e) => {
            warn!(event = %event.name, address = %log.address, error = %e, "undecodable log skipped");
            None
        }
    }
}

type Key = (Address, String);

struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn cancel(self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

#[derive(Default)]
struct Subscriptions(Mutex<HashMap<Key, Subscription>>);

impl Subscriptions {
    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Subscription>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Registry of live event listeners keyed by contract and event name.
pub struct EventSubscriptionRegistry {
    conn: Arc<ConnectionManager>,
    subs: Arc<Subscriptions>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventSubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriptionRegistry")
            .field("active", &self.subs.lock().len())
            .finish()
    }
}

impl EventSubscriptionRegistry {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self {
            conn,
            subs: Arc::new(Subscriptions::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Invokes `callback` for every `event_name` log `contract` emits from
    /// now on, in transport delivery order.
    ///
    /// Replaces any existing listener for the same pair. Callbacks run on a
    /// background task, independently of request/response calls.
    pub async fn subscribe<F>(&self, contract: &ContractHandle, event_name: &str, callback: F) -> Result<()>
    where
        F: Fn(DecodedLog) + Send + Sync + 'static,
    {
        let event = contract.event(event_name)?.clone();
        let query = base_query(contract, &event);
        let client = self.conn.client().await?;
        let stream = self.conn.observe(client.subscribe_logs(query).await).await?;

        let key: Key = (contract.address(), event.name.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));

        let mut subs = self.subs.lock();
        let task = tokio::spawn(listen(
            stream,
            event,
            callback,
            active.clone(),
            Listener {
                key: key.clone(),
                id,
                conn: self.conn.clone(),
                subs: self.subs.clone(),
            },
        ));
        let replaced = subs.insert(key.clone(), Subscription { id, active, task });
        drop(subs);

        match replaced {
            Some(old) => {
                old.cancel();
                info!(contract = %key.0, event = %key.1, "subscription replaced");
            }
            None => info!(contract = %key.0, event = %key.1, "subscribed"),
        }
        Ok(())
    }

    /// Removes the listener for `event_name`, or every listener on
    /// `contract` when `None`. Returns how many were removed.
    pub fn unsubscribe(&self, contract: Address, event_name: Option<&str>) -> usize {
        let removed: Vec<Subscription> = {
            let mut subs = self.subs.lock();
            let keys: Vec<Key> = subs
                .keys()
                .filter(|(addr, name)| *addr == contract && event_name.is_none_or(|n| n == name))
                .cloned()
                .collect();
            keys.iter().filter_map(|k| subs.remove(k)).collect()
        };
        let count = removed.len();
        removed.into_iter().for_each(Subscription::cancel);
        if count > 0 {
            info!(%contract, event = event_name.unwrap_or("*"), count, "unsubscribed");
        }
        count
    }

    /// Cancels every listener. Returns how many were removed.
    pub fn unsubscribe_all(&self) -> usize {
        let removed: Vec<Subscription> = self.subs.lock().drain().map(|(_, s)| s).collect();
        let count = removed.len();
        removed.into_iter().for_each(Subscription::cancel);
        if count > 0 {
            info!(count, "all subscriptions cancelled");
        }
        count
    }

    pub fn is_subscribed(&self, contract: Address, event_name: &str) -> bool {
        self.subs
            .lock()
            .contains_key(&(contract, event_name.to_string()))
    }

    pub fn active_subscriptions(&self) -> Vec<(Address, String)> {
        let mut keys: Vec<_> = self.subs.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Past `event_name` logs of `contract` in `[from_block, to_block]`,
    /// decoded and fully materialized.
    pub async fn get_historical(
        &self,
        contract: &ContractHandle,
        event_name: &str,
        filter: &EventFilter,
        from_block: impl Into<BlockNumberOrTag>,
        to_block: impl Into<BlockNumberOrTag>,
    ) -> Result<Vec<DecodedLog>> {
        let event = contract.event(event_name)?;
        let query = filter
            .apply(event, base_query(contract, event))?
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .conn
            .with_client(|c| async move { c.logs(&query).await })
            .await?;
        debug!(event = event_name, count = logs.len(), "historical logs fetched");
        Ok(logs.into_iter().filter_map(|log| decode(event, log)).collect())
    }
}

impl Drop for EventSubscriptionRegistry {
    fn drop(&mut self) {
        for (_, sub) in self.subs.lock().drain() {
            sub.cancel();
        }
    }
}

struct Listener {
    key: Key,
    id: u64,
    conn: Arc<ConnectionManager>,
    subs: Arc<Subscriptions>,
}

async fn listen<F>(
    mut stream: BoxStream<'static, ChainLog>,
    event: Event,
    callback: F,
    active: Arc<AtomicBool>,
    listener: Listener,
) where
    F: Fn(DecodedLog) + Send + Sync + 'static,
{
    while let Some(log) = stream.next().await {
        if !active.load(Ordering::SeqCst) {
            return;
        }
        if let Some(decoded) = decode(&event, log) {
            callback(decoded);
        }
    }

    if !active.load(Ordering::SeqCst) {
        return;
    }
    // The transport closed the stream underneath us.
    warn!(contract = %listener.key.0, event = %listener.key.1, "event stream ended, subscription dropped");
    {
        let mut subs = listener.subs.lock();
        if subs.get(&listener.key).is_some_and(|s| s.id == listener.id) {
            subs.remove(&listener.key);
        }
    }
    listener.conn.invalidate().await;
}
