//! LocalTransport - プロセス内のトランスポート
//!
//! `App::export` で登録された関数をキーで保持し、JSON のイベントから直接起動します。
//! ペイロードの形は種類ごとに異なります。
//!
//! | kind     | payload                                             |
//! |----------|-----------------------------------------------------|
//! | callable | `{ data, auth?, traceHeader?, executionId? }`       |
//! | pubsub   | CloudEvent（`data = { message, subscription }`）    |
//! | bus      | CloudEvent（`data` がエンベロープ）                 |
//! | custom   | `{ timestamp?, data, correlationId?, traceId?, ... }` |

use crate::app::Nack;
use crate::domain::event::{CallableInvocation, CloudEvent, EventKind, MessagePublishedData};
use crate::domain::status::HttpsError;
use crate::ports::{Endpoint, Registration, Transport};
use crate::typed::CustomEvent;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum LocalTransportError {
    #[error("no function exported as '{0}'")]
    UnknownFunction(String),
    #[error("payload for '{key}' is not a valid {kind} event: {source}")]
    Decode {
        key: String,
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Rpc(#[from] HttpsError),
    #[error(transparent)]
    Nack(#[from] Nack),
}

#[derive(Default)]
pub struct LocalTransport {
    functions: BTreeMap<String, (Registration, Endpoint)>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Registration> {
        self.functions.values().map(|(registration, _)| registration)
    }

    pub fn registration(&self, key: &str) -> Option<&Registration> {
        self.functions.get(key).map(|(registration, _)| registration)
    }

    /// 関数を起動する。イベント系は成功時に `null` を返す
    pub async fn invoke(&self, key: &str, payload: Value) -> Result<Value, LocalTransportError> {
        let (_, endpoint) = self
            .functions
            .get(key)
            .ok_or_else(|| LocalTransportError::UnknownFunction(key.to_string()))?;

        match endpoint {
            Endpoint::Callable(dispatcher) => {
                let invocation: CallableInvocation = decode(key, EventKind::Callable, payload)?;
                Ok(dispatcher.dispatch(invocation).await?)
            }
            Endpoint::PubSub(dispatcher) => {
                let event: CloudEvent<MessagePublishedData> = decode(key, EventKind::PubSub, payload)?;
                dispatcher.dispatch(event).await?;
                Ok(Value::Null)
            }
            Endpoint::Bus(dispatcher) => {
                let event: CloudEvent<Value> = decode(key, EventKind::Bus, payload)?;
                dispatcher.dispatch(event).await?;
                Ok(Value::Null)
            }
            Endpoint::Custom(dispatcher) => {
                let event: CustomEvent = decode(key, EventKind::Custom, payload)?;
                dispatcher.dispatch(event).await?;
                Ok(Value::Null)
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, kind: EventKind, payload: Value) -> Result<T, LocalTransportError> {
    serde_json::from_value(payload).map_err(|source| LocalTransportError::Decode {
        key: key.to_string(),
        kind,
        source,
    })
}

impl Transport for LocalTransport {
    type Exported = String;

    fn register_handler(&mut self, registration: &Registration, endpoint: Endpoint) -> String {
        tracing::debug!(kind = %registration.kind, key = %registration.key, trigger = %registration.trigger, "function registered");
        self.functions
            .insert(registration.key.clone(), (registration.clone(), endpoint));
        registration.key.clone()
    }
}
