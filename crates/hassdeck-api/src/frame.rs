// ── Wire format ──
//
// Request envelopes, inbound frame parsing, and message-id assignment.
// Every request except `auth` carries an `id`; the hub echoes it back on
// the matching `result` frame.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

/// State the hub reports from `get_config` once it is fully started.
pub const HUB_RUNNING: &str = "RUNNING";

// ── Requests ─────────────────────────────────────────────────────────

/// Outbound request payloads. The serde tag is the hub's command name.
#[derive(Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Auth {
        access_token: String,
    },
    GetConfig,
    GetStates,
    GetServices,
    SubscribeTrigger {
        trigger: Value,
    },
    UnsubscribeEvents {
        subscription: u64,
    },
    CallService {
        domain: String,
        service: String,
        target: Value,
        service_data: Value,
    },
}

impl Request {
    /// Subscribe to state changes of a single entity.
    pub fn subscribe_state(entity_id: &str) -> Self {
        Self::SubscribeTrigger {
            trigger: json!({ "platform": "state", "entity_id": entity_id }),
        }
    }

    /// Invoke `domain.action` against one entity.
    pub fn call_service(domain: &str, action: &str, entity_id: &str, data: Value) -> Self {
        let service_data = if data.is_null() { json!({}) } else { data };
        Self::CallService {
            domain: domain.to_owned(),
            service: action.to_owned(),
            target: json!({ "entity_id": entity_id }),
            service_data,
        }
    }

    /// The wire `type` of this request.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::GetConfig => "get_config",
            Self::GetStates => "get_states",
            Self::GetServices => "get_services",
            Self::SubscribeTrigger { .. } => "subscribe_trigger",
            Self::UnsubscribeEvents { .. } => "unsubscribe_events",
            Self::CallService { .. } => "call_service",
        }
    }

    /// The handshake frame is the only one sent without a message id.
    pub fn carries_id(&self) -> bool {
        !matches!(self, Self::Auth { .. })
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { .. } => f
                .debug_struct("Auth")
                .field("access_token", &"[REDACTED]")
                .finish(),
            Self::SubscribeTrigger { trigger } => f
                .debug_struct("SubscribeTrigger")
                .field("trigger", trigger)
                .finish(),
            Self::UnsubscribeEvents { subscription } => f
                .debug_struct("UnsubscribeEvents")
                .field("subscription", subscription)
                .finish(),
            Self::CallService {
                domain,
                service,
                target,
                service_data,
            } => f
                .debug_struct("CallService")
                .field("domain", domain)
                .field("service", service)
                .field("target", target)
                .field("service_data", service_data)
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// A request with its assigned message id, ready for the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub request: Request,
}

impl Envelope {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Message ids ──────────────────────────────────────────────────────

/// Monotonic message-id source, one per channel. Ids start at 1.
#[derive(Debug)]
pub struct MessageIds(AtomicU64);

impl MessageIds {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Take the next id. Never returns the same value twice.
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for MessageIds {
    fn default() -> Self {
        Self::new()
    }
}

// ── Inbound frames ───────────────────────────────────────────────────

/// Every frame shape the channel cares about. Anything else lands in
/// `Unknown` and is dropped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Inbound {
    AuthRequired,
    AuthOk,
    #[serde(alias = "auth_invalid")]
    AuthNok {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Value,
    },
    Event {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        event: Value,
    },
    #[serde(other)]
    Unknown,
}

/// Outcome of one correlated request.
///
/// [`Reply::empty`] (`success = false`, null result, empty error) is what
/// callers get when nothing was sent or the socket went away mid-request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    /// Message id the reply answered; `0` for an empty reply.
    pub id: u64,
    pub success: bool,
    pub result: Value,
    pub error: String,
}

impl Reply {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Flatten the hub's `error` field to text.
///
/// The hub sends `{"code": "...", "message": "..."}`; older builds send a
/// bare string. Missing means no error.
pub(crate) fn error_text(error: &Value) -> String {
    match error {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let message = obj.get("message").and_then(Value::as_str);
            let code = obj.get("code").and_then(Value::as_str);
            match (code, message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message.to_owned(),
                _ => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// A state snapshot as the hub sends it in `get_states` and events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// An entity change pushed by the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct HubEvent {
    /// Subscription the event belongs to, when the hub tags it.
    pub subscription: Option<u64>,
    pub entity_id: String,
    /// `None` when the entity was removed on the hub.
    pub new_state: Option<StateSnapshot>,
}

impl HubEvent {
    /// Extract an entity change from an `event` payload.
    ///
    /// Accepts both `state_changed` events (`data.new_state`) and state
    /// trigger subscriptions (`variables.trigger.to_state`). Only an explicit
    /// `null` state means the entity was removed. Returns `None` when the
    /// payload names no entity, carries no state field, or carries one that
    /// cannot be read.
    pub fn from_payload(subscription: Option<u64>, payload: &Value) -> Option<Self> {
        let data = payload
            .get("data")
            .filter(|d| d.get("entity_id").is_some())
            .or_else(|| payload.get("variables").and_then(|v| v.get("trigger")))?;

        let entity_id = data.get("entity_id").and_then(Value::as_str)?.to_owned();

        let Some(raw) = data.get("new_state").or_else(|| data.get("to_state")) else {
            debug!(entity_id, "event payload has no state field");
            return None;
        };
        let new_state = if raw.is_null() {
            None
        } else {
            match serde_json::from_value::<StateSnapshot>(raw.clone()) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    debug!(error = %e, entity_id, "unreadable state in event payload");
                    return None;
                }
            }
        };

        Some(Self {
            subscription,
            entity_id,
            new_state,
        })
    }
}

// ── Lenient field access ─────────────────────────────────────────────

/// Read a top-level string field from a raw frame.
///
/// Unparsable frames and missing or non-string fields all yield `""`.
pub fn field_str(text: &str, field: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        Err(e) => {
            debug!(error = %e, field, "unparsable frame");
            String::new()
        }
    }
}
