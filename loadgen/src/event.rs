use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Topics the generator draws from. Every entry resolves to a payload schema
/// through [`PayloadSchema::for_topic`].
pub const TOPICS: &[&str] = &[
    "user.registration",
    "user.login",
    "user.logout",
    "order.created",
    "order.completed",
    "order.cancelled",
    "payment.initiated",
    "payment.completed",
    "payment.failed",
    "inventory.updated",
];

/// Producer identifiers stamped on generated events.
pub const SOURCES: &[&str] = &[
    "web-app-1",
    "web-app-2",
    "mobile-app-1",
    "mobile-app-2",
    "api-gateway-1",
    "api-gateway-2",
];

const USER_AGENTS: &[&str] = &["Mozilla/5.0", "Chrome/90.0", "Safari/14.0"];
const PAYMENT_METHODS: &[&str] = &["credit_card", "debit_card", "paypal", "bank_transfer"];
const PAYMENT_STATUSES: &[&str] = &["pending", "completed", "failed"];
const INVENTORY_ACTIONS: &[&str] = &["restock", "sold", "reserved", "returned"];

/// One ingestable unit, as submitted to the aggregator.
///
/// Identity is carried by `event_id` alone: a redelivery keeps every field but
/// the timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub event_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub payload: Payload,
}

impl Event {
    /// Re-emit this event as a late duplicate stamped with `timestamp`.
    pub fn redeliver(&self, timestamp: OffsetDateTime) -> Event {
        Event {
            timestamp,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    User {
        user_id: String,
        email: String,
        ip_address: String,
        user_agent: String,
    },
    Order {
        order_id: String,
        customer_id: String,
        amount: f64,
        items: u32,
        currency: String,
    },
    Payment {
        payment_id: String,
        order_id: String,
        amount: f64,
        method: String,
        status: String,
    },
    Inventory {
        product_id: String,
        quantity: u32,
        warehouse: String,
        action: String,
    },
    Generic {
        data: String,
    },
}

impl Payload {
    pub fn schema(&self) -> PayloadSchema {
        match self {
            Payload::User { .. } => PayloadSchema::User,
            Payload::Order { .. } => PayloadSchema::Order,
            Payload::Payment { .. } => PayloadSchema::Payment,
            Payload::Inventory { .. } => PayloadSchema::Inventory,
            Payload::Generic { .. } => PayloadSchema::Generic,
        }
    }
}

/// Payload family selected by topic prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadSchema {
    User,
    Order,
    Payment,
    Inventory,
    Generic,
}

impl PayloadSchema {
    /// Resolve the schema for a topic. Unknown prefixes fall back to `Generic`,
    /// so this never fails.
    pub fn for_topic(topic: &str) -> PayloadSchema {
        if topic.starts_with("user.") {
            PayloadSchema::User
        } else if topic.starts_with("order.") {
            PayloadSchema::Order
        } else if topic.starts_with("payment.") {
            PayloadSchema::Payment
        } else if topic.starts_with("inventory.") {
            PayloadSchema::Inventory
        } else {
            PayloadSchema::Generic
        }
    }

    /// Field names a payload of this schema serializes to.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            PayloadSchema::User => &["user_id", "email", "ip_address", "user_agent"],
            PayloadSchema::Order => &["order_id", "customer_id", "amount", "items", "currency"],
            PayloadSchema::Payment => &["payment_id", "order_id", "amount", "method", "status"],
            PayloadSchema::Inventory => &["product_id", "quantity", "warehouse", "action"],
            PayloadSchema::Generic => &["data"],
        }
    }

    pub fn generate<R: Rng + ?Sized>(self, rng: &mut R) -> Payload {
        match self {
            PayloadSchema::User => Payload::User {
                user_id: format!("user_{}", rng.gen_range(1000..=9999)),
                email: format!("user{}@example.com", rng.gen_range(1000..=9999)),
                ip_address: format!(
                    "{}.{}.{}.{}",
                    rng.gen_range(1..=255),
                    rng.gen_range(1..=255),
                    rng.gen_range(1..=255),
                    rng.gen_range(1..=255)
                ),
                user_agent: pick(rng, USER_AGENTS).to_string(),
            },
            PayloadSchema::Order => Payload::Order {
                order_id: format!("ORD-{}", rng.gen_range(10000..=99999)),
                customer_id: format!("user_{}", rng.gen_range(1000..=9999)),
                amount: amount(rng),
                items: rng.gen_range(1..=10),
                currency: "USD".to_string(),
            },
            PayloadSchema::Payment => Payload::Payment {
                payment_id: format!("PAY-{}", rng.gen_range(10000..=99999)),
                order_id: format!("ORD-{}", rng.gen_range(10000..=99999)),
                amount: amount(rng),
                method: pick(rng, PAYMENT_METHODS).to_string(),
                status: pick(rng, PAYMENT_STATUSES).to_string(),
            },
            PayloadSchema::Inventory => Payload::Inventory {
                product_id: format!("PROD-{}", rng.gen_range(1000..=9999)),
                quantity: rng.gen_range(0..=1000),
                warehouse: format!("WH-{}", rng.gen_range(1..=5)),
                action: pick(rng, INVENTORY_ACTIONS).to_string(),
            },
            PayloadSchema::Generic => Payload::Generic {
                data: "generic_event".to_string(),
            },
        }
    }
}

/// Uniform pick from one of the constant tables above, all of them non-empty.
pub(crate) fn pick<R: Rng + ?Sized>(rng: &mut R, options: &[&'static str]) -> &'static str {
    options.choose(rng).copied().unwrap_or_default()
}

// Monetary amount between 10.00 and 1000.00, drawn in whole cents.
fn amount<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(1_000u32..=100_000) as f64 / 100.0
}
