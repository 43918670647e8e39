//! Versioned ingress/egress message schema
//!
//! The wire transport (framing, sessions) lives outside the engine; these
//! envelopes define what it carries. Every request has a client-chosen
//! correlation id and every response echoes it.

use market_data::DepthSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::{CancelError, RejectReason};
use types::ids::{AccountId, MarketId, OrderId};
use types::order::OrderRequest;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Book,
    Trades,
}

/// Client → engine methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RequestBody {
    Submit(Box<OrderRequest>),
    Cancel {
        order_id: OrderId,
        owner: AccountId,
    },
    Amend {
        order_id: OrderId,
        owner: AccountId,
        new_price: Option<Decimal>,
        new_quantity: Option<Decimal>,
    },
    Subscribe {
        symbol: MarketId,
        stream: StreamKind,
    },
    Snapshot {
        symbol: MarketId,
        depth: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub correlation_id: String,
    pub version: u32,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// Engine → client results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResponseBody {
    Accepted {
        order_id: OrderId,
    },
    AcceptedPair {
        first: OrderId,
        second: OrderId,
    },
    Rejected {
        code: String,
        message: String,
    },
    Cancelled,
    CancelFailed {
        code: String,
    },
    Snapshot(DepthSnapshot),
    Subscribed {
        symbol: MarketId,
        stream: StreamKind,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub correlation_id: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    pub fn accepted(correlation_id: String, order_id: OrderId) -> Self {
        Self {
            correlation_id,
            body: ResponseBody::Accepted { order_id },
        }
    }

    pub fn rejected(correlation_id: String, reason: &RejectReason) -> Self {
        Self {
            correlation_id,
            body: ResponseBody::Rejected {
                code: reason.code().to_string(),
                message: reason.to_string(),
            },
        }
    }

    pub fn cancel_failed(correlation_id: String, error: CancelError) -> Self {
        let code = match error {
            CancelError::NotFound => "NOT_FOUND",
            CancelError::NotOwned => "NOT_OWNED",
            CancelError::Terminal => "TERMINAL",
        };
        Self {
            correlation_id,
            body: ResponseBody::CancelFailed {
                code: code.to_string(),
            },
        }
    }
}
