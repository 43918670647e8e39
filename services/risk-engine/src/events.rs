//! Risk events for monitoring and alerting

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{AccountId, MarketId};
use uuid::Uuid;

use crate::liquidation::HealthLevel;

/// Event emitted by the position monitor and funding loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: Uuid,
    pub owner: AccountId,
    pub symbol: MarketId,
    pub kind: RiskEventKind,
    pub margin_ratio: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiskEventKind {
    /// Margin ratio inside 4× MMR.
    MarginWarning,
    /// Margin ratio inside 2× MMR.
    MarginCall,
    /// Margin ratio at or under MMR: position enqueued for liquidation.
    LiquidationTriggered,
    /// Funding boundary settled at this rate; `net_paid` positive means the
    /// owner paid.
    FundingSettled { rate: Decimal, net_paid: Decimal },
    /// Index too old; mark and liquidations frozen for the symbol.
    OracleStale,
}

impl RiskEvent {
    pub fn new(
        owner: AccountId,
        symbol: MarketId,
        kind: RiskEventKind,
        margin_ratio: Decimal,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner,
            symbol,
            kind,
            margin_ratio,
            timestamp,
        }
    }
}

/// Event for a health grade, if the grade warrants one.
pub fn event_for_health(
    owner: AccountId,
    symbol: &MarketId,
    health: HealthLevel,
    margin_ratio: Decimal,
    timestamp: i64,
) -> Option<RiskEvent> {
    let kind = match health {
        HealthLevel::Healthy => return None,
        HealthLevel::Warning => RiskEventKind::MarginWarning,
        HealthLevel::Danger => RiskEventKind::MarginCall,
        HealthLevel::Liquidation => RiskEventKind::LiquidationTriggered,
    };
    Some(RiskEvent::new(
        owner,
        symbol.clone(),
        kind,
        margin_ratio,
        timestamp,
    ))
}
