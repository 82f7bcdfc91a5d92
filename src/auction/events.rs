use super::model::AuctionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 경매 룸으로 전파되는 도메인 이벤트
/// 직렬화 형태: `{"event": "<이름>", "data": {...}}`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum DomainEvent {
    // 입찰 이벤트
    #[serde(rename = "nueva_puja")]
    NewBid {
        #[serde(rename = "subastaId")]
        auction_id: AuctionId,
        #[serde(rename = "nuevoPrecio")]
        new_price: Decimal,
        #[serde(rename = "nombrePujador")]
        bidder_name: String,
        timestamp: DateTime<Utc>,
    },
    // 경매 연장 이벤트
    #[serde(rename = "subasta_extendida")]
    AuctionExtended {
        #[serde(rename = "subastaId")]
        auction_id: AuctionId,
        #[serde(rename = "nuevaHoraFin")]
        new_end_time: DateTime<Utc>,
        #[serde(rename = "minutosAñadidos")]
        minutes_added: i64,
    },
    // 경매 종료 이벤트
    #[serde(rename = "subasta_finalizada")]
    AuctionFinished {
        #[serde(rename = "subastaId")]
        auction_id: AuctionId,
        #[serde(rename = "ganador")]
        winner: Option<String>,
        #[serde(rename = "horaFin")]
        finish_time: DateTime<Utc>,
    },
    // 진행자 입장 이벤트
    #[serde(rename = "moderador_ingreso")]
    ModeratorJoined {
        #[serde(rename = "subastaId")]
        auction_id: AuctionId,
        #[serde(rename = "nombreModerador")]
        moderator_name: String,
        #[serde(rename = "horaIngreso")]
        join_time: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn auction_id(&self) -> AuctionId {
        match self {
            DomainEvent::NewBid { auction_id, .. }
            | DomainEvent::AuctionExtended { auction_id, .. }
            | DomainEvent::AuctionFinished { auction_id, .. }
            | DomainEvent::ModeratorJoined { auction_id, .. } => *auction_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::NewBid { .. } => "nueva_puja",
            DomainEvent::AuctionExtended { .. } => "subasta_extendida",
            DomainEvent::AuctionFinished { .. } => "subasta_finalizada",
            DomainEvent::ModeratorJoined { .. } => "moderador_ingreso",
        }
    }
}
