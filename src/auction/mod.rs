pub mod events;
pub mod lifecycle;
pub mod model;

pub use events::DomainEvent;
pub use lifecycle::{AuctionLifecycleManager, LifecycleError};
pub use model::{Auction, AuctionDraft, AuctionId, AuctionState};
