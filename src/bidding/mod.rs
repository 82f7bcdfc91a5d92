pub mod commands;
pub mod model;

pub use commands::{AdmissionError, AdmissionSettings, BidAdmissionPipeline, BidQuote};
pub use model::{Bid, BidId, BidRequest, UserId};
