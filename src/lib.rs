pub mod app;
pub mod auction;
pub mod bidding;
pub mod clients;
pub mod config;
pub mod database;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod identity;
pub mod scheduler;
pub mod storage;
