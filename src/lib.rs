pub mod app;
pub mod config;
pub mod error;
pub mod history;
pub mod input;
pub mod navigation;
pub mod pnl;
pub mod quote;
pub mod ui;
pub mod watchlist;
