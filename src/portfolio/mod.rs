mod service;

pub use service::{AssetSnapshot, PortfolioService};
