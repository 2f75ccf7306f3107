pub mod yahoo;

pub use yahoo::YahooFinanceProvider;
