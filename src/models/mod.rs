mod position;

pub use position::{AssetClass, Position, PositionCurrency};
