//! Market data: providers and multi-ticker loading

pub mod market;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use market::{bars_to_frame, fetch_market_data, MarketData};
pub use provider::{Bar, DataError, DataProvider, DataSource, PriceHistory};
pub use synthetic::{FixtureProvider, SyntheticProvider};
pub use yahoo::{RetryPolicy, YahooProvider};
