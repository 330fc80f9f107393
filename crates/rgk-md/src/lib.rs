//! Market-data boundary: feed and options-chain capability traits plus
//! the deterministic replay implementations.

pub mod chain;
pub mod feed;
pub mod replay;

pub use chain::{assemble_chain_view, ChainError, OptionsChainProvider, StaticChainProvider};
pub use feed::{DataFeed, FeedError};
pub use replay::ReplayFeed;
