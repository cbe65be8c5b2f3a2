mod phase;

pub use phase::ExchangePhase;
