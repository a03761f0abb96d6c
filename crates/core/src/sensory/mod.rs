pub mod phrase;

pub use phrase::{PhraseAggregator, PhraseWindow};
