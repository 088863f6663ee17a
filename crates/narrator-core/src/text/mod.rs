//! Text processing for speech dispatch.
//!
//! - [`segmenter`]: split a streamed text into sentence-sized fragments
//! - [`directive`]: pull inline `<name arg>` stage directions out of a fragment
//! - [`normalize`]: pronunciation fixes and whitespace cleanup before TTS

pub mod directive;
pub mod normalize;
pub mod segmenter;

pub use directive::{Extracted, extract_directives};
pub use normalize::{TextNormalizer, collapse_whitespace};
pub use segmenter::{Segmenter, is_terminal, split_all};
