pub mod normalizer;
pub mod pattern;
pub mod preprocessor;

pub use normalizer::UrlNormalizer;
pub use pattern::PatternDetector;
pub use preprocessor::{PreprocessOptions, PreprocessStats, UrlPreprocessor};
