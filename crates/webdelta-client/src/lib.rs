pub mod extractors;
pub mod fetcher;

pub use extractors::{BodyExtractor, DigestExtractor, JsonPointerExtractor, parse_extractor};
pub use fetcher::ReqwestFetcher;
