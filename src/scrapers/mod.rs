pub mod extract;
pub mod realestate;
pub mod stream;
pub mod traits;
pub mod types;

pub use realestate::{CrawlerOptions, RealEstateCrawler, SOURCE_SITE};
pub use stream::{ListingSink, ListingStream};
pub use traits::ListingCrawler;
pub use types::build_request;
