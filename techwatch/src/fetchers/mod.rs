pub mod feed;
pub mod forum;
pub mod http;
pub mod social;
pub mod web;

pub use feed::FeedFetcher;
pub use forum::ForumFetcher;
pub use http::HttpClient;
pub use social::SocialFetcher;
pub use web::WebFetcher;
