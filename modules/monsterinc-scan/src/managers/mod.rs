pub mod crawler;
pub mod probe;

pub use crawler::CrawlerManager;
pub use probe::ProbeManager;
