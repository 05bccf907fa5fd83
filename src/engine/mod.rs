pub mod bug_dedup;
pub mod explorer;
pub mod loop_detection;
pub mod navigation_planner;
pub mod retry;
pub mod url_discovery;

pub use bug_dedup::BugDeduplicationService;
pub use explorer::ExplorationAgent;
pub use loop_detection::LoopDetectionService;
pub use navigation_planner::NavigationPlanner;
pub use url_discovery::UrlDiscoveryService;
