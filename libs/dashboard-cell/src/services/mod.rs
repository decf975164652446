pub mod aggregator;
pub mod dashboard;
pub mod projection;

pub use aggregator::DashboardAggregator;
pub use dashboard::DashboardService;
pub use projection::project_for_role;
