//! Fleet-level derivations for maintenance planning and the operations dashboard.

pub mod dashboard;
pub mod maintenance;

pub use dashboard::{dashboard_metrics, DashboardMetrics};
pub use maintenance::{
    analytics, maintenance_record, predict_maintenance, MaintenanceAnalytics, MaintenanceRecord,
    MaintenanceStatus,
};
