// Application state for HTTP handlers
use crate::application::connection::ConnectionManager;
use crate::application::projection::ProjectionEmitter;
use crate::application::unit_control::UnitControlService;
use crate::domain::window::PointBudgets;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub connection: Arc<ConnectionManager>,
    pub projection: ProjectionEmitter,
    pub control: UnitControlService,
    pub point_budgets: PointBudgets,
}
