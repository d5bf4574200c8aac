pub mod allocations;
pub mod common;
pub mod costs;
pub mod lots;
pub mod pens;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{AllocationService, CostAccumulator, LotService, PenService};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub lots: Arc<LotService>,
    pub pens: Arc<PenService>,
    pub allocations: Arc<AllocationService>,
    pub costs: Arc<CostAccumulator>,
}

impl AppServices {
    /// Builds every service over one shared pool and event channel.
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        let lots = Arc::new(LotService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.movement_history_limit,
        ));
        let pens = Arc::new(PenService::new(db_pool.clone(), event_sender.clone()));
        let allocations = Arc::new(AllocationService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let costs = Arc::new(CostAccumulator::new(
            db_pool,
            event_sender,
            config.negative_cost_policy(),
        ));

        Self {
            lots,
            pens,
            allocations,
            costs,
        }
    }
}
