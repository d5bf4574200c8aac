pub mod allocation;
pub mod capacity;
pub mod costs;
pub mod lots;
pub mod movements;
pub mod pens;

pub use allocation::AllocationService;
pub use capacity::CapacityLedger;
pub use costs::CostAccumulator;
pub use lots::LotService;
pub use movements::MovementRecorder;
pub use pens::PenService;
