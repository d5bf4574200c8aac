pub mod cattle_lot;
pub mod cost_posting;
pub mod lot_movement;
pub mod lot_pen_allocation;
pub mod non_cash_expense;
pub mod pen;
pub mod sale_record;
pub mod weight_reading;

pub use cattle_lot::{Entity as CattleLot, LotStatus};
pub use cost_posting::{CostCategory, CostTarget, Entity as CostPosting};
pub use lot_movement::{Entity as LotMovement, MovementType};
pub use lot_pen_allocation::{AllocationStatus, Entity as LotPenAllocation};
pub use non_cash_expense::{Entity as NonCashExpense, NonCashExpenseType};
pub use pen::{Entity as Pen, PenStatus, PenType};
pub use sale_record::Entity as SaleRecord;
pub use weight_reading::Entity as WeightReading;
