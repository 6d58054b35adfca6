//! Rate schedules: the annually published figures the formula runs on
//!
//! Nothing year-specific is compiled in. Schedules are loaded from data
//! files and looked up by financial year or by date.

mod care;
mod costs;
pub mod loader;
mod registry;
mod schedule;

pub use care::{BandRule, CareBand, CareBandRow, CareCostTable, RuleKind};
pub use costs::{
    classify_children, AgeGroup, CostBracket, CostOfChildren, CostRow, CostsOfChildrenTable,
    MAX_TABLE_CHILDREN,
};
pub use loader::{load_schedule, load_schedules};
pub use registry::RateRegistry;
pub use schedule::{RateSchedule, RatesApplied, ScheduleParameters};

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const BUNDLED_RATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/rates");

    pub fn bundled_registry() -> RateRegistry {
        RateRegistry::load_from_dir(BUNDLED_RATES).unwrap()
    }

    pub fn bundled_schedule(year: u16) -> RateSchedule {
        load_schedule(format!("{BUNDLED_RATES}/{year}")).unwrap()
    }
}
