pub mod stress;
pub mod time_allocation;
pub mod trend;

pub use stress::{StressAssessment, StressDetector, StressIndicators, StressObservation, StressTier};
pub use time_allocation::{DynamicTimeAllocator, TimeAllocation, TimeAllocationInput, TimeFactors};
pub use trend::{regression_slope, variance, TrendState};
