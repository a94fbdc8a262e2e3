mod accumulation;
pub mod distribution;
mod error;
pub mod jurisdiction;
pub mod tax;
mod types;
mod withdrawal;

pub use accumulation::project_accumulation;
pub use distribution::mandatory_distribution;
pub use error::{ProjectionError, Result};
pub use jurisdiction::{IncomeTax, Jurisdiction};
pub use types::{
    Account, AccountAmount, AccountCategory, AccountDepletion, AccountYear, AccumulationResult,
    AccumulationYear, Assumptions, BenefitClaim, BenefitEntry, BenefitSource, EmployerMatch,
    FilingStatus, GroupTotal, JurisdictionCode, Profile, RetirementResult, TaxBracket,
    TaxTreatment, TreatmentTotals, YearlyWithdrawal,
};
pub use withdrawal::{BROKERAGE_GAIN_FRACTION, project_withdrawals};
