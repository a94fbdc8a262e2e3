use serde::{Deserialize, Serialize};

use super::error::{ProjectionError, Result};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountCategory {
    #[serde(alias = "pretaxDeferred", alias = "pretax_deferred", alias = "traditional")]
    PretaxDeferred,
    #[serde(alias = "pretaxMatched", alias = "pretax_matched", alias = "401k")]
    PretaxMatched,
    Roth,
    #[serde(alias = "taxable")]
    Brokerage,
    #[serde(alias = "healthSavings", alias = "health_savings", alias = "hsa")]
    HealthSavings,
    Rrsp,
    Rrif,
    Tfsa,
}

impl AccountCategory {
    pub fn treatment(self) -> TaxTreatment {
        match self {
            AccountCategory::PretaxDeferred
            | AccountCategory::PretaxMatched
            | AccountCategory::Rrsp
            | AccountCategory::Rrif => TaxTreatment::Pretax,
            AccountCategory::Roth | AccountCategory::Tfsa => TaxTreatment::TaxExempt,
            AccountCategory::Brokerage => TaxTreatment::Taxable,
            AccountCategory::HealthSavings => TaxTreatment::MedicalExempt,
        }
    }

    pub fn has_employer_match(self) -> bool {
        match self {
            AccountCategory::PretaxMatched => true,
            AccountCategory::PretaxDeferred
            | AccountCategory::Roth
            | AccountCategory::Brokerage
            | AccountCategory::HealthSavings
            | AccountCategory::Rrsp
            | AccountCategory::Rrif
            | AccountCategory::Tfsa => false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxTreatment {
    Pretax,
    TaxExempt,
    Taxable,
    MedicalExempt,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    #[serde(
        alias = "marriedJoint",
        alias = "married_joint",
        alias = "married_filing_jointly",
        alias = "mfj"
    )]
    MarriedJoint,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JurisdictionCode {
    #[serde(alias = "usa", alias = "united-states")]
    Us,
    #[serde(alias = "ca", alias = "can")]
    Canada,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EmployerMatch {
    /// Fraction of the employee contribution matched, e.g. 0.5.
    pub rate: f64,
    /// Dollar cap on the match per year; `None` means uncapped.
    pub annual_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub category: AccountCategory,
    pub balance: f64,
    pub annual_contribution: f64,
    pub contribution_growth_rate: f64,
    pub return_rate: f64,
    pub employer_match: Option<EmployerMatch>,
}

impl Account {
    pub fn new(id: impl Into<String>, category: AccountCategory, balance: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category,
            balance,
            annual_contribution: 0.0,
            contribution_growth_rate: 0.0,
            return_rate: 0.0,
            employer_match: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let err = |field, reason| ProjectionError::Account {
            account_id: self.id.clone(),
            field,
            reason,
        };

        if !self.balance.is_finite() || self.balance < 0.0 {
            return Err(err("balance", "must be finite and >= 0"));
        }
        if !self.annual_contribution.is_finite() || self.annual_contribution < 0.0 {
            return Err(err("annual contribution", "must be finite and >= 0"));
        }
        if !self.contribution_growth_rate.is_finite() || self.contribution_growth_rate <= -1.0 {
            return Err(err("contribution growth rate", "must be > -100%"));
        }
        if !self.return_rate.is_finite() || self.return_rate <= -1.0 {
            return Err(err("return rate", "must be > -100%"));
        }
        if let Some(m) = self.employer_match {
            if !m.rate.is_finite() || m.rate < 0.0 {
                return Err(err("employer match rate", "must be finite and >= 0"));
            }
            if m
                .annual_limit
                .is_some_and(|limit| !limit.is_finite() || limit < 0.0)
            {
                return Err(err("employer match limit", "must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BenefitClaim {
    /// Annual amount in today's money at the reference age (65 for CPP/OAS).
    pub annual_amount: f64,
    pub start_age: u32,
}

/// Oldest age a plan may run to.
pub const MAX_PLANNING_AGE: u32 = 130;
pub const MIN_BASE_YEAR: i32 = 1900;
pub const MAX_BASE_YEAR: i32 = 2200;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    pub filing_status: FilingStatus,
    pub state_tax_rate: f64,
    pub jurisdiction: JurisdictionCode,
    /// Calendar year at `current_age`.
    pub base_year: i32,
    /// Social Security (US) or CPP (Canada).
    pub primary_benefit: Option<BenefitClaim>,
    /// OAS; ignored by jurisdictions without a secondary benefit.
    pub secondary_benefit: Option<BenefitClaim>,
}

impl Profile {
    pub fn years_to_retirement(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }

    pub fn calendar_year(&self, age: u32) -> i32 {
        let year = i64::from(self.base_year) + i64::from(age) - i64::from(self.current_age);
        year.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.retirement_age <= self.current_age {
            return Err(ProjectionError::RetirementAge {
                current_age: self.current_age,
                retirement_age: self.retirement_age,
            });
        }
        if self.life_expectancy <= self.retirement_age {
            return Err(ProjectionError::LifeExpectancy {
                retirement_age: self.retirement_age,
                life_expectancy: self.life_expectancy,
            });
        }
        if self.life_expectancy > MAX_PLANNING_AGE {
            return Err(ProjectionError::HorizonTooLong {
                life_expectancy: self.life_expectancy,
                max_age: MAX_PLANNING_AGE,
            });
        }
        if !(MIN_BASE_YEAR..=MAX_BASE_YEAR).contains(&self.base_year) {
            return Err(ProjectionError::BaseYear {
                base_year: self.base_year,
                min_year: MIN_BASE_YEAR,
                max_year: MAX_BASE_YEAR,
            });
        }
        if !(0.0..=1.0).contains(&self.state_tax_rate) {
            return Err(ProjectionError::Assumption {
                field: "state tax rate",
                reason: "must be between 0 and 100%",
            });
        }
        for claim in [self.primary_benefit, self.secondary_benefit]
            .into_iter()
            .flatten()
        {
            if !claim.annual_amount.is_finite() || claim.annual_amount < 0.0 {
                return Err(ProjectionError::Assumption {
                    field: "benefit amount",
                    reason: "must be finite and >= 0",
                });
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Assumptions {
    pub inflation_rate: f64,
    pub safe_withdrawal_rate: f64,
    /// Applied to every account during drawdown, replacing per-account returns.
    pub retirement_return_rate: f64,
    /// Ordinary bracket rate to fill with pretax withdrawals; provider default when `None`.
    pub bracket_fill_rate: Option<f64>,
}

impl Assumptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.inflation_rate.is_finite() || self.inflation_rate <= -1.0 {
            return Err(ProjectionError::Assumption {
                field: "inflation rate",
                reason: "must be > -100%",
            });
        }
        if !(0.0..=1.0).contains(&self.safe_withdrawal_rate) {
            return Err(ProjectionError::Assumption {
                field: "safe withdrawal rate",
                reason: "must be between 0 and 100%",
            });
        }
        if !self.retirement_return_rate.is_finite() || self.retirement_return_rate <= -1.0 {
            return Err(ProjectionError::Assumption {
                field: "retirement return rate",
                reason: "must be > -100%",
            });
        }
        if self
            .bracket_fill_rate
            .is_some_and(|rate| !(0.0..=1.0).contains(&rate))
        {
            return Err(ProjectionError::Assumption {
                field: "bracket fill rate",
                reason: "must be between 0 and 100%",
            });
        }
        Ok(())
    }
}

/// Half-open range `[min, max)` taxed at `rate`. The top bracket uses `f64::INFINITY`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub min: f64,
    pub max: f64,
    pub rate: f64,
}

impl TaxBracket {
    pub const fn new(min: f64, max: f64, rate: f64) -> Self {
        Self { min, max, rate }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAmount {
    pub account_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountYear {
    pub account_id: String,
    pub balance: f64,
    pub contribution: f64,
    pub employer_match: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationYear {
    pub age: u32,
    pub year: i32,
    pub accounts: Vec<AccountYear>,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentTotals {
    pub pretax: f64,
    pub tax_exempt: f64,
    pub taxable: f64,
    pub medical_exempt: f64,
}

impl TreatmentTotals {
    pub fn add(&mut self, treatment: TaxTreatment, amount: f64) {
        match treatment {
            TaxTreatment::Pretax => self.pretax += amount,
            TaxTreatment::TaxExempt => self.tax_exempt += amount,
            TaxTreatment::Taxable => self.taxable += amount,
            TaxTreatment::MedicalExempt => self.medical_exempt += amount,
        }
    }

    pub fn total(&self) -> f64 {
        self.pretax + self.tax_exempt + self.taxable + self.medical_exempt
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTotal {
    pub group: &'static str,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationResult {
    pub years: Vec<AccumulationYear>,
    pub final_balances: Vec<AccountAmount>,
    pub total_at_retirement: f64,
    pub by_treatment: TreatmentTotals,
    pub by_group: Vec<GroupTotal>,
    pub total_contributions: f64,
    pub total_employer_match: f64,
}

impl AccumulationResult {
    pub fn final_balance(&self, account_id: &str) -> Option<f64> {
        self.final_balances
            .iter()
            .find(|b| b.account_id == account_id)
            .map(|b| b.amount)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenefitSource {
    SocialSecurity,
    CanadaPension,
    OldAgeSecurity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitEntry {
    pub source: BenefitSource,
    pub age: u32,
    pub monthly_amount: f64,
    /// Net of any clawback.
    pub annual_amount: f64,
    pub taxable_fraction: f64,
    pub clawback: f64,
}

impl BenefitEntry {
    pub fn taxable_amount(&self) -> f64 {
        self.annual_amount * self.taxable_fraction
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyWithdrawal {
    pub age: u32,
    pub year: i32,
    pub withdrawals: Vec<AccountAmount>,
    pub balances: Vec<AccountAmount>,
    pub total_withdrawal: f64,
    pub benefits: Vec<BenefitEntry>,
    pub benefit_income: f64,
    pub ordinary_income: f64,
    pub capital_gains: f64,
    /// Withdrawals plus the taxable portion of benefits.
    pub gross_income: f64,
    /// Withdrawals plus all benefit cash received.
    pub cash_income: f64,
    pub federal_tax: f64,
    pub state_tax: f64,
    pub total_tax: f64,
    pub after_tax_income: f64,
    pub target_spending: f64,
    pub mandatory_distribution: f64,
    pub shortfall: f64,
    pub total_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDepletion {
    pub account_id: String,
    pub depletion_age: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementResult {
    pub years: Vec<YearlyWithdrawal>,
    pub depletion_age: Option<u32>,
    pub lifetime_taxes: f64,
    pub sustainable_annual_withdrawal: f64,
    pub sustainable_monthly_withdrawal: f64,
    pub account_depletion: Vec<AccountDepletion>,
    pub final_balance: f64,
}
