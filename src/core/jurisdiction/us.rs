//! United States federal tables (2024), flat state tax, RMDs and Social Security.

use super::Jurisdiction;
use crate::core::distribution::{
    MandatoryDistributionEntry as E, MandatoryDistributionTable, RequiredValue, TerminalPolicy,
};
use crate::core::tax::{self, CapitalGainsTreatment, TaxSchedule};
use crate::core::types::{
    AccountCategory, BenefitEntry, BenefitSource, FilingStatus, JurisdictionCode, Profile,
    TaxBracket,
};

pub const SINGLE_STANDARD_DEDUCTION: f64 = 14_600.0;
pub const MARRIED_JOINT_STANDARD_DEDUCTION: f64 = 29_200.0;
pub const SOCIAL_SECURITY_TAXABLE_FRACTION: f64 = 0.85;
pub const RMD_START_AGE: u32 = 73;

static SINGLE_BRACKETS: [TaxBracket; 7] = [
    TaxBracket::new(0.0, 11_600.0, 0.10),
    TaxBracket::new(11_600.0, 47_150.0, 0.12),
    TaxBracket::new(47_150.0, 100_525.0, 0.22),
    TaxBracket::new(100_525.0, 191_950.0, 0.24),
    TaxBracket::new(191_950.0, 243_725.0, 0.32),
    TaxBracket::new(243_725.0, 609_350.0, 0.35),
    TaxBracket::new(609_350.0, f64::INFINITY, 0.37),
];

static MARRIED_JOINT_BRACKETS: [TaxBracket; 7] = [
    TaxBracket::new(0.0, 23_200.0, 0.10),
    TaxBracket::new(23_200.0, 94_300.0, 0.12),
    TaxBracket::new(94_300.0, 201_050.0, 0.22),
    TaxBracket::new(201_050.0, 383_900.0, 0.24),
    TaxBracket::new(383_900.0, 487_450.0, 0.32),
    TaxBracket::new(487_450.0, 731_200.0, 0.35),
    TaxBracket::new(731_200.0, f64::INFINITY, 0.37),
];

static SINGLE_GAINS_BRACKETS: [TaxBracket; 3] = [
    TaxBracket::new(0.0, 47_025.0, 0.0),
    TaxBracket::new(47_025.0, 518_900.0, 0.15),
    TaxBracket::new(518_900.0, f64::INFINITY, 0.20),
];

static MARRIED_JOINT_GAINS_BRACKETS: [TaxBracket; 3] = [
    TaxBracket::new(0.0, 94_050.0, 0.0),
    TaxBracket::new(94_050.0, 583_750.0, 0.15),
    TaxBracket::new(583_750.0, f64::INFINITY, 0.20),
];

// IRS Uniform Lifetime Table divisors.
static UNIFORM_LIFETIME: [E; 48] = [
    E::new(73, 26.5),
    E::new(74, 25.5),
    E::new(75, 24.6),
    E::new(76, 23.7),
    E::new(77, 22.9),
    E::new(78, 22.0),
    E::new(79, 21.1),
    E::new(80, 20.2),
    E::new(81, 19.4),
    E::new(82, 18.5),
    E::new(83, 17.7),
    E::new(84, 16.8),
    E::new(85, 16.0),
    E::new(86, 15.2),
    E::new(87, 14.4),
    E::new(88, 13.7),
    E::new(89, 12.9),
    E::new(90, 12.2),
    E::new(91, 11.5),
    E::new(92, 10.8),
    E::new(93, 10.1),
    E::new(94, 9.5),
    E::new(95, 8.9),
    E::new(96, 8.4),
    E::new(97, 7.8),
    E::new(98, 7.3),
    E::new(99, 6.8),
    E::new(100, 6.4),
    E::new(101, 6.0),
    E::new(102, 5.6),
    E::new(103, 5.2),
    E::new(104, 4.9),
    E::new(105, 4.6),
    E::new(106, 4.3),
    E::new(107, 4.1),
    E::new(108, 3.9),
    E::new(109, 3.7),
    E::new(110, 3.5),
    E::new(111, 3.4),
    E::new(112, 3.3),
    E::new(113, 3.1),
    E::new(114, 3.0),
    E::new(115, 2.9),
    E::new(116, 2.8),
    E::new(117, 2.7),
    E::new(118, 2.5),
    E::new(119, 2.3),
    E::new(120, 2.0),
];

static RMD_TABLE: MandatoryDistributionTable = MandatoryDistributionTable {
    start_age: RMD_START_AGE,
    kind: RequiredValue::Divisor,
    entries: &UNIFORM_LIFETIME,
    terminal: TerminalPolicy::Flatline,
};

pub fn ordinary_brackets(status: FilingStatus) -> &'static [TaxBracket] {
    match status {
        FilingStatus::Single => &SINGLE_BRACKETS,
        FilingStatus::MarriedJoint => &MARRIED_JOINT_BRACKETS,
    }
}

pub fn capital_gains_brackets(status: FilingStatus) -> &'static [TaxBracket] {
    match status {
        FilingStatus::Single => &SINGLE_GAINS_BRACKETS,
        FilingStatus::MarriedJoint => &MARRIED_JOINT_GAINS_BRACKETS,
    }
}

pub fn standard_deduction(status: FilingStatus) -> f64 {
    match status {
        FilingStatus::Single => SINGLE_STANDARD_DEDUCTION,
        FilingStatus::MarriedJoint => MARRIED_JOINT_STANDARD_DEDUCTION,
    }
}

fn schedule(status: FilingStatus) -> TaxSchedule {
    TaxSchedule {
        brackets: ordinary_brackets(status),
        deduction: standard_deduction(status),
        capital_gains: CapitalGainsTreatment::Stacked(capital_gains_brackets(status)),
    }
}

/// Bracket tax on already-taxable income (no deduction applied).
pub fn ordinary_income_tax(taxable_income: f64, status: FilingStatus) -> f64 {
    tax::ordinary_income_tax(taxable_income, ordinary_brackets(status))
}

pub fn total_federal_tax(ordinary_income: f64, capital_gains: f64, status: FilingStatus) -> f64 {
    schedule(status).tax(ordinary_income, capital_gains)
}

pub fn marginal_rate(current_taxable_income: f64, status: FilingStatus) -> f64 {
    schedule(status).marginal_rate(current_taxable_income)
}

pub fn room_to_fill_bracket(
    current_ordinary_income: f64,
    target_rate: f64,
    status: FilingStatus,
) -> f64 {
    schedule(status).room_to_fill_bracket(current_ordinary_income, target_rate)
}

#[derive(Copy, Clone, Debug, Default)]
pub struct UnitedStates;

impl Jurisdiction for UnitedStates {
    fn code(&self) -> JurisdictionCode {
        JurisdictionCode::Us
    }

    fn federal_schedule(&self, status: FilingStatus) -> TaxSchedule {
        schedule(status)
    }

    fn sub_national_tax(&self, ordinary_income: f64, capital_gains: f64, flat_rate: f64) -> f64 {
        tax::state_tax(ordinary_income.max(0.0) + capital_gains.max(0.0), flat_rate)
    }

    fn mandatory_distributions(&self) -> &MandatoryDistributionTable {
        &RMD_TABLE
    }

    fn is_subject_to_mandatory_distribution(&self, category: AccountCategory) -> bool {
        match category {
            AccountCategory::PretaxDeferred | AccountCategory::PretaxMatched => true,
            // Foreign registered plans carry no US RMD rule here.
            AccountCategory::Rrsp | AccountCategory::Rrif => false,
            AccountCategory::Roth
            | AccountCategory::Brokerage
            | AccountCategory::HealthSavings
            | AccountCategory::Tfsa => false,
        }
    }

    fn benefits(&self, profile: &Profile, age: u32, _income_estimate: f64) -> Vec<BenefitEntry> {
        profile
            .primary_benefit
            .filter(|claim| age >= claim.start_age)
            .map(|claim| {
                let annual = claim.annual_amount.max(0.0);
                BenefitEntry {
                    source: BenefitSource::SocialSecurity,
                    age,
                    monthly_amount: annual / 12.0,
                    annual_amount: annual,
                    taxable_fraction: SOCIAL_SECURITY_TAXABLE_FRACTION,
                    clawback: 0.0,
                }
            })
            .into_iter()
            .collect()
    }

    fn category_group(&self, category: AccountCategory) -> &'static str {
        match category {
            AccountCategory::PretaxDeferred
            | AccountCategory::PretaxMatched
            | AccountCategory::Rrsp
            | AccountCategory::Rrif => "401(k)/IRA",
            AccountCategory::Roth | AccountCategory::Tfsa => "Roth",
            AccountCategory::Brokerage => "Brokerage",
            AccountCategory::HealthSavings => "HSA",
        }
    }
}
