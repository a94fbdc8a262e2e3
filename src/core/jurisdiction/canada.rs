//! Canada: federal and Ontario brackets (2024), capital-gains inclusion,
//! RRIF minimums, CPP and OAS with recovery tax.

use super::Jurisdiction;
use crate::core::distribution::{
    MandatoryDistributionEntry as E, MandatoryDistributionTable, RequiredValue, TerminalPolicy,
};
use crate::core::tax::{CapitalGainsTreatment, TaxSchedule};
use crate::core::types::{
    AccountCategory, BenefitEntry, BenefitSource, FilingStatus, JurisdictionCode, Profile,
    TaxBracket,
};

pub const FEDERAL_BASIC_PERSONAL_AMOUNT: f64 = 15_705.0;
pub const PROVINCIAL_BASIC_PERSONAL_AMOUNT: f64 = 11_865.0;

pub const INCLUSION_RATE: f64 = 0.5;
pub const UPPER_INCLUSION_RATE: f64 = 2.0 / 3.0;
pub const INCLUSION_THRESHOLD: f64 = 250_000.0;

pub const RRIF_START_AGE: u32 = 72;

pub const BENEFIT_REFERENCE_AGE: u32 = 65;
pub const CPP_EARLIEST_AGE: u32 = 60;
pub const CPP_LATEST_AGE: u32 = 70;
pub const CPP_EARLY_REDUCTION_PER_MONTH: f64 = 0.006;
pub const CPP_LATE_INCREASE_PER_MONTH: f64 = 0.007;
pub const OAS_LATEST_AGE: u32 = 70;
pub const OAS_DEFERRAL_INCREASE_PER_MONTH: f64 = 0.006;
pub const OAS_RECOVERY_THRESHOLD: f64 = 90_997.0;
pub const OAS_RECOVERY_UPPER_THRESHOLD: f64 = 148_451.0;
pub const OAS_RECOVERY_RATE: f64 = 0.15;

static FEDERAL_BRACKETS: [TaxBracket; 5] = [
    TaxBracket::new(0.0, 55_867.0, 0.15),
    TaxBracket::new(55_867.0, 111_733.0, 0.205),
    TaxBracket::new(111_733.0, 173_205.0, 0.26),
    TaxBracket::new(173_205.0, 246_752.0, 0.29),
    TaxBracket::new(246_752.0, f64::INFINITY, 0.33),
];

static ONTARIO_BRACKETS: [TaxBracket; 5] = [
    TaxBracket::new(0.0, 51_446.0, 0.0505),
    TaxBracket::new(51_446.0, 102_894.0, 0.0915),
    TaxBracket::new(102_894.0, 150_000.0, 0.1116),
    TaxBracket::new(150_000.0, 220_000.0, 0.1216),
    TaxBracket::new(220_000.0, f64::INFINITY, 0.1316),
];

// Prescribed RRIF minimum withdrawal fractions.
static RRIF_MINIMUMS: [E; 23] = [
    E::new(72, 0.0540),
    E::new(73, 0.0553),
    E::new(74, 0.0567),
    E::new(75, 0.0582),
    E::new(76, 0.0598),
    E::new(77, 0.0617),
    E::new(78, 0.0636),
    E::new(79, 0.0658),
    E::new(80, 0.0682),
    E::new(81, 0.0708),
    E::new(82, 0.0738),
    E::new(83, 0.0771),
    E::new(84, 0.0808),
    E::new(85, 0.0851),
    E::new(86, 0.0899),
    E::new(87, 0.0955),
    E::new(88, 0.1021),
    E::new(89, 0.1099),
    E::new(90, 0.1192),
    E::new(91, 0.1306),
    E::new(92, 0.1449),
    E::new(93, 0.1634),
    E::new(94, 0.1879),
];

static RRIF_TABLE: MandatoryDistributionTable = MandatoryDistributionTable {
    start_age: RRIF_START_AGE,
    kind: RequiredValue::Fraction,
    entries: &RRIF_MINIMUMS,
    terminal: TerminalPolicy::Fixed(0.20),
};

const INCLUSION: CapitalGainsTreatment = CapitalGainsTreatment::Inclusion {
    rate: INCLUSION_RATE,
    threshold: INCLUSION_THRESHOLD,
    upper_rate: UPPER_INCLUSION_RATE,
};

pub fn federal_schedule() -> TaxSchedule {
    TaxSchedule {
        brackets: &FEDERAL_BRACKETS,
        deduction: FEDERAL_BASIC_PERSONAL_AMOUNT,
        capital_gains: INCLUSION,
    }
}

pub fn provincial_schedule() -> TaxSchedule {
    TaxSchedule {
        brackets: &ONTARIO_BRACKETS,
        deduction: PROVINCIAL_BASIC_PERSONAL_AMOUNT,
        capital_gains: INCLUSION,
    }
}

fn months_from_reference(start_age: u32) -> i64 {
    (i64::from(start_age) - i64::from(BENEFIT_REFERENCE_AGE)) * 12
}

/// CPP adjustment factor for a claim starting at `start_age` (clamped to 60..=70).
pub fn cpp_adjustment(start_age: u32) -> f64 {
    let months = months_from_reference(start_age.clamp(CPP_EARLIEST_AGE, CPP_LATEST_AGE));
    if months < 0 {
        1.0 - CPP_EARLY_REDUCTION_PER_MONTH * (-months) as f64
    } else {
        1.0 + CPP_LATE_INCREASE_PER_MONTH * months as f64
    }
}

/// OAS deferral factor; OAS cannot start before 65 and stops growing at 70.
pub fn oas_adjustment(start_age: u32) -> f64 {
    let months = months_from_reference(start_age.clamp(BENEFIT_REFERENCE_AGE, OAS_LATEST_AGE));
    1.0 + OAS_DEFERRAL_INCREASE_PER_MONTH * months as f64
}

/// Recovery tax on an OAS amount given assessed income.
pub fn oas_clawback(oas_amount: f64, income: f64) -> f64 {
    let oas_amount = oas_amount.max(0.0);
    if income <= OAS_RECOVERY_THRESHOLD {
        0.0
    } else if income >= OAS_RECOVERY_UPPER_THRESHOLD {
        oas_amount
    } else {
        (OAS_RECOVERY_RATE * (income - OAS_RECOVERY_THRESHOLD)).min(oas_amount)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Canada;

impl Jurisdiction for Canada {
    fn code(&self) -> JurisdictionCode {
        JurisdictionCode::Canada
    }

    fn federal_schedule(&self, _status: FilingStatus) -> TaxSchedule {
        federal_schedule()
    }

    fn sub_national_tax(&self, ordinary_income: f64, capital_gains: f64, _flat_rate: f64) -> f64 {
        provincial_schedule().tax(ordinary_income, capital_gains)
    }

    /// Net income counts only the included share of capital gains.
    fn assessable_income(&self, ordinary_income: f64, capital_gains: f64) -> f64 {
        ordinary_income.max(0.0) + INCLUSION.included_amount(capital_gains)
    }

    fn mandatory_distributions(&self) -> &MandatoryDistributionTable {
        &RRIF_TABLE
    }

    fn is_subject_to_mandatory_distribution(&self, category: AccountCategory) -> bool {
        match category {
            AccountCategory::Rrsp | AccountCategory::Rrif => true,
            AccountCategory::PretaxDeferred
            | AccountCategory::PretaxMatched
            | AccountCategory::Roth
            | AccountCategory::Brokerage
            | AccountCategory::HealthSavings
            | AccountCategory::Tfsa => false,
        }
    }

    fn benefits(&self, profile: &Profile, age: u32, income_estimate: f64) -> Vec<BenefitEntry> {
        let mut entries = Vec::with_capacity(2);

        if let Some(cpp) = profile.primary_benefit {
            let start_age = cpp.start_age.clamp(CPP_EARLIEST_AGE, CPP_LATEST_AGE);
            if age >= start_age {
                let annual = cpp.annual_amount.max(0.0) * cpp_adjustment(start_age);
                entries.push(BenefitEntry {
                    source: BenefitSource::CanadaPension,
                    age,
                    monthly_amount: annual / 12.0,
                    annual_amount: annual,
                    taxable_fraction: 1.0,
                    clawback: 0.0,
                });
            }
        }

        if let Some(oas) = profile.secondary_benefit {
            let start_age = oas.start_age.clamp(BENEFIT_REFERENCE_AGE, OAS_LATEST_AGE);
            if age >= start_age {
                let gross = oas.annual_amount.max(0.0) * oas_adjustment(start_age);
                let clawback = oas_clawback(gross, income_estimate);
                let annual = gross - clawback;
                entries.push(BenefitEntry {
                    source: BenefitSource::OldAgeSecurity,
                    age,
                    monthly_amount: annual / 12.0,
                    annual_amount: annual,
                    taxable_fraction: 1.0,
                    clawback,
                });
            }
        }

        entries
    }

    fn category_group(&self, category: AccountCategory) -> &'static str {
        match category {
            AccountCategory::Rrsp
            | AccountCategory::Rrif
            | AccountCategory::PretaxDeferred
            | AccountCategory::PretaxMatched => "RRSP/RRIF",
            AccountCategory::Tfsa | AccountCategory::Roth => "TFSA",
            AccountCategory::Brokerage | AccountCategory::HealthSavings => "Non-registered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BenefitClaim;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn retiree(cpp: Option<BenefitClaim>, oas: Option<BenefitClaim>) -> Profile {
        Profile {
            current_age: 55,
            retirement_age: 60,
            life_expectancy: 95,
            filing_status: FilingStatus::Single,
            state_tax_rate: 0.0,
            jurisdiction: JurisdictionCode::Canada,
            base_year: 2024,
            primary_benefit: cpp,
            secondary_benefit: oas,
        }
    }

    #[test]
    fn federal_and_provincial_taxes_use_separate_basic_amounts() {
        let tax = Canada.income_tax(60_000.0, 0.0, FilingStatus::Single, 0.09);
        assert_approx(tax.federal, (60_000.0 - 15_705.0) * 0.15);
        assert_approx(tax.sub_national, (60_000.0 - 11_865.0) * 0.0505);
    }

    #[test]
    fn filing_status_does_not_change_canadian_tax() {
        let single = Canada.federal_tax(120_000.0, 10_000.0, FilingStatus::Single);
        let joint = Canada.federal_tax(120_000.0, 10_000.0, FilingStatus::MarriedJoint);
        assert_approx(single, joint);
    }

    #[test]
    fn half_of_gains_are_taxed_as_ordinary_income() {
        let tax = Canada.federal_tax(0.0, 100_000.0, FilingStatus::Single);
        assert_approx(tax, (50_000.0 - 15_705.0) * 0.15);
    }

    #[test]
    fn cpp_is_reduced_early_and_increased_late() {
        assert_approx(cpp_adjustment(60), 0.64);
        assert_approx(cpp_adjustment(65), 1.0);
        assert_approx(cpp_adjustment(70), 1.42);
        // Clamped to the legal window.
        assert_approx(cpp_adjustment(55), 0.64);
        assert_approx(cpp_adjustment(75), 1.42);
    }

    #[test]
    fn oas_only_grows_with_deferral() {
        assert_approx(oas_adjustment(60), 1.0);
        assert_approx(oas_adjustment(67), 1.144);
        assert_approx(oas_adjustment(72), 1.36);
    }

    #[test]
    fn oas_recovery_tax_phases_in_and_caps() {
        assert_approx(oas_clawback(8_000.0, 80_000.0), 0.0);
        assert_approx(oas_clawback(8_000.0, 100_000.0), 0.15 * 9_003.0);
        assert_approx(oas_clawback(8_000.0, 140_000.0), 7_350.45f64.min(8_000.0));
        assert_approx(oas_clawback(8_000.0, 150_000.0), 8_000.0);
    }

    #[test]
    fn benefits_reflect_start_ages_and_clawback() {
        let profile = retiree(
            Some(BenefitClaim {
                annual_amount: 12_000.0,
                start_age: 60,
            }),
            Some(BenefitClaim {
                annual_amount: 8_000.0,
                start_age: 65,
            }),
        );

        let at_62 = Canada.benefits(&profile, 62, 0.0);
        assert_eq!(at_62.len(), 1);
        assert_eq!(at_62[0].source, BenefitSource::CanadaPension);
        assert_approx(at_62[0].annual_amount, 7_680.0);

        let at_66 = Canada.benefits(&profile, 66, 100_000.0);
        assert_eq!(at_66.len(), 2);
        let oas = &at_66[1];
        assert_eq!(oas.source, BenefitSource::OldAgeSecurity);
        assert_approx(oas.clawback, 1_350.45);
        assert_approx(oas.annual_amount, 8_000.0 - 1_350.45);
        assert_approx(oas.taxable_amount(), oas.annual_amount);
    }

    #[test]
    fn only_registered_retirement_plans_have_minimums() {
        assert!(Canada.is_subject_to_mandatory_distribution(AccountCategory::Rrsp));
        assert!(Canada.is_subject_to_mandatory_distribution(AccountCategory::Rrif));
        assert!(!Canada.is_subject_to_mandatory_distribution(AccountCategory::Tfsa));
        assert!(!Canada.is_subject_to_mandatory_distribution(AccountCategory::PretaxDeferred));
    }

    #[test]
    fn assessable_income_includes_half_of_gains() {
        assert_approx(Canada.assessable_income(8_000.0, 86_000.0), 51_000.0);
        assert_approx(
            Canada.assessable_income(0.0, 300_000.0),
            125_000.0 + 50_000.0 * 2.0 / 3.0,
        );
    }

    #[test]
    fn default_fill_rate_is_second_federal_bracket() {
        assert_approx(Canada.default_fill_rate(FilingStatus::Single), 0.205);
    }
}
