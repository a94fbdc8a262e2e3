//! Jurisdiction providers: bracket tables, mandatory distribution rules and
//! retirement benefits behind one capability trait.

pub mod canada;
pub mod us;

use serde::Serialize;

use super::distribution::MandatoryDistributionTable;
use super::tax::TaxSchedule;
use super::types::{
    AccountCategory, BenefitEntry, FilingStatus, JurisdictionCode, Profile, TaxTreatment,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeTax {
    pub federal: f64,
    /// State tax (US) or provincial tax (Canada).
    pub sub_national: f64,
}

impl IncomeTax {
    pub fn total(&self) -> f64 {
        self.federal + self.sub_national
    }
}

pub trait Jurisdiction: Send + Sync {
    fn code(&self) -> JurisdictionCode;

    fn federal_schedule(&self, status: FilingStatus) -> TaxSchedule;

    fn sub_national_tax(&self, ordinary_income: f64, capital_gains: f64, flat_rate: f64) -> f64;

    fn mandatory_distributions(&self) -> &MandatoryDistributionTable;

    fn is_subject_to_mandatory_distribution(&self, category: AccountCategory) -> bool;

    /// Benefits paid at `age`. `income_estimate` drives any income-tested clawback.
    fn benefits(&self, profile: &Profile, age: u32, income_estimate: f64) -> Vec<BenefitEntry>;

    /// Reporting group for a category, e.g. "RRSP/RRIF".
    fn category_group(&self, category: AccountCategory) -> &'static str;

    /// Income an income-tested benefit is assessed against.
    fn assessable_income(&self, ordinary_income: f64, capital_gains: f64) -> f64 {
        ordinary_income.max(0.0) + capital_gains.max(0.0)
    }

    fn treatment(&self, category: AccountCategory) -> TaxTreatment {
        category.treatment()
    }

    fn federal_tax(&self, ordinary_income: f64, capital_gains: f64, status: FilingStatus) -> f64 {
        self.federal_schedule(status)
            .tax(ordinary_income, capital_gains)
    }

    fn income_tax(
        &self,
        ordinary_income: f64,
        capital_gains: f64,
        status: FilingStatus,
        flat_rate: f64,
    ) -> IncomeTax {
        IncomeTax {
            federal: self.federal_tax(ordinary_income, capital_gains, status),
            sub_national: self.sub_national_tax(ordinary_income, capital_gains, flat_rate),
        }
    }

    fn marginal_rate(&self, ordinary_income: f64, status: FilingStatus) -> f64 {
        self.federal_schedule(status).marginal_rate(ordinary_income)
    }

    fn room_to_fill_bracket(
        &self,
        ordinary_income: f64,
        target_rate: f64,
        status: FilingStatus,
    ) -> f64 {
        self.federal_schedule(status)
            .room_to_fill_bracket(ordinary_income, target_rate)
    }

    /// Additional ordinary income that stays at or below `target_rate`.
    fn bracket_fill_headroom(
        &self,
        ordinary_income: f64,
        target_rate: f64,
        status: FilingStatus,
    ) -> f64 {
        self.federal_schedule(status)
            .headroom_to_bracket_top(ordinary_income, target_rate)
    }

    fn default_fill_rate(&self, status: FilingStatus) -> f64 {
        self.federal_schedule(status).second_bracket_rate()
    }

    fn mandatory_distribution_fraction(&self, category: AccountCategory, age: u32) -> f64 {
        if !self.is_subject_to_mandatory_distribution(category) {
            return 0.0;
        }
        self.mandatory_distributions().required_fraction(age)
    }
}

pub fn provider(code: JurisdictionCode) -> &'static dyn Jurisdiction {
    match code {
        JurisdictionCode::Us => &us::UnitedStates,
        JurisdictionCode::Canada => &canada::Canada,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_resolves_each_code() {
        for code in [JurisdictionCode::Us, JurisdictionCode::Canada] {
            assert_eq!(provider(code).code(), code);
        }
    }

    #[test]
    fn income_tax_total_adds_both_levels() {
        let tax = IncomeTax {
            federal: 1_000.0,
            sub_national: 250.0,
        };
        assert!((tax.total() - 1_250.0).abs() < 1e-9);
    }

    #[test]
    fn bracket_tables_are_sorted_and_gap_free() {
        for code in [JurisdictionCode::Us, JurisdictionCode::Canada] {
            for status in [FilingStatus::Single, FilingStatus::MarriedJoint] {
                let brackets = provider(code).federal_schedule(status).brackets;
                assert_eq!(brackets[0].min, 0.0);
                for pair in brackets.windows(2) {
                    assert_eq!(pair[0].max, pair[1].min);
                    assert!(pair[0].rate < pair[1].rate);
                }
                assert!(brackets.last().is_some_and(|b| b.max.is_infinite()));
            }
        }
    }
}
