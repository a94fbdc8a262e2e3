use tracing::debug;

use super::error::Result;
use super::jurisdiction::{self, Jurisdiction};
use super::types::{
    Account, AccountAmount, AccountYear, AccumulationResult, AccumulationYear, GroupTotal,
    Profile, TreatmentTotals,
};

#[derive(Debug, Clone, Copy, Default)]
struct ContributionFlow {
    contribution: f64,
    employer_match: f64,
}

/// Projects every account from `current_age` to `retirement_age`. No tax is
/// applied during accumulation.
pub fn project_accumulation(accounts: &[Account], profile: &Profile) -> Result<AccumulationResult> {
    profile.validate()?;
    for account in accounts {
        account.validate()?;
    }
    Ok(accumulate(
        accounts,
        profile,
        jurisdiction::provider(profile.jurisdiction),
    ))
}

pub(crate) fn accumulate(
    accounts: &[Account],
    profile: &Profile,
    jurisdiction: &dyn Jurisdiction,
) -> AccumulationResult {
    let years = profile.years_to_retirement();
    let mut balances: Vec<f64> = accounts.iter().map(|a| a.balance).collect();
    let mut contributions: Vec<f64> = accounts.iter().map(|a| a.annual_contribution).collect();

    let mut rows = Vec::with_capacity(years as usize + 1);
    let opening = vec![ContributionFlow::default(); accounts.len()];
    rows.push(snapshot_year(profile, profile.current_age, accounts, &balances, &opening));

    let mut total_contributions = 0.0;
    let mut total_employer_match = 0.0;

    for age in profile.current_age + 1..=profile.retirement_age {
        let mut flows = Vec::with_capacity(accounts.len());
        for (i, account) in accounts.iter().enumerate() {
            apply_growth(account, &mut balances[i]);
            let flow = apply_contribution(account, &mut balances[i], contributions[i]);
            contributions[i] *= 1.0 + account.contribution_growth_rate;

            total_contributions += flow.contribution;
            total_employer_match += flow.employer_match;
            flows.push(flow);
        }
        rows.push(snapshot_year(profile, age, accounts, &balances, &flows));
    }

    let mut by_treatment = TreatmentTotals::default();
    let mut by_group: Vec<GroupTotal> = Vec::new();
    for (account, &balance) in accounts.iter().zip(&balances) {
        by_treatment.add(jurisdiction.treatment(account.category), balance);
        let group = jurisdiction.category_group(account.category);
        match by_group.iter_mut().find(|g| g.group == group) {
            Some(existing) => existing.total += balance,
            None => by_group.push(GroupTotal {
                group,
                total: balance,
            }),
        }
    }

    let total_at_retirement: f64 = balances.iter().sum();
    debug!(
        accounts = accounts.len(),
        years,
        total_at_retirement,
        "accumulation projected"
    );

    AccumulationResult {
        years: rows,
        final_balances: accounts
            .iter()
            .zip(&balances)
            .map(|(a, &amount)| AccountAmount {
                account_id: a.id.clone(),
                amount,
            })
            .collect(),
        total_at_retirement,
        by_treatment,
        by_group,
        total_contributions,
        total_employer_match,
    }
}

fn apply_growth(account: &Account, balance: &mut f64) {
    *balance = (*balance * (1.0 + account.return_rate)).max(0.0);
}

fn apply_contribution(account: &Account, balance: &mut f64, contribution: f64) -> ContributionFlow {
    let contribution = contribution.max(0.0);
    let employer_match = employer_match(account, contribution);
    *balance += contribution + employer_match;
    ContributionFlow {
        contribution,
        employer_match,
    }
}

fn employer_match(account: &Account, contribution: f64) -> f64 {
    if !account.category.has_employer_match() {
        return 0.0;
    }
    match account.employer_match {
        Some(m) => {
            let limit = m.annual_limit.unwrap_or(f64::INFINITY);
            (contribution * m.rate).min(limit).max(0.0)
        }
        None => 0.0,
    }
}

fn snapshot_year(
    profile: &Profile,
    age: u32,
    accounts: &[Account],
    balances: &[f64],
    flows: &[ContributionFlow],
) -> AccumulationYear {
    AccumulationYear {
        age,
        year: profile.calendar_year(age),
        accounts: accounts
            .iter()
            .zip(balances)
            .zip(flows)
            .map(|((account, &balance), flow)| AccountYear {
                account_id: account.id.clone(),
                balance,
                contribution: flow.contribution,
                employer_match: flow.employer_match,
            })
            .collect(),
        total: balances.iter().sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProjectionError;
    use crate::core::types::{AccountCategory, EmployerMatch, FilingStatus, JurisdictionCode};
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn profile(current_age: u32, retirement_age: u32) -> Profile {
        Profile {
            current_age,
            retirement_age,
            life_expectancy: retirement_age + 30,
            filing_status: FilingStatus::MarriedJoint,
            state_tax_rate: 0.0,
            jurisdiction: JurisdictionCode::Us,
            base_year: 2024,
            primary_benefit: None,
            secondary_benefit: None,
        }
    }

    fn growing(balance: f64, return_rate: f64) -> Account {
        Account {
            return_rate,
            ..Account::new("brokerage", AccountCategory::Brokerage, balance)
        }
    }

    #[test]
    fn one_year_of_seven_percent() {
        let result = project_accumulation(&[growing(100_000.0, 0.07)], &profile(64, 65))
            .expect("valid inputs");
        assert_approx(result.total_at_retirement, 107_000.0);
    }

    #[test]
    fn ten_years_compound() {
        let result = project_accumulation(&[growing(100_000.0, 0.07)], &profile(55, 65))
            .expect("valid inputs");
        assert!((result.total_at_retirement - 196_715.14).abs() < 0.01);
        assert_eq!(result.years.len(), 11);
    }

    #[test]
    fn year_zero_is_the_unmodified_starting_state() {
        let mut account = growing(5_000.0, 0.10);
        account.annual_contribution = 1_000.0;
        let result = project_accumulation(&[account], &profile(40, 42)).expect("valid inputs");

        let first = &result.years[0];
        assert_eq!(first.age, 40);
        assert_eq!(first.year, 2024);
        assert_approx(first.total, 5_000.0);
        assert_approx(first.accounts[0].contribution, 0.0);

        let last = result.years.last().expect("rows");
        assert_eq!(last.age, 42);
        assert_eq!(last.year, 2026);
    }

    #[test]
    fn contributions_grow_after_each_year() {
        // Hand calculation, no return:
        // year 1: 1000 + 100 = 1100, next contribution 110
        // year 2: 1100 + 110 = 1210, next contribution 121
        // year 3: 1210 + 121 = 1331
        let account = Account {
            annual_contribution: 100.0,
            contribution_growth_rate: 0.10,
            ..Account::new("roth", AccountCategory::Roth, 1_000.0)
        };
        let result = project_accumulation(&[account], &profile(30, 33)).expect("valid inputs");
        assert_approx(result.total_at_retirement, 1_331.0);
        assert_approx(result.total_contributions, 331.0);
        assert_approx(result.years[2].accounts[0].contribution, 110.0);
    }

    #[test]
    fn employer_match_is_capped_and_only_for_matched_category() {
        let matched = Account {
            annual_contribution: 100.0,
            employer_match: Some(EmployerMatch {
                rate: 0.5,
                annual_limit: Some(40.0),
            }),
            ..Account::new("401k", AccountCategory::PretaxMatched, 0.0)
        };
        let unmatched = Account {
            category: AccountCategory::PretaxDeferred,
            id: "ira".to_string(),
            ..matched.clone()
        };
        let result =
            project_accumulation(&[matched, unmatched], &profile(30, 32)).expect("valid inputs");

        assert_approx(result.final_balance("401k").expect("401k"), 280.0);
        assert_approx(result.final_balance("ira").expect("ira"), 200.0);
        assert_approx(result.total_employer_match, 80.0);
        assert_approx(result.years[1].accounts[0].employer_match, 40.0);
    }

    #[test]
    fn uncapped_match_follows_rate() {
        let matched = Account {
            annual_contribution: 10_000.0,
            employer_match: Some(EmployerMatch {
                rate: 1.0,
                annual_limit: None,
            }),
            ..Account::new("401k", AccountCategory::PretaxMatched, 0.0)
        };
        let result = project_accumulation(&[matched], &profile(30, 31)).expect("valid inputs");
        assert_approx(result.total_at_retirement, 20_000.0);
    }

    #[test]
    fn totals_are_grouped_by_treatment_and_reporting_group() {
        let accounts = [
            Account::new("a", AccountCategory::PretaxDeferred, 100.0),
            Account::new("b", AccountCategory::PretaxMatched, 50.0),
            Account::new("c", AccountCategory::Roth, 25.0),
            Account::new("d", AccountCategory::Brokerage, 10.0),
            Account::new("e", AccountCategory::HealthSavings, 5.0),
        ];
        let result = project_accumulation(&accounts, &profile(50, 51)).expect("valid inputs");

        assert_approx(result.by_treatment.pretax, 150.0);
        assert_approx(result.by_treatment.tax_exempt, 25.0);
        assert_approx(result.by_treatment.taxable, 10.0);
        assert_approx(result.by_treatment.medical_exempt, 5.0);
        assert_approx(result.by_treatment.total(), result.total_at_retirement);

        let groups: Vec<_> = result.by_group.iter().map(|g| g.group).collect();
        assert_eq!(groups, vec!["401(k)/IRA", "Roth", "Brokerage", "HSA"]);
        assert_approx(result.by_group[0].total, 150.0);
    }

    #[test]
    fn rejects_retirement_not_after_current_age() {
        let err = project_accumulation(&[], &profile(65, 65)).expect_err("must reject");
        assert!(matches!(err, ProjectionError::RetirementAge { .. }));
    }

    #[test]
    fn rejects_life_expectancy_not_after_retirement() {
        let mut p = profile(50, 65);
        p.life_expectancy = 65;
        let err = project_accumulation(&[], &p).expect_err("must reject");
        assert!(matches!(err, ProjectionError::LifeExpectancy { .. }));
    }

    #[test]
    fn rejects_negative_balance() {
        let err = project_accumulation(&[growing(-1.0, 0.0)], &profile(50, 65))
            .expect_err("must reject");
        assert!(err.to_string().contains("balance"));
    }

    proptest! {
        #[test]
        fn prop_zero_contribution_zero_return_is_flat(
            balance in 0.0f64..5_000_000.0,
            years in 1u32..50,
        ) {
            let result = project_accumulation(&[growing(balance, 0.0)], &profile(20, 20 + years))
                .expect("valid inputs");
            prop_assert!((result.total_at_retirement - balance).abs() < 1e-6);
        }

        #[test]
        fn prop_pure_growth_compounds(
            balance in 0.0f64..5_000_000.0,
            rate in -0.5f64..0.3,
            years in 1u32..40,
        ) {
            let result = project_accumulation(&[growing(balance, rate)], &profile(25, 25 + years))
                .expect("valid inputs");
            let expected = balance * (1.0 + rate).powi(years as i32);
            prop_assert!((result.total_at_retirement - expected).abs() <= 1e-6 * expected.max(1.0));
        }
    }
}
