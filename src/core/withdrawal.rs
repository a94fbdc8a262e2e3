use tracing::{debug, warn};

use super::distribution::mandatory_distribution;
use super::error::{ProjectionError, Result};
use super::jurisdiction::{self, Jurisdiction};
use super::types::{
    Account, AccountAmount, AccountDepletion, AccumulationResult, Assumptions, Profile,
    RetirementResult, TaxTreatment, YearlyWithdrawal,
};

/// Share of every taxable-brokerage withdrawal treated as realised gain.
pub const BROKERAGE_GAIN_FRACTION: f64 = 0.5;

const DEPLETION_EPS: f64 = 1e-6;

#[derive(Copy, Clone, Debug)]
enum DrawStage {
    PretaxToBracket,
    TaxExempt,
    Taxable,
    Medical,
    PretaxRemainder,
}

impl DrawStage {
    fn treatment(self) -> TaxTreatment {
        match self {
            DrawStage::PretaxToBracket | DrawStage::PretaxRemainder => TaxTreatment::Pretax,
            DrawStage::TaxExempt => TaxTreatment::TaxExempt,
            DrawStage::Taxable => TaxTreatment::Taxable,
            DrawStage::Medical => TaxTreatment::MedicalExempt,
        }
    }
}

const DRAW_ORDER: [DrawStage; 5] = [
    DrawStage::PretaxToBracket,
    DrawStage::TaxExempt,
    DrawStage::Taxable,
    DrawStage::Medical,
    DrawStage::PretaxRemainder,
];

struct AccountState<'a> {
    account: &'a Account,
    treatment: TaxTreatment,
    balance: f64,
    withdrawn: f64,
    /// Only accounts funded at retirement can deplete.
    tracked: bool,
    depletion_age: Option<u32>,
}

impl AccountState<'_> {
    fn take(&mut self, amount: f64) -> f64 {
        let x = amount.min(self.balance).max(0.0);
        self.balance -= x;
        self.withdrawn += x;
        x
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct WithdrawalYearOutcome {
    pretax_extra: f64,
    capital_gains: f64,
    unmet_need: f64,
}

/// Simulates drawdown from `retirement_age` to `life_expectancy` inclusive,
/// starting from the balances in `accumulation`.
pub fn project_withdrawals(
    accounts: &[Account],
    profile: &Profile,
    assumptions: &Assumptions,
    accumulation: &AccumulationResult,
) -> Result<RetirementResult> {
    profile.validate()?;
    assumptions.validate()?;
    for account in accounts {
        account.validate()?;
    }
    let starting_balances = accounts
        .iter()
        .map(|a| {
            accumulation
                .final_balance(&a.id)
                .ok_or_else(|| ProjectionError::MissingAccumulation(a.id.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(simulate_withdrawals(
        accounts,
        &starting_balances,
        profile,
        assumptions,
        jurisdiction::provider(profile.jurisdiction),
    ))
}

pub(crate) fn simulate_withdrawals(
    accounts: &[Account],
    starting_balances: &[f64],
    profile: &Profile,
    assumptions: &Assumptions,
    jurisdiction: &dyn Jurisdiction,
) -> RetirementResult {
    let status = profile.filing_status;
    let mut states: Vec<AccountState> = accounts
        .iter()
        .zip(starting_balances)
        .map(|(account, &balance)| AccountState {
            account,
            treatment: jurisdiction.treatment(account.category),
            balance: balance.max(0.0),
            withdrawn: 0.0,
            tracked: balance > DEPLETION_EPS,
            depletion_age: None,
        })
        .collect();

    let total_at_retirement: f64 = states.iter().map(|s| s.balance).sum();
    let base_spending = total_at_retirement * assumptions.safe_withdrawal_rate;
    let fill_rate = assumptions
        .bracket_fill_rate
        .unwrap_or_else(|| jurisdiction.default_fill_rate(status));
    if !jurisdiction.federal_schedule(status).has_bracket_rate(fill_rate) {
        debug!(fill_rate, "fill rate matches no bracket, skipping bracket fill");
    }

    let horizon = (profile.life_expectancy - profile.retirement_age + 1) as usize;
    let mut years = Vec::with_capacity(horizon);
    let mut depletion_age = None;
    let mut lifetime_taxes = 0.0;
    let mut prior_assessed_income: Option<f64> = None;

    for age in profile.retirement_age..=profile.life_expectancy {
        for state in &mut states {
            state.withdrawn = 0.0;
        }
        let years_in = (age - profile.retirement_age) as i32;
        let target_spending = base_spending * (1.0 + assumptions.inflation_rate).powi(years_in);

        let mut mandatory = 0.0;
        for state in &mut states {
            let required =
                mandatory_distribution(state.balance, age, state.account.category, jurisdiction);
            mandatory += state.take(required);
        }

        // Clawback is assessed on last year's income; the first year has none,
        // so mandatory distributions plus unreduced benefits stand in.
        let income_estimate = prior_assessed_income.unwrap_or_else(|| {
            mandatory
                + jurisdiction
                    .benefits(profile, age, 0.0)
                    .iter()
                    .map(|b| b.taxable_amount())
                    .sum::<f64>()
        });
        let benefits = jurisdiction.benefits(profile, age, income_estimate);
        let benefit_income: f64 = benefits.iter().map(|b| b.annual_amount).sum();
        let taxable_benefits: f64 = benefits.iter().map(|b| b.taxable_amount()).sum();

        let need = (target_spending - benefit_income - mandatory).max(0.0);
        let outcome = run_withdrawal_year(
            &mut states,
            need,
            mandatory + taxable_benefits,
            fill_rate,
            profile,
            jurisdiction,
        );

        let total_withdrawal: f64 = states.iter().map(|s| s.withdrawn).sum();
        let ordinary_income = mandatory + outcome.pretax_extra + taxable_benefits;
        let tax = jurisdiction.income_tax(
            ordinary_income,
            outcome.capital_gains,
            status,
            profile.state_tax_rate,
        );
        let gross_income = total_withdrawal + taxable_benefits;
        lifetime_taxes += tax.total();
        prior_assessed_income = Some(jurisdiction.assessable_income(
            ordinary_income,
            outcome.capital_gains,
        ));

        for state in &mut states {
            if state.balance <= DEPLETION_EPS {
                state.balance = 0.0;
                if state.tracked && state.depletion_age.is_none() {
                    debug!(account = %state.account.id, age, "account depleted");
                    state.depletion_age = Some(age);
                }
            }
        }
        let remaining: f64 = states.iter().map(|s| s.balance).sum();
        if depletion_age.is_none() && remaining <= DEPLETION_EPS {
            warn!(age, unmet = outcome.unmet_need, "portfolio depleted");
            depletion_age = Some(age);
        }

        for state in &mut states {
            state.balance = (state.balance * (1.0 + assumptions.retirement_return_rate)).max(0.0);
        }

        years.push(YearlyWithdrawal {
            age,
            year: profile.calendar_year(age),
            withdrawals: states
                .iter()
                .map(|s| AccountAmount {
                    account_id: s.account.id.clone(),
                    amount: s.withdrawn,
                })
                .collect(),
            balances: states
                .iter()
                .map(|s| AccountAmount {
                    account_id: s.account.id.clone(),
                    amount: s.balance,
                })
                .collect(),
            total_withdrawal,
            benefits,
            benefit_income,
            ordinary_income,
            capital_gains: outcome.capital_gains,
            gross_income,
            cash_income: total_withdrawal + benefit_income,
            federal_tax: tax.federal,
            state_tax: tax.sub_national,
            total_tax: tax.total(),
            after_tax_income: gross_income - tax.total(),
            target_spending,
            mandatory_distribution: mandatory,
            shortfall: (target_spending - benefit_income - total_withdrawal).max(0.0),
            total_balance: states.iter().map(|s| s.balance).sum(),
        });
    }

    let final_balance = years.last().map_or(total_at_retirement, |y| y.total_balance);
    debug!(
        accounts = accounts.len(),
        years = years.len(),
        lifetime_taxes,
        final_balance,
        ?depletion_age,
        "withdrawals simulated"
    );

    RetirementResult {
        years,
        depletion_age,
        lifetime_taxes,
        sustainable_annual_withdrawal: base_spending,
        sustainable_monthly_withdrawal: base_spending / 12.0,
        account_depletion: states
            .iter()
            .map(|s| AccountDepletion {
                account_id: s.account.id.clone(),
                depletion_age: s.depletion_age,
            })
            .collect(),
        final_balance,
    }
}

fn run_withdrawal_year(
    states: &mut [AccountState],
    need: f64,
    ordinary_before_draws: f64,
    fill_rate: f64,
    profile: &Profile,
    jurisdiction: &dyn Jurisdiction,
) -> WithdrawalYearOutcome {
    let mut outcome = WithdrawalYearOutcome::default();
    let mut remaining = need;

    for stage in DRAW_ORDER {
        if remaining <= 0.0 {
            break;
        }
        let cap = match stage {
            DrawStage::PretaxToBracket => jurisdiction
                .bracket_fill_headroom(ordinary_before_draws, fill_rate, profile.filing_status)
                .min(remaining),
            _ => remaining,
        };
        let taken = withdraw_from_treatment(states, stage.treatment(), cap);
        remaining -= taken;

        match stage.treatment() {
            TaxTreatment::Pretax => outcome.pretax_extra += taken,
            TaxTreatment::Taxable => outcome.capital_gains += taken * BROKERAGE_GAIN_FRACTION,
            TaxTreatment::TaxExempt | TaxTreatment::MedicalExempt => {}
        }
    }

    outcome.unmet_need = remaining.max(0.0);
    outcome
}

/// Draws up to `amount` from accounts of one treatment in declaration order.
fn withdraw_from_treatment(states: &mut [AccountState], treatment: TaxTreatment, amount: f64) -> f64 {
    let mut taken = 0.0;
    for state in states.iter_mut().filter(|s| s.treatment == treatment) {
        if taken >= amount {
            break;
        }
        taken += state.take(amount - taken);
    }
    taken
}
