//! Progressive bracket arithmetic shared by every jurisdiction.
//!
//! Bracket tables are gap-free and sorted ascending by `min`. The last
//! bracket of a table is always treated as unbounded, whatever its `max`.

use super::types::TaxBracket;

const RATE_MATCH_EPS: f64 = 1e-9;

fn effective_max(brackets: &[TaxBracket], index: usize) -> f64 {
    if index + 1 == brackets.len() {
        f64::INFINITY
    } else {
        brackets[index].max
    }
}

pub fn ordinary_income_tax(taxable_income: f64, brackets: &[TaxBracket]) -> f64 {
    if taxable_income <= 0.0 {
        return 0.0;
    }

    let mut remaining = taxable_income;
    let mut tax = 0.0;
    for (i, bracket) in brackets.iter().enumerate() {
        if remaining <= 0.0 {
            break;
        }
        let width = if i + 1 == brackets.len() {
            f64::INFINITY
        } else {
            bracket.width()
        };
        let in_bracket = remaining.min(width);
        tax += in_bracket * bracket.rate;
        remaining -= in_bracket;
    }
    tax
}

/// Tax on `gains` placed on top of `other_taxable_income` (less the deduction)
/// using the capital-gains rate table.
pub fn capital_gains_tax(
    gains: f64,
    other_taxable_income: f64,
    brackets: &[TaxBracket],
    standard_deduction: f64,
) -> f64 {
    if gains <= 0.0 {
        return 0.0;
    }

    let mut current_income = (other_taxable_income - standard_deduction).max(0.0);
    let mut remaining = gains;
    let mut tax = 0.0;

    for (i, bracket) in brackets.iter().enumerate() {
        if remaining <= 0.0 {
            break;
        }
        let room = (effective_max(brackets, i) - current_income).max(0.0);
        let placed = remaining.min(room);
        // Only the part of `placed` at or above `bracket.min` belongs to this bracket.
        let below_min = (bracket.min - current_income).max(0.0);
        let taxed = (placed - below_min).max(0.0);
        tax += taxed * bracket.rate;
        current_income += placed;
        remaining -= placed;
    }
    tax
}

pub fn state_tax(taxable_income: f64, flat_rate: f64) -> f64 {
    taxable_income.max(0.0) * flat_rate
}

/// Rate of the bracket containing `taxable_income` (already net of deductions).
pub fn marginal_rate(taxable_income: f64, brackets: &[TaxBracket]) -> f64 {
    if taxable_income <= 0.0 {
        return 0.0;
    }
    brackets
        .iter()
        .find(|b| b.max >= taxable_income)
        .or_else(|| brackets.last())
        .map_or(0.0, |b| b.rate)
}

fn bracket_with_rate(brackets: &[TaxBracket], rate: f64) -> Option<(usize, &TaxBracket)> {
    brackets
        .iter()
        .enumerate()
        .find(|(_, b)| (b.rate - rate).abs() < RATE_MATCH_EPS)
}

/// Unused width of the bracket taxed at exactly `target_rate`, measured from
/// `max(current taxable, bracket.min)`, plus unused deduction. Zero when no
/// bracket carries that rate.
pub fn room_to_fill_bracket(
    current_ordinary_income: f64,
    target_rate: f64,
    brackets: &[TaxBracket],
    standard_deduction: f64,
) -> f64 {
    let Some((i, bracket)) = bracket_with_rate(brackets, target_rate) else {
        return 0.0;
    };
    unused_width(
        current_ordinary_income,
        bracket.min,
        effective_max(brackets, i),
        standard_deduction,
    )
}

/// Income that can be added before leaving the bracket taxed at `target_rate`,
/// counting the lower brackets and any unused deduction.
pub fn headroom_to_bracket_top(
    current_ordinary_income: f64,
    target_rate: f64,
    brackets: &[TaxBracket],
    standard_deduction: f64,
) -> f64 {
    let Some((i, _)) = bracket_with_rate(brackets, target_rate) else {
        return 0.0;
    };
    unused_width(
        current_ordinary_income,
        0.0,
        effective_max(brackets, i),
        standard_deduction,
    )
}

fn unused_width(current_ordinary_income: f64, floor: f64, ceiling: f64, deduction: f64) -> f64 {
    let gross = current_ordinary_income.max(0.0);
    let taxable = gross - deduction;
    if taxable > ceiling {
        return 0.0;
    }
    let width = ceiling - taxable.max(floor);
    let unused_deduction = (deduction - gross).max(0.0);
    width.max(0.0) + unused_deduction
}

/// How realised capital gains enter a tax computation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CapitalGainsTreatment {
    /// Gains stacked on ordinary income and taxed with their own rate table.
    Stacked(&'static [TaxBracket]),
    /// A fraction of gains is added to ordinary income; `upper_rate` applies above `threshold`.
    Inclusion {
        rate: f64,
        threshold: f64,
        upper_rate: f64,
    },
}

impl CapitalGainsTreatment {
    pub fn included_amount(&self, gains: f64) -> f64 {
        let gains = gains.max(0.0);
        match *self {
            CapitalGainsTreatment::Stacked(_) => 0.0,
            CapitalGainsTreatment::Inclusion {
                rate,
                threshold,
                upper_rate,
            } => {
                let lower = gains.min(threshold);
                lower * rate + (gains - lower) * upper_rate
            }
        }
    }
}

/// One level of government's bracket table plus deduction and gains rule.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaxSchedule {
    pub brackets: &'static [TaxBracket],
    pub deduction: f64,
    pub capital_gains: CapitalGainsTreatment,
}

impl TaxSchedule {
    pub fn tax(&self, ordinary_income: f64, capital_gains: f64) -> f64 {
        let ordinary = ordinary_income.max(0.0);
        match self.capital_gains {
            CapitalGainsTreatment::Stacked(gains_brackets) => {
                // Gains are positioned on gross ordinary income; the deduction is
                // subtracted once inside `capital_gains_tax`.
                ordinary_income_tax(ordinary - self.deduction, self.brackets)
                    + capital_gains_tax(capital_gains, ordinary, gains_brackets, self.deduction)
            }
            CapitalGainsTreatment::Inclusion { .. } => {
                let included = self.capital_gains.included_amount(capital_gains);
                ordinary_income_tax(ordinary + included - self.deduction, self.brackets)
            }
        }
    }

    pub fn marginal_rate(&self, ordinary_income: f64) -> f64 {
        marginal_rate(ordinary_income - self.deduction, self.brackets)
    }

    pub fn room_to_fill_bracket(&self, ordinary_income: f64, target_rate: f64) -> f64 {
        room_to_fill_bracket(ordinary_income, target_rate, self.brackets, self.deduction)
    }

    pub fn headroom_to_bracket_top(&self, ordinary_income: f64, target_rate: f64) -> f64 {
        headroom_to_bracket_top(ordinary_income, target_rate, self.brackets, self.deduction)
    }

    pub fn has_bracket_rate(&self, rate: f64) -> bool {
        bracket_with_rate(self.brackets, rate).is_some()
    }

    /// Rate of the second-lowest bracket, or the only one.
    pub fn second_bracket_rate(&self) -> f64 {
        self.brackets
            .get(1)
            .or_else(|| self.brackets.first())
            .map_or(0.0, |b| b.rate)
    }
}
