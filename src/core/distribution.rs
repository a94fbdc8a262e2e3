use tracing::debug;

use super::jurisdiction::Jurisdiction;
use super::types::AccountCategory;

/// How the values in a mandatory distribution table are expressed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequiredValue {
    /// Withdraw `balance / value` (US life-expectancy divisors).
    Divisor,
    /// Withdraw `balance * value` (Canadian RRIF minimum fractions).
    Fraction,
}

/// What happens past the oldest tabulated age.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TerminalPolicy {
    /// Keep using the last tabulated value.
    Flatline,
    /// Use this value, expressed in the table's own unit.
    Fixed(f64),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MandatoryDistributionEntry {
    pub age: u32,
    pub value: f64,
}

impl MandatoryDistributionEntry {
    pub const fn new(age: u32, value: f64) -> Self {
        Self { age, value }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MandatoryDistributionTable {
    pub start_age: u32,
    pub kind: RequiredValue,
    /// Sorted by age, contiguous from the first entry.
    pub entries: &'static [MandatoryDistributionEntry],
    pub terminal: TerminalPolicy,
}

impl MandatoryDistributionTable {
    /// Raw table value for `age`, or `None` below the start age.
    pub fn value_for_age(&self, age: u32) -> Option<f64> {
        if age < self.start_age {
            return None;
        }
        if let Some(entry) = self.entries.iter().find(|e| e.age == age) {
            return Some(entry.value);
        }

        let first = self.entries.first()?;
        let last = self.entries.last()?;
        if age < first.age {
            debug!(age, first_age = first.age, "age precedes table, using first entry");
            return Some(first.value);
        }
        if age > last.age {
            return match self.terminal {
                TerminalPolicy::Flatline => Some(last.value),
                TerminalPolicy::Fixed(value) => Some(value),
            };
        }
        // Hole inside the table: nearest younger entry.
        self.entries
            .iter()
            .rev()
            .find(|e| e.age < age)
            .map(|e| e.value)
    }

    /// Share of the balance that must be withdrawn at `age`, in `[0, 1]`.
    pub fn required_fraction(&self, age: u32) -> f64 {
        let Some(value) = self.value_for_age(age) else {
            return 0.0;
        };
        match self.kind {
            RequiredValue::Divisor if value <= 1.0 => 1.0,
            RequiredValue::Divisor => 1.0 / value,
            RequiredValue::Fraction => value.clamp(0.0, 1.0),
        }
    }
}

/// Required withdrawal from one account at `age`. Categories the jurisdiction
/// does not subject to mandatory distribution always return zero.
pub fn mandatory_distribution(
    balance: f64,
    age: u32,
    category: AccountCategory,
    jurisdiction: &dyn Jurisdiction,
) -> f64 {
    balance.max(0.0) * jurisdiction.mandatory_distribution_fraction(category, age)
}
