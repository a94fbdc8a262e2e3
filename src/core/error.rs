use thiserror::Error;

/// Input rejected before any projection work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("retirement age {retirement_age} must be greater than current age {current_age}")]
    RetirementAge {
        current_age: u32,
        retirement_age: u32,
    },

    #[error("life expectancy {life_expectancy} must be greater than retirement age {retirement_age}")]
    LifeExpectancy {
        retirement_age: u32,
        life_expectancy: u32,
    },

    #[error("life expectancy {life_expectancy} exceeds the maximum planning age {max_age}")]
    HorizonTooLong { life_expectancy: u32, max_age: u32 },

    #[error("base year {base_year} must be between {min_year} and {max_year}")]
    BaseYear {
        base_year: i32,
        min_year: i32,
        max_year: i32,
    },

    #[error("account '{account_id}': {field} {reason}")]
    Account {
        account_id: String,
        field: &'static str,
        reason: &'static str,
    },

    #[error("{field} {reason}")]
    Assumption {
        field: &'static str,
        reason: &'static str,
    },

    #[error("accumulation result has no final balance for account '{0}'")]
    MissingAccumulation(String),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
