use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::core::{
    Account, AccountCategory, AccumulationResult, Assumptions, BenefitClaim, EmployerMatch,
    FilingStatus, JurisdictionCode, Profile, ProjectionError, RetirementResult,
    jurisdiction, project_accumulation, project_withdrawals,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AccountPayload {
    id: Option<String>,
    name: Option<String>,
    category: Option<AccountCategory>,
    balance: Option<f64>,
    annual_contribution: Option<f64>,
    contribution_growth: Option<f64>,
    return_rate: Option<f64>,
    match_rate: Option<f64>,
    match_limit: Option<f64>,
}

/// Plan payload. Rates are percentages; everything is optional and falls back
/// to the default plan.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    life_expectancy: Option<u32>,
    filing_status: Option<FilingStatus>,
    jurisdiction: Option<JurisdictionCode>,
    base_year: Option<i32>,
    state_tax_rate: Option<f64>,
    primary_benefit_amount: Option<f64>,
    primary_benefit_start_age: Option<u32>,
    secondary_benefit_amount: Option<f64>,
    secondary_benefit_start_age: Option<u32>,
    inflation_rate: Option<f64>,
    safe_withdrawal_rate: Option<f64>,
    retirement_return_rate: Option<f64>,
    bracket_fill_rate: Option<f64>,
    accounts: Option<Vec<AccountPayload>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TaxQuotePayload {
    jurisdiction: Option<JurisdictionCode>,
    filing_status: Option<FilingStatus>,
    ordinary_income: Option<f64>,
    capital_gains: Option<f64>,
    state_tax_rate: Option<f64>,
    bracket_fill_rate: Option<f64>,
}

/// Plan settings in payload units (percentages), before validation.
#[derive(Debug, Clone)]
struct PlanSettings {
    current_age: u32,
    retirement_age: u32,
    life_expectancy: u32,
    filing_status: FilingStatus,
    jurisdiction: JurisdictionCode,
    base_year: i32,
    state_tax_rate: f64,
    primary_benefit_amount: f64,
    primary_benefit_start_age: u32,
    secondary_benefit_amount: f64,
    secondary_benefit_start_age: u32,
    inflation_rate: f64,
    safe_withdrawal_rate: f64,
    retirement_return_rate: f64,
    bracket_fill_rate: Option<f64>,
    accounts: Vec<AccountSettings>,
}

#[derive(Debug, Clone)]
struct AccountSettings {
    id: String,
    name: String,
    category: AccountCategory,
    balance: f64,
    annual_contribution: f64,
    contribution_growth: f64,
    return_rate: f64,
    match_rate: f64,
    match_limit: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub accounts: Vec<Account>,
    pub profile: Profile,
    pub assumptions: Assumptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    pub accumulation: AccumulationResult,
    pub retirement: RetirementResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaxQuoteResponse {
    jurisdiction: JurisdictionCode,
    filing_status: FilingStatus,
    ordinary_income: f64,
    capital_gains: f64,
    federal_tax: f64,
    sub_national_tax: f64,
    total_tax: f64,
    effective_rate: f64,
    marginal_rate: f64,
    bracket_fill_rate: f64,
    bracket_headroom: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn default_plan_settings() -> PlanSettings {
    PlanSettings {
        current_age: 40,
        retirement_age: 65,
        life_expectancy: 92,
        filing_status: FilingStatus::MarriedJoint,
        jurisdiction: JurisdictionCode::Us,
        base_year: 2024,
        state_tax_rate: 5.0,
        primary_benefit_amount: 30_000.0,
        primary_benefit_start_age: 67,
        secondary_benefit_amount: 0.0,
        secondary_benefit_start_age: 65,
        inflation_rate: 2.5,
        safe_withdrawal_rate: 4.0,
        retirement_return_rate: 5.0,
        bracket_fill_rate: None,
        accounts: vec![
            AccountSettings {
                id: "401k".to_string(),
                name: "Workplace 401(k)".to_string(),
                category: AccountCategory::PretaxMatched,
                balance: 150_000.0,
                annual_contribution: 20_000.0,
                contribution_growth: 2.0,
                return_rate: 7.0,
                match_rate: 50.0,
                match_limit: Some(6_000.0),
            },
            AccountSettings {
                id: "roth-ira".to_string(),
                name: "Roth IRA".to_string(),
                category: AccountCategory::Roth,
                balance: 50_000.0,
                annual_contribution: 7_000.0,
                contribution_growth: 0.0,
                return_rate: 7.0,
                match_rate: 0.0,
                match_limit: None,
            },
            AccountSettings {
                id: "brokerage".to_string(),
                name: "Brokerage".to_string(),
                category: AccountCategory::Brokerage,
                balance: 25_000.0,
                annual_contribution: 5_000.0,
                contribution_growth: 0.0,
                return_rate: 6.0,
                match_rate: 0.0,
                match_limit: None,
            },
            AccountSettings {
                id: "hsa".to_string(),
                name: "HSA".to_string(),
                category: AccountCategory::HealthSavings,
                balance: 10_000.0,
                annual_contribution: 4_150.0,
                contribution_growth: 0.0,
                return_rate: 6.0,
                match_rate: 0.0,
                match_limit: None,
            },
        ],
    }
}

fn account_settings_from_payload(
    index: usize,
    payload: AccountPayload,
) -> Result<AccountSettings, String> {
    let category = payload
        .category
        .ok_or_else(|| format!("accounts[{index}].category is required"))?;
    let id = payload.id.unwrap_or_else(|| format!("account-{}", index + 1));
    Ok(AccountSettings {
        name: payload.name.unwrap_or_else(|| id.clone()),
        id,
        category,
        balance: payload.balance.unwrap_or(0.0),
        annual_contribution: payload.annual_contribution.unwrap_or(0.0),
        contribution_growth: payload.contribution_growth.unwrap_or(0.0),
        return_rate: payload.return_rate.unwrap_or(0.0),
        match_rate: payload.match_rate.unwrap_or(0.0),
        match_limit: payload.match_limit,
    })
}

fn settings_from_payload(payload: ProjectPayload) -> Result<PlanSettings, String> {
    let mut settings = default_plan_settings();

    if let Some(v) = payload.current_age {
        settings.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        settings.retirement_age = v;
    }
    if let Some(v) = payload.life_expectancy {
        settings.life_expectancy = v;
    }
    if let Some(v) = payload.filing_status {
        settings.filing_status = v;
    }
    if let Some(v) = payload.jurisdiction {
        settings.jurisdiction = v;
    }
    if let Some(v) = payload.base_year {
        settings.base_year = v;
    }
    if let Some(v) = payload.state_tax_rate {
        settings.state_tax_rate = v;
    }

    if let Some(v) = payload.primary_benefit_amount {
        settings.primary_benefit_amount = v;
    }
    if let Some(v) = payload.primary_benefit_start_age {
        settings.primary_benefit_start_age = v;
    }
    if let Some(v) = payload.secondary_benefit_amount {
        settings.secondary_benefit_amount = v;
    }
    if let Some(v) = payload.secondary_benefit_start_age {
        settings.secondary_benefit_start_age = v;
    }

    if let Some(v) = payload.inflation_rate {
        settings.inflation_rate = v;
    }
    if let Some(v) = payload.safe_withdrawal_rate {
        settings.safe_withdrawal_rate = v;
    }
    if let Some(v) = payload.retirement_return_rate {
        settings.retirement_return_rate = v;
    }
    if payload.bracket_fill_rate.is_some() {
        settings.bracket_fill_rate = payload.bracket_fill_rate;
    }

    if let Some(accounts) = payload.accounts {
        settings.accounts = accounts
            .into_iter()
            .enumerate()
            .map(|(i, a)| account_settings_from_payload(i, a))
            .collect::<Result<_, _>>()?;
    }

    Ok(settings)
}

fn optional_claim(amount: f64, start_age: u32) -> Option<BenefitClaim> {
    (amount > 0.0).then_some(BenefitClaim {
        annual_amount: amount,
        start_age,
    })
}

fn build_plan(settings: PlanSettings) -> Result<Plan, String> {
    if settings.accounts.is_empty() {
        return Err("accounts must not be empty".to_string());
    }
    for (i, account) in settings.accounts.iter().enumerate() {
        if settings.accounts[..i].iter().any(|a| a.id == account.id) {
            return Err(format!("duplicate account id '{}'", account.id));
        }
    }
    if !settings.primary_benefit_amount.is_finite() || settings.primary_benefit_amount < 0.0 {
        return Err("primaryBenefitAmount must be >= 0".to_string());
    }
    if !settings.secondary_benefit_amount.is_finite() || settings.secondary_benefit_amount < 0.0 {
        return Err("secondaryBenefitAmount must be >= 0".to_string());
    }
    if !(0.0..=100.0).contains(&settings.state_tax_rate) {
        return Err("stateTaxRate must be between 0 and 100".to_string());
    }
    if !(0.0..=100.0).contains(&settings.safe_withdrawal_rate) {
        return Err("safeWithdrawalRate must be between 0 and 100".to_string());
    }
    if settings
        .bracket_fill_rate
        .is_some_and(|rate| !(0.0..=100.0).contains(&rate))
    {
        return Err("bracketFillRate must be between 0 and 100".to_string());
    }
    if settings.inflation_rate <= -100.0 {
        return Err("inflationRate must be > -100".to_string());
    }
    if settings.retirement_return_rate <= -100.0 {
        return Err("retirementReturnRate must be > -100".to_string());
    }

    let accounts = settings
        .accounts
        .into_iter()
        .map(|a| Account {
            id: a.id,
            name: a.name,
            category: a.category,
            balance: a.balance,
            annual_contribution: a.annual_contribution,
            contribution_growth_rate: a.contribution_growth / 100.0,
            return_rate: a.return_rate / 100.0,
            employer_match: (a.match_rate > 0.0).then_some(EmployerMatch {
                rate: a.match_rate / 100.0,
                annual_limit: a.match_limit,
            }),
        })
        .collect();

    Ok(Plan {
        accounts,
        profile: Profile {
            current_age: settings.current_age,
            retirement_age: settings.retirement_age,
            life_expectancy: settings.life_expectancy,
            filing_status: settings.filing_status,
            state_tax_rate: settings.state_tax_rate / 100.0,
            jurisdiction: settings.jurisdiction,
            base_year: settings.base_year,
            primary_benefit: optional_claim(
                settings.primary_benefit_amount,
                settings.primary_benefit_start_age,
            ),
            secondary_benefit: optional_claim(
                settings.secondary_benefit_amount,
                settings.secondary_benefit_start_age,
            ),
        },
        assumptions: Assumptions {
            inflation_rate: settings.inflation_rate / 100.0,
            safe_withdrawal_rate: settings.safe_withdrawal_rate / 100.0,
            retirement_return_rate: settings.retirement_return_rate / 100.0,
            bracket_fill_rate: settings.bracket_fill_rate.map(|rate| rate / 100.0),
        },
    })
}

pub fn plan_from_payload(payload: ProjectPayload) -> Result<Plan, String> {
    build_plan(settings_from_payload(payload)?)
}

pub fn plan_from_json(json: &str) -> Result<Plan, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid plan JSON payload: {e}"))?;
    plan_from_payload(payload)
}

pub fn run_projection(plan: &Plan) -> Result<ProjectResponse, ProjectionError> {
    let accumulation = project_accumulation(&plan.accounts, &plan.profile)?;
    let retirement = project_withdrawals(
        &plan.accounts,
        &plan.profile,
        &plan.assumptions,
        &accumulation,
    )?;
    Ok(ProjectResponse {
        accumulation,
        retirement,
    })
}

fn tax_quote(payload: TaxQuotePayload) -> Result<TaxQuoteResponse, String> {
    let code = payload.jurisdiction.unwrap_or(JurisdictionCode::Us);
    let status = payload.filing_status.unwrap_or(FilingStatus::Single);
    let ordinary_income = payload.ordinary_income.unwrap_or(0.0);
    let capital_gains = payload.capital_gains.unwrap_or(0.0);
    let state_tax_rate = payload.state_tax_rate.unwrap_or(0.0);

    if !ordinary_income.is_finite() {
        return Err("ordinaryIncome must be a finite number".to_string());
    }
    if !capital_gains.is_finite() {
        return Err("capitalGains must be a finite number".to_string());
    }
    if !(0.0..=100.0).contains(&state_tax_rate) {
        return Err("stateTaxRate must be between 0 and 100".to_string());
    }
    if payload
        .bracket_fill_rate
        .is_some_and(|rate| !(0.0..=100.0).contains(&rate))
    {
        return Err("bracketFillRate must be between 0 and 100".to_string());
    }

    let provider = jurisdiction::provider(code);
    let tax = provider.income_tax(ordinary_income, capital_gains, status, state_tax_rate / 100.0);
    let fill_rate = payload
        .bracket_fill_rate
        .map_or_else(|| provider.default_fill_rate(status), |rate| rate / 100.0);
    let gross = ordinary_income.max(0.0) + capital_gains.max(0.0);

    Ok(TaxQuoteResponse {
        jurisdiction: code,
        filing_status: status,
        ordinary_income,
        capital_gains,
        federal_tax: tax.federal,
        sub_national_tax: tax.sub_national,
        total_tax: tax.total(),
        effective_rate: if gross > 0.0 { tax.total() / gross } else { 0.0 },
        marginal_rate: provider.marginal_rate(ordinary_income, status),
        bracket_fill_rate: fill_rate,
        bracket_headroom: provider.bracket_fill_headroom(ordinary_income, fill_rate, status),
    })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/api/tax", get(tax_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "retirement projection API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_handler_impl(payload: ProjectPayload) -> Response {
    let plan = match plan_from_payload(payload) {
        Ok(plan) => plan,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match run_projection(&plan) {
        Ok(response) => {
            debug!(
                accounts = plan.accounts.len(),
                depletion_age = ?response.retirement.depletion_age,
                "projection served"
            );
            json_response(StatusCode::OK, response)
        }
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn tax_handler(Query(payload): Query<TaxQuotePayload>) -> Response {
    match tax_quote(payload) {
        Ok(quote) => json_response(StatusCode::OK, quote),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn empty_payload_uses_default_plan() {
        let plan = plan_from_json("{}").expect("default plan is valid");
        assert_eq!(plan.profile.current_age, 40);
        assert_eq!(plan.profile.jurisdiction, JurisdictionCode::Us);
        assert_eq!(plan.accounts.len(), 4);
        assert_approx(plan.assumptions.safe_withdrawal_rate, 0.04);
        assert_approx(plan.accounts[0].return_rate, 0.07);
        let employer_match = plan.accounts[0].employer_match.expect("401k is matched");
        assert_approx(employer_match.rate, 0.5);
    }

    #[test]
    fn payload_keys_and_aliases_parse() {
        let plan = plan_from_json(
            r#"{
                "currentAge": 50,
                "retirementAge": 60,
                "lifeExpectancy": 95,
                "filingStatus": "mfj",
                "jurisdiction": "ca",
                "stateTaxRate": 0,
                "bracketFillRate": 20.5,
                "secondaryBenefitAmount": 8000,
                "accounts": [
                    { "id": "rrsp", "category": "rrsp", "balance": 400000, "returnRate": 6 },
                    { "category": "tfsa", "balance": 90000 }
                ]
            }"#,
        )
        .expect("valid plan");

        assert_eq!(plan.profile.filing_status, FilingStatus::MarriedJoint);
        assert_eq!(plan.profile.jurisdiction, JurisdictionCode::Canada);
        assert_eq!(plan.accounts[1].id, "account-2");
        assert_eq!(plan.accounts[1].category, AccountCategory::Tfsa);
        assert_approx(plan.accounts[0].return_rate, 0.06);
        assert_eq!(plan.assumptions.bracket_fill_rate, Some(0.205));
        let oas = plan.profile.secondary_benefit.expect("oas claim");
        assert_eq!(oas.start_age, 65);
    }

    #[test]
    fn account_without_category_is_rejected() {
        let err = plan_from_json(r#"{ "accounts": [ { "balance": 1 } ] }"#)
            .expect_err("must reject");
        assert!(err.contains("accounts[0].category"));
    }

    #[test]
    fn unknown_category_is_a_payload_error() {
        let err = plan_from_json(r#"{ "accounts": [ { "category": "pension" } ] }"#)
            .expect_err("must reject");
        assert!(err.contains("Invalid plan JSON payload"));
    }

    #[test]
    fn duplicate_account_ids_are_rejected() {
        let err = plan_from_json(
            r#"{ "accounts": [ { "id": "a", "category": "roth" }, { "id": "a", "category": "hsa" } ] }"#,
        )
        .expect_err("must reject");
        assert!(err.contains("duplicate account id"));
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        let err = plan_from_json(r#"{ "safeWithdrawalRate": 150 }"#).expect_err("must reject");
        assert!(err.contains("safeWithdrawalRate"));
        let err = plan_from_json(r#"{ "stateTaxRate": -1 }"#).expect_err("must reject");
        assert!(err.contains("stateTaxRate"));
    }

    #[test]
    fn invalid_ages_surface_projection_error() {
        let plan = plan_from_json(r#"{ "currentAge": 70, "retirementAge": 65 }"#)
            .expect("payload is well-formed");
        let err = run_projection(&plan).expect_err("must reject");
        assert!(matches!(err, ProjectionError::RetirementAge { .. }));
    }

    #[test]
    fn unbounded_horizon_is_rejected_before_simulating() {
        let plan = plan_from_json(r#"{ "lifeExpectancy": 5000000 }"#)
            .expect("payload is well-formed");
        let err = run_projection(&plan).expect_err("must reject");
        assert!(matches!(err, ProjectionError::HorizonTooLong { .. }));
    }

    #[test]
    fn extreme_base_year_is_rejected_not_overflowed() {
        let plan = plan_from_json(r#"{ "baseYear": 2147483647 }"#)
            .expect("payload is well-formed");
        let err = run_projection(&plan).expect_err("must reject");
        assert!(matches!(err, ProjectionError::BaseYear { .. }));
    }

    #[test]
    fn projection_response_serializes_camel_case() {
        let plan = plan_from_json("{}").expect("default plan is valid");
        let response = run_projection(&plan).expect("default plan projects");
        let json = serde_json::to_value(&response).expect("serializable");

        assert!(json["accumulation"]["totalAtRetirement"].is_number());
        assert!(json["accumulation"]["byGroup"].is_array());
        let years = json["retirement"]["years"].as_array().expect("years array");
        assert_eq!(years.len(), 92 - 65 + 1);
        assert!(years[0]["afterTaxIncome"].is_number());
        assert!(years[0]["mandatoryDistribution"].is_number());
        assert!(json["retirement"]["sustainableMonthlyWithdrawal"].is_number());
    }

    #[test]
    fn tax_quote_matches_federal_tables() {
        let quote = tax_quote(TaxQuotePayload {
            filing_status: Some(FilingStatus::MarriedJoint),
            ordinary_income: Some(129_200.0),
            state_tax_rate: Some(5.0),
            ..TaxQuotePayload::default()
        })
        .expect("valid quote");

        assert_approx(quote.federal_tax, 12_106.0);
        assert_approx(quote.sub_national_tax, 6_460.0);
        assert_approx(quote.marginal_rate, 0.22);
        assert_approx(quote.bracket_fill_rate, 0.12);
        assert_approx(quote.bracket_headroom, 0.0);
    }

    #[test]
    fn tax_quote_rejects_bad_state_rate() {
        let err = tax_quote(TaxQuotePayload {
            state_tax_rate: Some(120.0),
            ..TaxQuotePayload::default()
        })
        .map(|_| ())
        .expect_err("must reject");
        assert!(err.contains("stateTaxRate"));
    }

    #[test]
    fn error_body_has_error_key() {
        let body = serde_json::to_value(ErrorResponse {
            error: "boom".to_string(),
        })
        .expect("serializable");
        assert_eq!(body["error"], "boom");
    }
}
