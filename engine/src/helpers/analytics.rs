//! Analytics helpers
//!
//! These helpers read pre-aggregated order and click metrics through
//! `get_field` and store computed values on the contact. Any destination
//! field set to `do_not_save` is computed but not written.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sdk::types::{is_empty_value, value_as_f64, value_to_string};
use sdk::{
    ConfigSchema, ExecContext, ExecutionFailure, Helper, HelperCategory, HelperConfig, HelperError,
    HelperInput, HelperOutput, PropertySchema,
};
use serde_json::{json, Value};
use url::Url;

use crate::helpers::{
    decimal_from_f64, decimal_to_json, destination, invalid_config, read_field, round_decimal,
    write_field, PrimaryStep, DO_NOT_SAVE,
};

/// Metric keys exposed by connectors
pub mod metrics {
    pub const ORDER_COUNT: &str = "orders.count";
    pub const ORDER_TOTAL: &str = "orders.total";
    pub const FIRST_ORDER_DATE: &str = "orders.first_date";
    pub const LAST_ORDER_DATE: &str = "orders.last_date";
    pub const LAST_CLICK_URL: &str = "clicks.last_url";
    pub const LAST_CLICK_DATE: &str = "clicks.last_date";
    pub const LAST_UTM_SOURCE: &str = "clicks.last_utm_source";
    pub const LAST_UTM_MEDIUM: &str = "clicks.last_utm_medium";
    pub const LAST_UTM_CAMPAIGN: &str = "clicks.last_utm_campaign";
}

/// Parse a metric date: RFC 3339, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value_to_string(value);
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .ok()
}

fn destination_property(what: &str, default: &str) -> PropertySchema {
    PropertySchema::string(format!(
        "Field to store the {}; \"{}\" to skip",
        what, DO_NOT_SAVE
    ))
    .with_default(json!(default))
}

async fn read_number(
    ctx: &ExecContext,
    input: &HelperInput,
    output: &mut HelperOutput,
    key: &str,
) -> Result<Option<f64>, ExecutionFailure> {
    let value = read_field(ctx, input, key)
        .await
        .primary(output, || format!("Failed to read metric '{}'", key))?;
    match value.filter(|v| !is_empty_value(Some(v))) {
        None => Ok(None),
        Some(v) => value_as_f64(&v)
            .map(Some)
            .ok_or_else(|| {
                HelperError::InvalidData(format!("metric '{}' is not a number", key))
            })
            .primary(output, || format!("Metric '{}' is not numeric", key)),
    }
}

async fn read_date(
    ctx: &ExecContext,
    input: &HelperInput,
    output: &mut HelperOutput,
    key: &str,
) -> Result<Option<NaiveDate>, ExecutionFailure> {
    let value = read_field(ctx, input, key)
        .await
        .primary(output, || format!("Failed to read metric '{}'", key))?;
    let Some(value) = value.filter(|v| !is_empty_value(Some(v))) else {
        return Ok(None);
    };
    match parse_date(&value) {
        Some(date) => Ok(Some(date)),
        None => {
            output.log(format!(
                "Ignoring unparseable date in '{}': {}",
                key,
                value_to_string(&value)
            ));
            Ok(None)
        }
    }
}

/// Write computed values to their destinations, skipping disabled ones
async fn save_all(
    ctx: &ExecContext,
    input: &HelperInput,
    output: &mut HelperOutput,
    values: Vec<(Option<&str>, Value)>,
) -> Result<(), ExecutionFailure> {
    for (field, value) in values {
        let Some(field) = field else {
            continue;
        };
        write_field(ctx, input, output, field, value)
            .await
            .primary(output, || format!("Failed to write field '{}'", field))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// rfm_calculation
// ---------------------------------------------------------------------------

/// Score a value against ascending thresholds, 1 to `thresholds.len() + 1`
///
/// Every satisfied `value >= threshold` raises the score to the next level;
/// the last satisfied threshold wins, so a value on a boundary takes the
/// higher score.
pub fn score_ascending(value: f64, thresholds: &[f64]) -> u8 {
    let mut score = 1;
    for (index, threshold) in thresholds.iter().enumerate() {
        if value >= *threshold {
            score = index as u8 + 2;
        }
    }
    score
}

/// Score days since the last order against ascending day windows
///
/// Windows are checked from the widest down; each satisfied
/// `days <= window` raises the score, so recent buyers score highest.
pub fn score_recency(days: f64, windows: &[f64]) -> u8 {
    let mut score = 1;
    for (index, window) in windows.iter().rev().enumerate() {
        if days <= *window {
            score = index as u8 + 2;
        }
    }
    score
}

fn thresholds(config: &HelperConfig, key: &str) -> Result<Vec<f64>, HelperError> {
    let values = config.number_list(key)?;
    if values.len() != 4 {
        return Err(HelperError::config(format!(
            "{} must contain exactly 4 numbers",
            key
        )));
    }
    if values.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(HelperError::config(format!("{} must be in ascending order", key)));
    }
    Ok(values)
}

struct RfmSettings<'a> {
    recency: Vec<f64>,
    frequency: Vec<f64>,
    monetary: Vec<f64>,
    recency_field: Option<&'a str>,
    frequency_field: Option<&'a str>,
    monetary_field: Option<&'a str>,
    score_field: Option<&'a str>,
}

impl<'a> RfmSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            recency: thresholds(config, "recency_thresholds")?,
            frequency: thresholds(config, "frequency_thresholds")?,
            monetary: thresholds(config, "monetary_thresholds")?,
            recency_field: destination(config, "recency_field", "rfm_recency")?,
            frequency_field: destination(config, "frequency_field", "rfm_frequency")?,
            monetary_field: destination(config, "monetary_field", "rfm_monetary")?,
            score_field: destination(config, "rfm_score_field", "rfm_score")?,
        })
    }
}

/// Recency / frequency / monetary scoring
#[derive(Debug, Default, Clone, Copy)]
pub struct RfmCalculation;

#[async_trait]
impl Helper for RfmCalculation {
    fn name(&self) -> &str {
        "RFM Calculation"
    }

    fn helper_type(&self) -> &str {
        "rfm_calculation"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Analytics
    }

    fn description(&self) -> &str {
        "Score the contact on recency, frequency and monetary value of their orders"
    }

    fn config_schema(&self) -> ConfigSchema {
        let threshold_list = |what: &str| {
            PropertySchema::array(
                format!("Four ascending {} thresholds", what),
                PropertySchema::number("Threshold"),
            )
        };
        ConfigSchema::new()
            .required("recency_thresholds", threshold_list("days-since-last-order"))
            .required("frequency_thresholds", threshold_list("order count"))
            .required("monetary_thresholds", threshold_list("total revenue"))
            .optional("recency_field", destination_property("recency score", "rfm_recency"))
            .optional(
                "frequency_field",
                destination_property("frequency score", "rfm_frequency"),
            )
            .optional("monetary_field", destination_property("monetary score", "rfm_monetary"))
            .optional("rfm_score_field", destination_property("combined score", "rfm_score"))
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        RfmSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = RfmSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let count = read_number(ctx, input, &mut output, metrics::ORDER_COUNT)
            .await?
            .unwrap_or(0.0);
        if count <= 0.0 {
            return Ok(output.succeed("No orders found for contact"));
        }
        let total = read_number(ctx, input, &mut output, metrics::ORDER_TOTAL)
            .await?
            .unwrap_or(0.0);
        let last_order = read_date(ctx, input, &mut output, metrics::LAST_ORDER_DATE).await?;

        let recency = match last_order {
            Some(date) => {
                let days = (Utc::now().date_naive() - date).num_days().max(0);
                score_recency(days as f64, &s.recency)
            }
            None => {
                output.log("No last order date, recency scored 1");
                1
            }
        };
        let frequency = score_ascending(count, &s.frequency);
        let monetary = score_ascending(total, &s.monetary);
        let combined = format!("{}{}{}", recency, frequency, monetary);

        save_all(
            ctx,
            input,
            &mut output,
            vec![
                (s.recency_field, json!(recency)),
                (s.frequency_field, json!(frequency)),
                (s.monetary_field, json!(monetary)),
                (s.score_field, json!(combined)),
            ],
        )
        .await?;

        Ok(output.succeed(format!("RFM score {}", combined)))
    }
}

// ---------------------------------------------------------------------------
// customer_lifetime_value
// ---------------------------------------------------------------------------

/// Lifetime value figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clv {
    pub average_order_value: Decimal,
    pub total_revenue: Decimal,
    pub order_count: Decimal,
    pub lifetime_value: Decimal,
}

/// Compute lifetime value
///
/// Average order value is revenue over orders. The customer lifespan is the
/// span between first and last order in years, at least one year. The
/// projection is average order value times orders per year times
/// `projection_years`. Money values are rounded to cents.
pub fn compute_clv(
    count: f64,
    total: f64,
    lifespan_days: i64,
    projection_years: f64,
) -> Result<Clv, HelperError> {
    let order_count = decimal_from_f64(count)?;
    let total_revenue = decimal_from_f64(total)?;
    let projection = decimal_from_f64(projection_years)?;
    let overflow = || HelperError::InvalidData("lifetime value overflowed".to_string());

    let aov = total_revenue.checked_div(order_count).ok_or_else(overflow)?;
    let lifespan_years = (Decimal::from(lifespan_days.max(0)) / Decimal::from(365)).max(Decimal::ONE);
    let per_year = order_count.checked_div(lifespan_years).ok_or_else(overflow)?;
    let clv = aov
        .checked_mul(per_year)
        .and_then(|v| v.checked_mul(projection))
        .ok_or_else(overflow)?;

    Ok(Clv {
        average_order_value: round_decimal(aov, 2),
        total_revenue: round_decimal(total_revenue, 2),
        order_count,
        lifetime_value: round_decimal(clv, 2),
    })
}

struct ClvSettings<'a> {
    aov_field: Option<&'a str>,
    revenue_field: Option<&'a str>,
    count_field: Option<&'a str>,
    clv_field: Option<&'a str>,
    projection_years: f64,
}

impl<'a> ClvSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        let projection_years = config.number_or("projection_years", 3.0)?;
        if projection_years <= 0.0 {
            return Err(HelperError::config("projection_years must be greater than zero"));
        }
        Ok(Self {
            aov_field: destination(config, "aov_field", "average_order_value")?,
            revenue_field: destination(config, "total_revenue_field", "total_revenue")?,
            count_field: destination(config, "order_count_field", "order_count")?,
            clv_field: destination(config, "clv_field", "customer_lifetime_value")?,
            projection_years,
        })
    }
}

/// Customer lifetime value projection
#[derive(Debug, Default, Clone, Copy)]
pub struct CustomerLifetimeValue;

#[async_trait]
impl Helper for CustomerLifetimeValue {
    fn name(&self) -> &str {
        "Customer Lifetime Value"
    }

    fn helper_type(&self) -> &str {
        "customer_lifetime_value"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Analytics
    }

    fn description(&self) -> &str {
        "Compute average order value and projected lifetime value from order history"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("aov_field", destination_property("average order value", "average_order_value"))
            .optional(
                "total_revenue_field",
                destination_property("total revenue", "total_revenue"),
            )
            .optional("order_count_field", destination_property("order count", "order_count"))
            .optional("clv_field", destination_property("lifetime value", "customer_lifetime_value"))
            .optional(
                "projection_years",
                PropertySchema::number("Years to project forward").with_default(json!(3)),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        ClvSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = ClvSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let count = read_number(ctx, input, &mut output, metrics::ORDER_COUNT)
            .await?
            .unwrap_or(0.0);
        if count <= 0.0 {
            return Ok(output.succeed("No invoices found for contact"));
        }
        let total = read_number(ctx, input, &mut output, metrics::ORDER_TOTAL)
            .await?
            .unwrap_or(0.0);
        let first = read_date(ctx, input, &mut output, metrics::FIRST_ORDER_DATE).await?;
        let last = read_date(ctx, input, &mut output, metrics::LAST_ORDER_DATE).await?;
        let lifespan_days = match (first, last) {
            (Some(first), Some(last)) => (last - first).num_days(),
            _ => 0,
        };

        let clv = compute_clv(count, total, lifespan_days, s.projection_years)
            .primary(&mut output, || "Could not compute lifetime value".to_string())?;

        save_all(
            ctx,
            input,
            &mut output,
            vec![
                (s.aov_field, decimal_to_json(clv.average_order_value)),
                (s.revenue_field, decimal_to_json(clv.total_revenue)),
                (s.count_field, decimal_to_json(clv.order_count)),
                (s.clv_field, decimal_to_json(clv.lifetime_value)),
            ],
        )
        .await?;

        Ok(output.succeed(format!(
            "Lifetime value {} (average order {})",
            clv.lifetime_value, clv.average_order_value
        )))
    }
}

// ---------------------------------------------------------------------------
// last_click_it
// ---------------------------------------------------------------------------

/// UTM parameter from a URL's query string
pub fn utm_from_url(url: &str, parameter: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == parameter)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
}

struct LastClickSettings<'a> {
    url_field: Option<&'a str>,
    date_field: Option<&'a str>,
    source_field: Option<&'a str>,
    medium_field: Option<&'a str>,
    campaign_field: Option<&'a str>,
}

impl<'a> LastClickSettings<'a> {
    fn parse(config: &'a HelperConfig) -> Result<Self, HelperError> {
        Ok(Self {
            url_field: destination(config, "url_field", "last_click_url")?,
            date_field: destination(config, "date_field", "last_click_date")?,
            source_field: destination(config, "source_field", "last_click_source")?,
            medium_field: destination(config, "medium_field", "last_click_medium")?,
            campaign_field: destination(config, "campaign_field", "last_click_campaign")?,
        })
    }
}

/// Copy last-click attribution onto the contact
#[derive(Debug, Default, Clone, Copy)]
pub struct LastClickIt;

#[async_trait]
impl Helper for LastClickIt {
    fn name(&self) -> &str {
        "Last Click It"
    }

    fn helper_type(&self) -> &str {
        "last_click_it"
    }

    fn category(&self) -> HelperCategory {
        HelperCategory::Analytics
    }

    fn description(&self) -> &str {
        "Store the contact's last clicked link and its UTM attribution"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("url_field", destination_property("last clicked URL", "last_click_url"))
            .optional("date_field", destination_property("click date", "last_click_date"))
            .optional("source_field", destination_property("UTM source", "last_click_source"))
            .optional("medium_field", destination_property("UTM medium", "last_click_medium"))
            .optional(
                "campaign_field",
                destination_property("UTM campaign", "last_click_campaign"),
            )
    }

    fn validate_config(&self, config: &HelperConfig) -> Result<(), HelperError> {
        LastClickSettings::parse(config).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        input: &HelperInput,
    ) -> Result<HelperOutput, ExecutionFailure> {
        let s = LastClickSettings::parse(&input.config).map_err(invalid_config)?;
        let mut output = HelperOutput::new();

        let url = read_field(ctx, input, metrics::LAST_CLICK_URL)
            .await
            .primary(&mut output, || "Failed to read the last click".to_string())?
            .filter(|v| !is_empty_value(Some(v)))
            .map(|v| value_to_string(&v));
        let Some(url) = url else {
            return Ok(output.succeed("No click recorded for contact"));
        };

        let mut values = vec![(s.url_field, Value::String(url.clone()))];
        if let Some(date) = read_field(ctx, input, metrics::LAST_CLICK_DATE)
            .await
            .primary(&mut output, || "Failed to read the last click date".to_string())?
            .filter(|v| !is_empty_value(Some(v)))
        {
            values.push((s.date_field, date));
        }

        let utm = [
            (metrics::LAST_UTM_SOURCE, "utm_source", s.source_field),
            (metrics::LAST_UTM_MEDIUM, "utm_medium", s.medium_field),
            (metrics::LAST_UTM_CAMPAIGN, "utm_campaign", s.campaign_field),
        ];
        for (metric, parameter, field) in utm {
            let stored = read_field(ctx, input, metric)
                .await
                .primary(&mut output, || format!("Failed to read metric '{}'", metric))?
                .filter(|v| !is_empty_value(Some(v)))
                .map(|v| value_to_string(&v));
            if let Some(value) = stored.or_else(|| utm_from_url(&url, parameter)) {
                values.push((field, Value::String(value)));
            }
        }

        save_all(ctx, input, &mut output, values).await?;
        Ok(output.succeed(format!("Recorded last click on {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::MemoryConnector;
    use crate::helpers::testing::{config, run};
    use chrono::Duration;
    use std::sync::Arc;

    const WINDOWS: [f64; 4] = [7.0, 30.0, 90.0, 180.0];
    const COUNTS: [f64; 4] = [2.0, 5.0, 10.0, 20.0];

    fn rfm_config() -> HelperConfig {
        config(&[
            ("recency_thresholds", json!(WINDOWS)),
            ("frequency_thresholds", json!(COUNTS)),
            ("monetary_thresholds", json!([100, 500, 1000, 5000])),
        ])
    }

    fn days_ago(days: i64) -> String {
        (Utc::now() - Duration::days(days)).format("%Y-%m-%d").to_string()
    }

    #[test]
    fn test_score_ascending_last_satisfied_wins() {
        assert_eq!(score_ascending(0.0, &COUNTS), 1);
        assert_eq!(score_ascending(2.0, &COUNTS), 2);
        assert_eq!(score_ascending(4.0, &COUNTS), 2);
        assert_eq!(score_ascending(5.0, &COUNTS), 3);
        assert_eq!(score_ascending(20.0, &COUNTS), 5);
        // Above every threshold: 5, not the 2 a first-match reading gives
        assert_eq!(score_ascending(1_000.0, &COUNTS), 5);
    }

    #[test]
    fn test_score_recency() {
        assert_eq!(score_recency(0.0, &WINDOWS), 5);
        assert_eq!(score_recency(7.0, &WINDOWS), 5);
        assert_eq!(score_recency(8.0, &WINDOWS), 4);
        assert_eq!(score_recency(30.0, &WINDOWS), 4);
        assert_eq!(score_recency(180.0, &WINDOWS), 2);
        assert_eq!(score_recency(181.0, &WINDOWS), 1);
    }

    #[test]
    fn test_thresholds_must_be_four_ascending_numbers() {
        let bad = [json!([1, 2, 3]), json!([1, 3, 2, 4]), json!([1, 1, 2, 3])];
        for thresholds in bad {
            let config = rfm_config().with("frequency_thresholds", thresholds);
            assert!(RfmCalculation.validate_config(&config).is_err());
        }
        assert!(RfmCalculation.validate_config(&rfm_config()).is_ok());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(parse_date(&json!("2024-05-01")), expected);
        assert_eq!(parse_date(&json!("2024-05-01T23:00:00Z")), expected);
        assert_eq!(parse_date(&json!("2024-05-01 08:30:00")), expected);
        assert_eq!(parse_date(&json!("May 1st")), None);
    }

    #[tokio::test]
    async fn test_rfm_zero_orders() {
        let crm = Arc::new(MemoryConnector::new().with_fields("c-1", &[("orders.count", json!(0))]));
        let output = run(&RfmCalculation, &crm, rfm_config()).await.unwrap();

        assert!(output.success);
        assert_eq!(output.message, "No orders found for contact");
        assert!(output.actions.is_empty());
    }

    #[tokio::test]
    async fn test_rfm_writes_scores() {
        let crm = Arc::new(MemoryConnector::new().with_fields(
            "c-1",
            &[
                ("orders.count", json!(6)),
                ("orders.total", json!("1200.50")),
                ("orders.last_date", json!(days_ago(10))),
            ],
        ));
        let config = rfm_config().with("monetary_field", json!("do_not_save"));
        let output = run(&RfmCalculation, &crm, config).await.unwrap();

        assert_eq!(output.message, "RFM score 434");
        assert_eq!(output.actions.len(), 3);
        assert_eq!(crm.field("c-1", "rfm_score"), Some(json!("434")));
        assert_eq!(crm.field("c-1", "rfm_recency"), Some(json!(4)));
        assert_eq!(crm.field("c-1", "rfm_monetary"), None);
    }

    #[test]
    fn test_compute_clv() {
        // 10 orders worth 1000 over two years, projected three years
        let clv = compute_clv(10.0, 1000.0, 730, 3.0).unwrap();
        assert_eq!(clv.average_order_value, Decimal::from(100));
        assert_eq!(clv.lifetime_value, Decimal::from(1500));

        // Short histories count as one year
        let clv = compute_clv(3.0, 100.0, 20, 1.0).unwrap();
        assert_eq!(clv.average_order_value.to_string(), "33.33");
        assert_eq!(clv.lifetime_value.to_string(), "100.00");
    }

    #[tokio::test]
    async fn test_clv_zero_orders_message() {
        let crm = Arc::new(MemoryConnector::new().with_fields("c-1", &[]));
        let output = run(&CustomerLifetimeValue, &crm, HelperConfig::new())
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.message, "No invoices found for contact");
        assert!(output.actions.is_empty());
    }

    #[test]
    fn test_utm_from_url() {
        let url = "https://example.com/landing?utm_source=newsletter&utm_medium=email&x=1";
        assert_eq!(utm_from_url(url, "utm_source").as_deref(), Some("newsletter"));
        assert_eq!(utm_from_url(url, "utm_campaign"), None);
        assert_eq!(utm_from_url("not a url", "utm_source"), None);
    }

    #[tokio::test]
    async fn test_last_click_falls_back_to_url_query() {
        let crm = Arc::new(MemoryConnector::new().with_fields(
            "c-1",
            &[
                (
                    "clicks.last_url",
                    json!("https://example.com/?utm_source=ads&utm_campaign=spring"),
                ),
                ("clicks.last_utm_source", json!("partner")),
                ("clicks.last_date", json!("2024-04-02")),
            ],
        ));
        let output = run(
            &LastClickIt,
            &crm,
            config(&[("medium_field", json!("do_not_save"))]),
        )
        .await
        .unwrap();

        assert_eq!(output.actions.len(), 4);
        assert_eq!(crm.field("c-1", "last_click_source"), Some(json!("partner")));
        assert_eq!(crm.field("c-1", "last_click_campaign"), Some(json!("spring")));
        assert_eq!(crm.field("c-1", "last_click_date"), Some(json!("2024-04-02")));
    }

    #[tokio::test]
    async fn test_last_click_without_click_is_vacuous() {
        let crm = Arc::new(MemoryConnector::new().with_fields("c-1", &[]));
        let output = run(&LastClickIt, &crm, HelperConfig::new()).await.unwrap();
        assert!(output.actions.is_empty());
        assert_eq!(output.message, "No click recorded for contact");
    }
}
