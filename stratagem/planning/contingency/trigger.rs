use std::{convert::Infallible, fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a trigger reads its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Compare a metric against the threshold.
    Threshold,
    /// Compare a failure counter against the threshold.
    FailureCount,
    /// Metric is an epoch timestamp; fire once it is older than the threshold.
    Timeout,
    /// Same comparison as `Threshold`, for state-like metrics.
    Condition,
    /// Fire when the metric is at least 1.
    ExternalEvent,
}

/// Comparison used by threshold-style triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// Unrecognized operator text; never fires.
    Unsupported,
}

impl ComparisonOp {
    /// Applies the operator as `lhs op rhs`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Gte => lhs >= rhs,
            Self::Lte => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Unsupported => false,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Unsupported => "?",
        }
    }
}

impl FromStr for ComparisonOp {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.trim() {
            "gt" | ">" => Self::Gt,
            "lt" | "<" => Self::Lt,
            "gte" | ">=" => Self::Gte,
            "lte" | "<=" => Self::Lte,
            "eq" | "==" => Self::Eq,
            "ne" | "!=" => Self::Ne,
            _ => Self::Unsupported,
        })
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Condition that activates a contingency plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    /// Input kind.
    pub kind: TriggerKind,
    /// Metric or failure-counter key.
    pub metric_key: String,
    /// Comparison bound.
    pub threshold: f64,
    /// Comparison operator.
    pub operator: ComparisonOp,
    /// Human-readable reason used for activations.
    pub description: String,
}

impl TriggerCondition {
    fn build(
        kind: TriggerKind,
        key: impl Into<String>,
        operator: ComparisonOp,
        threshold: f64,
    ) -> Self {
        Self {
            kind,
            metric_key: key.into(),
            threshold,
            operator,
            description: String::new(),
        }
    }

    /// Metric threshold trigger.
    #[must_use]
    pub fn threshold(key: impl Into<String>, operator: ComparisonOp, threshold: f64) -> Self {
        Self::build(TriggerKind::Threshold, key, operator, threshold)
    }

    /// State comparison trigger.
    #[must_use]
    pub fn condition(key: impl Into<String>, operator: ComparisonOp, value: f64) -> Self {
        Self::build(TriggerKind::Condition, key, operator, value)
    }

    /// Fires once the failure counter reaches `count`.
    #[must_use]
    pub fn failure_count(key: impl Into<String>, count: f64) -> Self {
        Self::build(TriggerKind::FailureCount, key, ComparisonOp::Gte, count)
    }

    /// Fires once the timestamp in `key` is more than `seconds` old.
    #[must_use]
    pub fn timeout(key: impl Into<String>, seconds: f64) -> Self {
        Self::build(TriggerKind::Timeout, key, ComparisonOp::Gt, seconds)
    }

    /// Fires when the event flag in `key` is set.
    #[must_use]
    pub fn external_event(key: impl Into<String>) -> Self {
        Self::build(TriggerKind::ExternalEvent, key, ComparisonOp::Gte, 1.0)
    }

    /// Overrides the operator.
    #[must_use]
    pub const fn with_operator(mut self, operator: ComparisonOp) -> Self {
        self.operator = operator;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Reason text recorded on activation.
    #[must_use]
    pub fn reason(&self) -> String {
        if self.description.is_empty() {
            format!("{} {} {}", self.metric_key, self.operator, self.threshold)
        } else {
            self.description.clone()
        }
    }

    /// Evaluates the trigger. Missing inputs never fire.
    #[must_use]
    pub fn fires(
        &self,
        metrics: &IndexMap<String, f64>,
        failures: &IndexMap<String, u32>,
        now_epoch: f64,
    ) -> bool {
        match self.kind {
            TriggerKind::Threshold | TriggerKind::Condition => metrics
                .get(&self.metric_key)
                .is_some_and(|value| self.operator.compare(*value, self.threshold)),
            TriggerKind::FailureCount => failures
                .get(&self.metric_key)
                .is_some_and(|count| self.operator.compare(f64::from(*count), self.threshold)),
            TriggerKind::Timeout => metrics
                .get(&self.metric_key)
                .is_some_and(|started| now_epoch - started > self.threshold),
            TriggerKind::ExternalEvent => metrics
                .get(&self.metric_key)
                .is_some_and(|flag| *flag >= 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn metrics(key: &str, value: f64) -> IndexMap<String, f64> {
        indexmap! { key.to_owned() => value }
    }

    #[test]
    fn operators_parse_from_words_and_symbols() {
        assert_eq!("gte".parse::<ComparisonOp>().unwrap(), ComparisonOp::Gte);
        assert_eq!("!=".parse::<ComparisonOp>().unwrap(), ComparisonOp::Ne);
        assert_eq!("invalid_op".parse::<ComparisonOp>().unwrap(), ComparisonOp::Unsupported);
    }

    #[test]
    fn threshold_and_condition_compare() {
        let none = IndexMap::new();
        let t = TriggerCondition::threshold("cpu", ComparisonOp::Gt, 90.0);
        assert!(t.fires(&metrics("cpu", 95.0), &none, 0.0));
        assert!(!t.fires(&metrics("cpu", 80.0), &none, 0.0));
        let lt = TriggerCondition::threshold("disk", ComparisonOp::Lt, 10.0);
        assert!(lt.fires(&metrics("disk", 5.0), &none, 0.0));
        let eq = TriggerCondition::condition("mode", ComparisonOp::Eq, 2.0);
        assert!(eq.fires(&metrics("mode", 2.0), &none, 0.0));
    }

    #[test]
    fn fails_closed() {
        let no_metrics = IndexMap::new();
        let no_failures = IndexMap::new();
        let t = TriggerCondition::threshold("missing", ComparisonOp::Gt, 1.0);
        assert!(!t.fires(&no_metrics, &no_failures, 0.0));
        let bad = TriggerCondition::threshold("cpu", ComparisonOp::Unsupported, 50.0);
        assert!(!bad.fires(&metrics("cpu", 50.0), &no_failures, 0.0));
        assert!(!TriggerCondition::failure_count("api", 1.0).fires(&no_metrics, &no_failures, 0.0));
    }

    #[test]
    fn failure_timeout_and_event() {
        let no_metrics = IndexMap::new();
        let failures = indexmap! { "api".to_owned() => 5_u32 };
        assert!(TriggerCondition::failure_count("api", 5.0).fires(&no_metrics, &failures, 0.0));
        assert!(!TriggerCondition::failure_count("api", 6.0).fires(&no_metrics, &failures, 0.0));

        let timeout = TriggerCondition::timeout("heartbeat", 30.0);
        assert!(!timeout.fires(&metrics("heartbeat", 1000.0), &failures, 1020.0));
        assert!(timeout.fires(&metrics("heartbeat", 1000.0), &failures, 1031.0));

        let event = TriggerCondition::external_event("alert_fired");
        assert!(event.fires(&metrics("alert_fired", 1.0), &failures, 0.0));
        assert!(!event.fires(&metrics("alert_fired", 0.0), &failures, 0.0));
    }

    #[test]
    fn reason_prefers_description() {
        let t = TriggerCondition::threshold("cpu", ComparisonOp::Gt, 90.0);
        assert_eq!(t.reason(), "cpu > 90");
        assert_eq!(t.with_description("cpu hot").reason(), "cpu hot");
    }
}
