use crate::{
    config::{LikelihoodWeights, StrategySettings},
    facts::FactMap,
};

use super::Scenario;

/// Score of one KPI against its target, capped at 1.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn kpi_score(latest: f64, target: f64) -> f64 {
    if target == 0.0 {
        if latest == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        (latest / target).min(1.0)
    }
}

/// Likelihood-weighted share of scenario conditions that hold in `environment`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn scenario_fit(
    scenarios: &[Scenario],
    environment: &FactMap,
    settings: &StrategySettings,
) -> f64 {
    if scenarios.is_empty() {
        return settings.default_scenario_fit;
    }
    let mut total_weight = 0.0;
    let mut weighted_match = 0.0;
    for scenario in scenarios {
        let weight = settings.likelihood_weights.weight(scenario.likelihood);
        total_weight += weight;
        let ratio = if scenario.conditions.is_empty() {
            settings.default_scenario_fit
        } else {
            let matched = scenario
                .conditions
                .iter()
                .filter(|(key, expected)| environment.get(*key) == Some(*expected))
                .count();
            matched as f64 / scenario.conditions.len() as f64
        };
        weighted_match += weight * ratio;
    }
    if total_weight > 0.0 {
        weighted_match / total_weight
    } else {
        settings.default_scenario_fit
    }
}

/// Probability x likelihood weight x summed impact.
#[must_use]
pub fn expected_impact(scenario: &Scenario, weights: &LikelihoodWeights) -> f64 {
    let total: f64 = scenario.impact.values().sum();
    scenario.probability * weights.weight(scenario.likelihood) * total
}

/// Banded advice for an overall score. `weak_kpis` are named in the middle band.
#[must_use]
pub fn recommendation(score: f64, weak_kpis: &[String]) -> String {
    if score >= 0.8 {
        "Strategy is on track; continue on the current course.".into()
    } else if score >= 0.6 {
        if weak_kpis.is_empty() {
            "Strategy is acceptable; minor improvements possible.".into()
        } else {
            let areas: Vec<&str> = weak_kpis.iter().take(2).map(String::as_str).collect();
            format!("Strategy is moderate; targeted improvement needed in {}.", areas.join(", "))
        }
    } else if score >= 0.4 {
        "Strategy is below expectations; revise it or consider an alternative.".into()
    } else {
        "Strategy is failing; an urgent change of strategy is recommended.".into()
    }
}

/// Relative change between the first and last of the trailing `window` samples.
/// A zero window covers no samples and yields `None`.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn trend(history: &[f64], window: usize) -> Option<f64> {
    let recent = &history[history.len().saturating_sub(window)..];
    let (&first, &last) = (recent.first()?, recent.last()?);
    if recent.len() < 2 || first == 0.0 {
        return None;
    }
    Some((last - first) / first.abs())
}

/// Mean of the trailing `window` samples.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trailing_mean(history: &[f64], window: usize) -> Option<f64> {
    let recent = &history[history.len().saturating_sub(window)..];
    if recent.is_empty() {
        return None;
    }
    Some(recent.iter().sum::<f64>() / recent.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{facts::FactValue, strategy::ScenarioLikelihood};
    use indexmap::indexmap;

    #[test]
    fn kpi_score_caps_and_handles_zero_target() {
        assert!((kpi_score(150.0, 100.0) - 1.0).abs() < 1e-12);
        assert!((kpi_score(30.0, 100.0) - 0.3).abs() < 1e-12);
        assert!((kpi_score(0.0, 0.0) - 1.0).abs() < 1e-12);
        assert!(kpi_score(2.0, 0.0).abs() < 1e-12);
    }

    #[test]
    fn fit_weights_by_likelihood() {
        let settings = StrategySettings::default();
        let env: FactMap = indexmap! { "market".into() => FactValue::from("bull") };
        let hit =
            Scenario::new("boom", ScenarioLikelihood::VeryLikely).with_condition("market", "bull");
        let miss = Scenario::new("bust", ScenarioLikelihood::Rare).with_condition("market", "bear");
        let fit = scenario_fit(&[hit, miss], &env, &settings);
        assert!((fit - 0.9).abs() < 1e-12);
        assert!((scenario_fit(&[], &env, &settings) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn recommendation_bands() {
        assert!(recommendation(0.85, &[]).contains("on track"));
        let weak = vec!["revenue".to_owned(), "churn".to_owned(), "nps".to_owned()];
        let mid = recommendation(0.65, &weak);
        assert!(mid.contains("revenue, churn"));
        assert!(!mid.contains("nps"));
        assert!(recommendation(0.45, &[]).contains("revise"));
        assert!(recommendation(0.1, &[]).contains("urgent"));
    }

    #[test]
    fn trend_needs_two_samples_and_nonzero_start() {
        assert_eq!(trend(&[1.0], 5), None);
        assert_eq!(trend(&[0.0, 5.0], 5), None);
        assert_eq!(trend(&[1.0, 2.0], 0), None);
        assert!((trend(&[9.0, 2.0, 3.0], 2).unwrap() - 0.5).abs() < 1e-12);
        assert!((trend(&[-2.0, 1.0], 5).unwrap() - 1.5).abs() < 1e-12);
        assert!((trailing_mean(&[1.0, 2.0, 3.0, 4.0], 2).unwrap() - 3.5).abs() < 1e-12);
    }
}
