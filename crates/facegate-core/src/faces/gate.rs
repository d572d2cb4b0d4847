use serde::Serialize;

pub const DEFAULT_THRESHOLD: f64 = 70.0;

/// Accept/reject outcome on the 0-100 confidence scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Accepted { confidence: f64 },
    Rejected { confidence: f64, required: f64 },
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accepted { .. })
    }

    pub fn confidence(&self) -> f64 {
        match *self {
            GateDecision::Accepted { confidence } => confidence,
            GateDecision::Rejected { confidence, .. } => confidence,
        }
    }
}

/// Linear rescale of a cosine score to a percentage, clamped to [0, 100].
pub fn to_percentage(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    (score * 100.0).clamp(0.0, 100.0)
}

/// Scores at or above `threshold` (0-100 scale) are accepted.
pub fn evaluate(score: f64, threshold: f64) -> GateDecision {
    let confidence = to_percentage(score);
    if confidence >= threshold {
        GateDecision::Accepted { confidence }
    } else {
        GateDecision::Rejected {
            confidence,
            required: threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(to_percentage(1.0000001), 100.0);
        assert_eq!(to_percentage(-0.4), 0.0);
        assert_eq!(to_percentage(f64::NAN), 0.0);
        assert!((to_percentage(0.4567) - 45.67).abs() < 1e-9);
    }

    #[test]
    fn percentage_is_monotonic() {
        let scores = [-2.0, -0.5, 0.0, 0.1, 0.5, 0.69, 0.7, 0.99, 1.0, 1.5];
        for pair in scores.windows(2) {
            let lower = to_percentage(pair[0]);
            let upper = to_percentage(pair[1]);
            assert!(lower <= upper, "{} -> {lower} vs {} -> {upper}", pair[0], pair[1]);
            assert!((0.0..=100.0).contains(&lower));
        }
    }

    #[test]
    fn threshold_boundary_accepts() {
        assert!(evaluate(0.7, 70.0).is_accepted());
        let rejected = evaluate(0.69, 70.0);
        assert_eq!(
            rejected,
            GateDecision::Rejected {
                confidence: to_percentage(0.69),
                required: 70.0
            }
        );
    }

    #[test]
    fn threshold_is_caller_supplied() {
        assert!(evaluate(0.5, 40.0).is_accepted());
        assert!(!evaluate(0.5, 90.0).is_accepted());
        assert_eq!(evaluate(0.5, 90.0).confidence(), 50.0);
    }
}
