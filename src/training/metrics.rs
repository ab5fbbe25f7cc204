//! Evaluation metrics for binary outcome predictions

use std::fmt;

use crate::RADIANT_WIN;

/// Metrics accumulated over a set of predictions
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Sum of per-row binary cross-entropy
    pub log_loss_sum: f64,
    /// Sum of squared probability errors
    pub brier_sum: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics of class-1 probabilities against labels
    pub fn evaluate(probabilities: &[[f32; 2]], labels: &[u8]) -> Self {
        let mut metrics = Self::new();
        for (p, y) in probabilities.iter().zip(labels) {
            metrics.update(p[1], *y);
        }
        metrics
    }

    /// Add one prediction
    pub fn update(&mut self, radiant_prob: f32, label: u8) {
        let p = (radiant_prob as f64).clamp(1e-7, 1.0 - 1e-7);
        let y = if label == RADIANT_WIN { 1.0 } else { 0.0 };
        self.log_loss_sum += -(y * p.ln() + (1.0 - y) * (1.0 - p).ln());
        self.brier_sum += (radiant_prob as f64 - y).powi(2);

        match (radiant_prob > 0.5, label == RADIANT_WIN) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.true_positives + self.true_negatives) as f64 / self.total() as f64
        }
    }

    pub fn log_loss(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.log_loss_sum / self.total() as f64
        }
    }

    pub fn brier(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.brier_sum / self.total() as f64
        }
    }

    /// Merge another metrics instance
    pub fn merge(&mut self, other: &Metrics) {
        self.log_loss_sum += other.log_loss_sum;
        self.brier_sum += other.brier_sum;
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.true_negatives += other.true_negatives;
        self.false_negatives += other.false_negatives;
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Acc: {:.2}% | Log loss: {:.4} | Brier: {:.4} | TP {} FP {} TN {} FN {} (n={})",
            self.accuracy() * 100.0,
            self.log_loss(),
            self.brier(),
            self.true_positives,
            self.false_positives,
            self.true_negatives,
            self.false_negatives,
            self.total()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_and_accuracy() {
        let probs = [[0.2, 0.8], [0.6, 0.4], [0.3, 0.7], [0.9, 0.1]];
        let labels = [1, 1, 0, 0];
        let m = Metrics::evaluate(&probs, &labels);

        assert_eq!(m.true_positives, 1);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.true_negatives, 1);
        assert!((m.accuracy() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_brier_and_log_loss() {
        let m = Metrics::evaluate(&[[0.5, 0.5], [0.5, 0.5]], &[1, 0]);
        assert!((m.brier() - 0.25).abs() < 1e-9);
        assert!((m.log_loss() - std::f64::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn test_empty_metrics() {
        let m = Metrics::new();
        assert_eq!(m.accuracy(), 0.0);
        assert_eq!(m.log_loss(), 0.0);
        assert!(m.to_string().contains("n=0"));
    }

    #[test]
    fn test_merge() {
        let mut a = Metrics::evaluate(&[[0.1, 0.9]], &[1]);
        let b = Metrics::evaluate(&[[0.9, 0.1]], &[1]);
        a.merge(&b);
        assert_eq!(a.total(), 2);
        assert_eq!(a.false_negatives, 1);
    }
}
