//! Held-out evaluation metrics
//!
//! Accuracy plus per-class precision/recall, reported at training time as
//! a diagnostic. Nothing here gates the pipeline.

/// Per-class precision/recall with support counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassMetrics {
    pub class: u8,
    pub precision: f64,
    pub recall: f64,
    pub support: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
}

/// Accuracy and per-class precision/recall over paired label slices.
/// Classes are the union observed in either slice, ascending. Empty inputs
/// yield an empty report with accuracy 0.
pub fn classification_report(truth: &[u8], predicted: &[u8]) -> ClassificationReport {
    let n = truth.len().min(predicted.len());
    if n == 0 {
        return ClassificationReport {
            accuracy: 0.0,
            per_class: Vec::new(),
        };
    }

    let correct = truth
        .iter()
        .zip(predicted)
        .take(n)
        .filter(|(t, p)| t == p)
        .count();

    let mut classes: Vec<u8> = truth[..n].iter().chain(&predicted[..n]).copied().collect();
    classes.sort_unstable();
    classes.dedup();

    let per_class = classes
        .into_iter()
        .map(|class| {
            let tp = count(truth, predicted, |t, p| t == class && p == class);
            let fp = count(truth, predicted, |t, p| t != class && p == class);
            let fn_ = count(truth, predicted, |t, p| t == class && p != class);
            ClassMetrics {
                class,
                precision: ratio(tp, tp + fp),
                recall: ratio(tp, tp + fn_),
                support: tp + fn_,
            }
        })
        .collect();

    ClassificationReport {
        accuracy: correct as f64 / n as f64,
        per_class,
    }
}

impl ClassificationReport {
    /// Emit the report through tracing, one line per class.
    pub fn log(&self) {
        tracing::info!("held-out accuracy: {:.3}", self.accuracy);
        for m in &self.per_class {
            tracing::info!(
                "class {}: precision {:.3}, recall {:.3}, support {}",
                m.class,
                m.precision,
                m.recall,
                m.support
            );
        }
    }
}

fn count(truth: &[u8], predicted: &[u8], pred: impl Fn(u8, u8) -> bool) -> usize {
    truth
        .iter()
        .zip(predicted)
        .filter(|(&t, &p)| pred(t, p))
        .count()
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}
