/// A running aggregate of a stream of measurements: count, mean, and the maximum with the
/// identifier that produced it. Only read for end-of-run reporting, never for control flow.
#[derive(Clone, Debug)]
pub struct ErrorStats {
    label: String,
    count: usize,
    sum: f64,
    max: f64,
    max_id: Option<String>,
}

impl ErrorStats {
    pub fn new(label: &str) -> ErrorStats {
        ErrorStats {
            label: label.to_string(),
            count: 0,
            sum: 0.0,
            max: 0.0,
            max_id: None,
        }
    }

    pub fn add(&mut self, value: f64, id: String) {
        self.count += 1;
        self.sum += value;
        if self.count == 1 || value > self.max {
            self.max = value;
            self.max_id = Some(id);
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn max_id(&self) -> Option<&str> {
        self.max_id.as_deref()
    }

    pub fn describe(&self) -> String {
        if self.count == 0 {
            return format!("{}: no entries", self.label);
        }
        format!(
            "{}: count {} avg {:.2} max {:.2} ({})",
            self.label,
            self.count,
            self.mean(),
            self.max,
            self.max_id.as_deref().unwrap_or("?")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_aggregate() {
        let mut stats = ErrorStats::new("deviations");
        assert_eq!(stats.describe(), "deviations: no entries");

        stats.add(10.0, "a".to_string());
        stats.add(30.0, "b".to_string());
        stats.add(20.0, "c".to_string());
        assert_eq!(stats.count(), 3);
        assert_eq!(stats.mean(), 20.0);
        assert_eq!(stats.max(), 30.0);
        assert_eq!(stats.max_id(), Some("b"));
    }

    #[test]
    fn negative_first_entry_still_tracked() {
        let mut stats = ErrorStats::new("x");
        stats.add(-5.0, "a".to_string());
        assert_eq!(stats.max(), -5.0);
        assert_eq!(stats.max_id(), Some("a"));
    }
}
