// Bounded chart series for voltage and amperage
use super::machine::CHANNELS;
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("voltage batch of {voltage} and amperage batch of {amperage} values select different ingestion modes")]
    MismatchedBatch { voltage: usize, amperage: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingestion {
    /// A full history: keep its trailing window.
    Replace,
    /// One live sample: append its mean.
    Append,
}

impl Ingestion {
    fn for_batch(len: usize) -> Option<Self> {
        match len {
            0 => None,
            1..=CHANNELS => Some(Ingestion::Append),
            _ => Some(Ingestion::Replace),
        }
    }
}

/// Snapshot of the chart contents, oldest point first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSnapshot {
    pub voltage: Vec<f64>,
    pub amperage: Vec<f64>,
    pub labels: Vec<String>,
}

/// Voltage and amperage series sharing one label timeline.
///
/// The two series and the labels always have the same length; a missing label is
/// stored as an empty string.
#[derive(Debug, Clone)]
pub struct ChartSeriesBuffer {
    capacity: usize,
    voltage: VecDeque<f64>,
    amperage: VecDeque<f64>,
    labels: VecDeque<String>,
}

impl ChartSeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            voltage: VecDeque::with_capacity(capacity + 1),
            amperage: VecDeque::with_capacity(capacity + 1),
            labels: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Ingest one batch per quantity. Batches of more than six values replace the
    /// series with their most recent points; one to six values are averaged into a
    /// single appended point, labelled with the last supplied label.
    pub fn ingest(&mut self, volts: &[f64], amps: &[f64], labels: &[String]) -> Result<(), ChartError> {
        let mismatch = ChartError::MismatchedBatch {
            voltage: volts.len(),
            amperage: amps.len(),
        };

        match (Ingestion::for_batch(volts.len()), Ingestion::for_batch(amps.len())) {
            (None, None) => Ok(()),
            (Some(Ingestion::Replace), Some(Ingestion::Replace)) if volts.len() == amps.len() => {
                self.replace(volts, amps, labels);
                Ok(())
            }
            (Some(Ingestion::Append), Some(Ingestion::Append)) => {
                self.append(mean(volts), mean(amps), labels.last().cloned());
                Ok(())
            }
            _ => Err(mismatch),
        }
    }

    fn replace(&mut self, volts: &[f64], amps: &[f64], labels: &[String]) {
        let skip = volts.len().saturating_sub(self.capacity);
        self.voltage = volts[skip..].iter().copied().collect();
        self.amperage = amps[skip..].iter().copied().collect();

        let len = self.voltage.len();
        let supplied = &labels[labels.len().saturating_sub(len)..];
        self.labels = std::iter::repeat_n(String::new(), len - supplied.len())
            .chain(supplied.iter().cloned())
            .collect();
    }

    fn append(&mut self, volt: f64, amp: f64, label: Option<String>) {
        self.voltage.push_back(volt);
        self.amperage.push_back(amp);
        self.labels.push_back(label.unwrap_or_default());

        while self.voltage.len() > self.capacity {
            self.voltage.pop_front();
            self.amperage.pop_front();
            self.labels.pop_front();
        }
    }

    pub fn reset(&mut self) {
        self.voltage.clear();
        self.amperage.clear();
        self.labels.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        ChartSnapshot {
            voltage: self.voltage.iter().copied().collect(),
            amperage: self.amperage.iter().copied().collect(),
            labels: self.labels.iter().cloned().collect(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{i}")).collect()
    }

    fn assert_synchronized(chart: &ChartSeriesBuffer) {
        let snap = chart.snapshot();
        assert_eq!(snap.voltage.len(), snap.amperage.len());
        assert_eq!(snap.voltage.len(), snap.labels.len());
    }

    #[test]
    fn test_large_batch_replaces_with_trailing_window() {
        let mut chart = ChartSeriesBuffer::new(5);
        chart.ingest(&[1.0], &[1.0], &labels(1)).unwrap();

        let volts: Vec<f64> = (0..8).map(f64::from).collect();
        let amps: Vec<f64> = (10..18).map(f64::from).collect();
        chart.ingest(&volts, &amps, &labels(8)).unwrap();

        let snap = chart.snapshot();
        assert_eq!(snap.voltage, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(snap.amperage, vec![13.0, 14.0, 15.0, 16.0, 17.0]);
        assert_eq!(snap.labels, vec!["t3", "t4", "t5", "t6", "t7"]);
    }

    #[test]
    fn test_replace_shorter_than_capacity_keeps_everything() {
        let mut chart = ChartSeriesBuffer::new(20);
        let volts = vec![12.0; 7];
        chart.ingest(&volts, &volts, &[]).unwrap();

        assert_eq!(chart.len(), 7);
        assert!(chart.snapshot().labels.iter().all(String::is_empty));
    }

    #[test]
    fn test_replace_pads_missing_labels_on_the_left() {
        let mut chart = ChartSeriesBuffer::new(20);
        let volts = vec![12.0; 8];
        chart.ingest(&volts, &volts, &labels(3)).unwrap();

        let snap = chart.snapshot();
        assert_eq!(snap.labels.len(), 8);
        assert_eq!(&snap.labels[..5], &["", "", "", "", ""]);
        assert_eq!(&snap.labels[5..], &["t0", "t1", "t2"]);
    }

    #[test]
    fn test_single_value_appends_itself() {
        let mut chart = ChartSeriesBuffer::new(20);
        chart.ingest(&[12.34], &[5.01], &labels(1)).unwrap();

        let snap = chart.snapshot();
        assert_eq!(snap.voltage, vec![12.34]);
        assert_eq!(snap.amperage, vec![5.01]);
        assert_eq!(snap.labels, vec!["t0"]);
    }

    #[test]
    fn test_small_batch_appends_mean() {
        let mut chart = ChartSeriesBuffer::new(20);
        chart.ingest(&[11.0, 12.0, 13.0], &[4.0, 5.0, 6.0], &[]).unwrap();

        let snap = chart.snapshot();
        assert_eq!(snap.voltage, vec![12.0]);
        assert_eq!(snap.amperage, vec![5.0]);
        assert_eq!(snap.labels, vec![""]);
    }

    #[test]
    fn test_appends_past_capacity_drop_oldest() {
        let capacity = 20;
        let mut chart = ChartSeriesBuffer::new(capacity);
        for i in 0..=capacity {
            let v = i as f64;
            chart.ingest(&[v], &[v], &[format!("t{i}")]).unwrap();
            assert_synchronized(&chart);
        }

        let snap = chart.snapshot();
        assert_eq!(snap.voltage.len(), capacity);
        assert_eq!(snap.voltage[0], 1.0);
        assert_eq!(snap.labels[0], "t1");
        assert_eq!(snap.labels[capacity - 1], format!("t{capacity}"));
    }

    #[test]
    fn test_mismatched_modes_rejected_without_change() {
        let mut chart = ChartSeriesBuffer::new(20);
        chart.ingest(&[1.0], &[1.0], &[]).unwrap();

        let err = chart.ingest(&[1.0; 7], &[1.0; 3], &[]).unwrap_err();
        assert_eq!(
            err,
            ChartError::MismatchedBatch {
                voltage: 7,
                amperage: 3
            }
        );
        assert!(chart.ingest(&[1.0; 7], &[1.0; 8], &[]).is_err());
        assert!(chart.ingest(&[1.0], &[], &[]).is_err());
        assert_eq!(chart.len(), 1);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut chart = ChartSeriesBuffer::new(20);
        chart.ingest(&[], &[], &labels(1)).unwrap();
        assert!(chart.is_empty());
    }

    #[test]
    fn test_reset_clears_all_series() {
        let mut chart = ChartSeriesBuffer::new(20);
        chart.ingest(&[1.0], &[1.0], &labels(1)).unwrap();
        chart.reset();

        assert!(chart.is_empty());
        assert!(chart.snapshot().labels.is_empty());
    }
}
