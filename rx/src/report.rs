//! JSON detection report

use nr_phy::{SearchOutcome, SsbGrid};
use serde::Serialize;

/// Outcome of one `detect` run
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub found: bool,
    pub scs_khz: u32,
    pub input_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssb: Option<SsbReport>,
}

/// The detected SSB
#[derive(Debug, Clone, Serialize)]
pub struct SsbReport {
    pub nid2: u8,
    /// SSB start at the correlator rate
    pub symbol_start: usize,
    /// SSB start in the input stream, delay of the decimator removed
    pub input_sample_index: Option<usize>,
    pub peak_index: usize,
    pub peak_magnitude_sq: f32,
    /// Per symbol, 240 [re, im] pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<Vec<Vec<[f32; 2]>>>,
}

impl SsbReport {
    pub fn new(grid: &SsbGrid, input_sample_index: Option<usize>, include_grid: bool) -> Self {
        let detection = grid.detection();
        let resource_elements = include_grid.then(|| {
            grid.grid()
                .columns()
                .into_iter()
                .map(|symbol| symbol.iter().map(|re| [re.re, re.im]).collect())
                .collect()
        });

        Self {
            nid2: detection.nid2.value(),
            symbol_start: detection.symbol_start,
            input_sample_index,
            peak_index: detection.peak.index,
            peak_magnitude_sq: detection.peak.magnitude_sq,
            grid: resource_elements,
        }
    }
}

impl DetectionReport {
    pub fn new(
        outcome: &SearchOutcome,
        scs_khz: u32,
        input_samples: usize,
        input_index: impl Fn(usize) -> Option<usize>,
        include_grid: bool,
    ) -> Self {
        let ssb = outcome
            .grid()
            .map(|grid| SsbReport::new(grid, input_index(grid.symbol_start()), include_grid));

        Self {
            found: ssb.is_some(),
            scs_khz,
            input_samples,
            ssb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::Nid2;
    use nr_phy::synth::SsbSynthesizer;
    use nr_phy::{SsbDetectorConfig, SsbReceiver};

    #[test]
    fn test_not_found_report() {
        let report = DetectionReport::new(&SearchOutcome::NotFound, 30, 100, Some, false);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["found"], false);
        assert!(json.get("ssb").is_none());
    }

    #[test]
    fn test_found_report() {
        let waveform = SsbSynthesizer::new(Nid2::new(1).unwrap())
            .leading(50)
            .trailing(20)
            .build()
            .unwrap();
        let outcome = SsbReceiver::search(SsbDetectorConfig::default(), &waveform.samples).unwrap();

        let report = DetectionReport::new(&outcome, 30, waveform.samples.len(), Some, true);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["found"], true);
        assert_eq!(json["ssb"]["nid2"], 1);
        assert_eq!(json["ssb"]["symbol_start"], 50);
        assert_eq!(json["ssb"]["input_sample_index"], 50);
        assert_eq!(json["ssb"]["peak_index"], 323);

        let grid = json["ssb"]["grid"].as_array().unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0].as_array().unwrap().len(), 240);
    }
}
