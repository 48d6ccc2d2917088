pub mod rules;
pub mod score;

use chrono::{DateTime, Utc};

use crate::core::MarketEvent;
use rules::{LogProfile, Rule};

/// Stateless fingerprint classifier: one scan of the log set, then the
/// first matching rule decides the tag.
pub struct FingerprintClassifier {
    rules: Vec<Box<dyn Rule + Send + Sync>>,
}

impl Default for FingerprintClassifier {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FingerprintClassifier {
    pub fn new(trade_threshold: usize) -> Self {
        Self {
            rules: rules::default_rules(trade_threshold),
        }
    }

    pub fn classify(&self, log_lines: &[String], signature: &str) -> Option<MarketEvent> {
        self.classify_at(log_lines, signature, Utc::now())
    }

    /// Same as [`classify`](Self::classify) with an explicit observation time.
    pub fn classify_at(
        &self,
        log_lines: &[String],
        signature: &str,
        observed_at: DateTime<Utc>,
    ) -> Option<MarketEvent> {
        let profile = LogProfile::scan(log_lines);
        let tag = self.rules.iter().find_map(|rule| rule.evaluate(&profile))?;
        Some(MarketEvent {
            signature: signature.to_string(),
            observed_at,
            event_type: tag,
            risk_level: score::tag_risk(tag),
            log_lines: log_lines.to_vec(),
            enrichment: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BehaviorTag;

    fn logs(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    fn trades(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Program log: Trade #{i}")).collect()
    }

    #[test]
    fn bundle_launch_detected() {
        let classifier = FingerprintClassifier::default();
        let event = classifier
            .classify(&logs(&["Program log: Instruction: InitializeMint2", "Program log: mintTo"]), "sig1")
            .unwrap();
        assert_eq!(event.event_type, BehaviorTag::InstantBundleLaunch);
        assert!((90..=95).contains(&event.risk_level));
        assert_eq!(event.signature, "sig1");
        assert_eq!(event.log_lines.len(), 2);
        assert!(event.enrichment.is_none());
    }

    #[test]
    fn bundle_launch_wins_over_everything_else() {
        let classifier = FingerprintClassifier::default();
        let mut lines = trades(50);
        lines.push("Program log: Instruction: SetAuthority".into());
        lines.push("Program log: Instruction: MintTo".into());
        lines.push("Program log: Instruction: InitializeMint".into());
        let event = classifier.classify(&lines, "sig").unwrap();
        assert_eq!(event.event_type, BehaviorTag::InstantBundleLaunch);
    }

    #[test]
    fn safe_dev_entry_beats_high_frequency() {
        let classifier = FingerprintClassifier::default();
        let mut lines = trades(20);
        lines.push("Program log: Instruction: SetAuthority".into());
        let event = classifier.classify(&lines, "sig").unwrap();
        assert_eq!(event.event_type, BehaviorTag::SafeDevEntry);
        assert_eq!(event.risk_level, 20);
    }

    #[test]
    fn high_frequency_above_threshold() {
        let classifier = FingerprintClassifier::new(12);
        let event = classifier.classify(&trades(13), "sig").unwrap();
        assert_eq!(event.event_type, BehaviorTag::HighFrequencyAccumulation);
        assert!((60..=70).contains(&event.risk_level));
    }

    #[test]
    fn below_threshold_is_no_event() {
        let classifier = FingerprintClassifier::new(12);
        for n in 0..=12 {
            assert!(classifier.classify(&trades(n), "sig").is_none(), "{n} trades");
        }
    }

    #[test]
    fn unrelated_logs_are_no_event() {
        let classifier = FingerprintClassifier::default();
        let lines = logs(&[
            "Program 6EF8rrecthR5DkZJbdz4P8hHKXY6yizQ2EtJhEqNpump invoke [1]",
            "Program log: Instruction: Buy",
            "Program 6EF8rrecthR5DkZJbdz4P8hHKXY6yizQ2EtJhEqNpump success",
        ]);
        assert!(classifier.classify(&lines, "sig").is_none());
        assert!(classifier.classify(&[], "sig").is_none());
    }

    #[test]
    fn observed_at_is_kept() {
        let classifier = FingerprintClassifier::default();
        let at = DateTime::parse_from_rfc3339("2026-02-03T10:00:00Z").unwrap().with_timezone(&Utc);
        let event = classifier.classify_at(&trades(11), "sig", at).unwrap();
        assert_eq!(event.observed_at, at);
    }
}
