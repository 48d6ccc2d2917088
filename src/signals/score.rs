use crate::core::BehaviorTag;

/// Risk assigned to tags that are not in the table.
pub const NEUTRAL_RISK: u8 = 50;

/// Static base risk for a tag name.
pub fn base_risk(tag: &str) -> u8 {
    match tag.parse::<BehaviorTag>() {
        Ok(tag) => tag_risk(tag),
        Err(_) => NEUTRAL_RISK,
    }
}

pub fn tag_risk(tag: BehaviorTag) -> u8 {
    match tag {
        BehaviorTag::GodModeMm => 5,
        BehaviorTag::SafeDevEntry => 20,
        BehaviorTag::HighFrequencyAccumulation => 60,
        BehaviorTag::BotHftActivity => 70,
        BehaviorTag::InstantBundleLaunch => 90,
        BehaviorTag::PumpDumpScum => 98,
    }
}

/// Merge a stored threat level with a fresh risk score: plain mean, no rounding.
pub fn smooth_threat(stored: f64, incoming: f64) -> f64 {
    (stored + incoming) / 2.0
}

pub fn trust_score(threat: f64) -> f64 {
    (100.0 - threat).clamp(0.0, 100.0)
}
