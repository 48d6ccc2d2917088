use crate::core::BehaviorTag;

pub const MINT_AUTHORITY_MARKERS: [&str; 2] = ["mintTo", "MintTo"];
pub const MINT_INIT_MARKER: &str = "InitializeMint";
pub const AUTHORITY_TRANSFER_MARKER: &str = "SetAuthority";
pub const TRADE_MARKER: &str = "Trade";

/// Marker statistics for one transaction's log set, gathered in a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogProfile {
    pub has_mint_authority: bool,
    pub has_mint_init: bool,
    pub has_authority_transfer: bool,
    pub trade_count: usize,
}

impl LogProfile {
    pub fn scan<S: AsRef<str>>(log_lines: &[S]) -> Self {
        let mut profile = LogProfile::default();
        for line in log_lines {
            let line = line.as_ref();
            profile.has_mint_authority |= MINT_AUTHORITY_MARKERS.iter().any(|m| line.contains(m));
            profile.has_mint_init |= line.contains(MINT_INIT_MARKER);
            profile.has_authority_transfer |= line.contains(AUTHORITY_TRANSFER_MARKER);
            profile.trade_count += line.matches(TRADE_MARKER).count();
        }
        profile
    }
}

/// A fingerprint rule. Rules are evaluated in priority order and the
/// first match wins.
pub trait Rule {
    fn name(&self) -> &str;
    fn evaluate(&self, profile: &LogProfile) -> Option<BehaviorTag>;
}

/// The fixed rule set, highest priority first.
pub fn default_rules(trade_threshold: usize) -> Vec<Box<dyn Rule + Send + Sync>> {
    vec![
        Box::new(BundleLaunchRule),
        Box::new(SafeDevEntryRule),
        Box::new(HighFrequencyRule { trade_threshold }),
    ]
}

// --- Individual Rules ---

/// Mint authority plus mint initialization in one transaction:
/// a coordinated multi-wallet launch.
struct BundleLaunchRule;
impl Rule for BundleLaunchRule {
    fn name(&self) -> &str { "bundle_launch" }
    fn evaluate(&self, p: &LogProfile) -> Option<BehaviorTag> {
        (p.has_mint_authority && p.has_mint_init).then_some(BehaviorTag::InstantBundleLaunch)
    }
}

/// Developer handing off authority while trading.
struct SafeDevEntryRule;
impl Rule for SafeDevEntryRule {
    fn name(&self) -> &str { "safe_dev_entry" }
    fn evaluate(&self, p: &LogProfile) -> Option<BehaviorTag> {
        (p.has_authority_transfer && p.trade_count > 0).then_some(BehaviorTag::SafeDevEntry)
    }
}

struct HighFrequencyRule {
    trade_threshold: usize,
}
impl Rule for HighFrequencyRule {
    fn name(&self) -> &str { "high_frequency" }
    fn evaluate(&self, p: &LogProfile) -> Option<BehaviorTag> {
        (p.trade_count > self.trade_threshold).then_some(BehaviorTag::HighFrequencyAccumulation)
    }
}
