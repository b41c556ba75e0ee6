//! Snapshot freshness - should an incoming snapshot be applied?

/// How an incoming snapshot version is compared with the last applied one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FreshnessPolicy {
    /// Apply any version that differs from the last applied one.
    ///
    /// Under reordering an older snapshot arriving after a newer one is
    /// applied and the follower jumps backwards until the next broadcast.
    #[default]
    Changed,
    /// Apply only versions ahead of the last applied one, using serial
    /// number arithmetic so the counter may wrap.
    Newer,
}

/// Half the version space; a wrapping distance below this counts as "ahead"
const SERIAL_HALF: u32 = 1 << 31;

impl FreshnessPolicy {
    /// Whether `incoming` should be applied after `last_applied`
    pub fn accepts(self, last_applied: Option<u32>, incoming: u32) -> bool {
        let Some(last) = last_applied else {
            return true;
        };

        match self {
            FreshnessPolicy::Changed => incoming != last,
            FreshnessPolicy::Newer => {
                let ahead = incoming.wrapping_sub(last);
                ahead != 0 && ahead < SERIAL_HALF
            }
        }
    }
}
