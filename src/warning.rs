/// Share of the planned time, in percent, at which the warning switches on.
pub const WARNING_THRESHOLD_PERCENT: u64 = 80;

/// Whether the presenter is approaching the slide's budget.
///
/// True for `elapsed` in `[80% of planned, planned)`. A slide without a budget
/// never warns, and neither does one that is already over time.
pub fn evaluate(elapsed_seconds: u64, planned_seconds: u64) -> bool {
    if planned_seconds == 0 || elapsed_seconds >= planned_seconds {
        return false;
    }
    // integer form of elapsed >= 0.8 * planned
    u128::from(elapsed_seconds) * 100 >= u128::from(planned_seconds) * u128::from(WARNING_THRESHOLD_PERCENT)
}
