/// `round(target * num / den)` in integer arithmetic, never below 1.
pub(crate) fn scale_round(target: u32, num: u32, den: u32) -> u32 {
    if den == 0 {
        return 1;
    }
    let n = u64::from(target) * u64::from(num);
    let d = u64::from(den);
    (((n + d / 2) / d) as u32).max(1)
}

/// `floor(i * span / (count - 1))`, the linear ramp from `0` to `span` over `count` steps.
pub(crate) fn linear_ramp_floor(i: u64, count: u64, span: u64) -> u64 {
    if count <= 1 || span == 0 {
        return 0;
    }
    let i = i.min(count - 1);
    ((u128::from(i) * u128::from(span)) / u128::from(count - 1)) as u64
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
