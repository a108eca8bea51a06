use std::fmt::Display;
use std::ops::RangeInclusive;

/// Record `name` if `value` falls outside `range`.
pub(crate) fn check_range<T>(errors: &mut Vec<String>, name: &str, value: T, range: RangeInclusive<T>)
where
    T: PartialOrd + Display,
{
    if !range.contains(&value) {
        errors.push(format!(
            "{name} = {value} is out of range [{}, {}]",
            range.start(),
            range.end()
        ));
    }
}

/// Smoothing coefficients live in (0, 1]; zero freezes the estimate.
pub(crate) fn check_coefficient(errors: &mut Vec<String>, name: &str, value: f64) {
    if value <= 0.0 || value > 1.0 {
        errors.push(format!("{name} = {value} is out of range (0, 1]"));
    }
}
