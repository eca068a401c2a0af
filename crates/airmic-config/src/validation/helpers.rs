//! Checks shared by the section validators. Each pushes a message instead
//! of returning, so one pass reports every problem.

use std::fmt::Display;

/// `value` must lie in `[min, max]`. NaN lies in no range.
pub(crate) fn check_range<T: PartialOrd + Display>(
    errors: &mut Vec<String>,
    name: &str,
    value: T,
    min: T,
    max: T,
) {
    let in_range = value >= min && value <= max;
    if !in_range {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

pub(crate) fn check_non_empty(errors: &mut Vec<String>, name: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(format!("{name} must not be empty"));
    }
}
