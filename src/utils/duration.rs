//! Parsing of campaign round schedules such as `168h` or `1h30m`.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("empty schedule")]
    Empty,
    #[error("missing number before unit '{0}'")]
    MissingNumber(char),
    #[error("missing unit after {0}")]
    MissingUnit(u64),
    #[error("unknown unit '{0}'")]
    UnknownUnit(char),
    #[error("schedule overflows")]
    Overflow,
    #[error("schedule must be longer than zero seconds")]
    Zero,
}

/// Parse a schedule made of `<number><unit>` groups, units being `s`, `m`, `h` or `d`.
pub fn parse_schedule(input: &str) -> Result<Duration, ScheduleError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ScheduleError::Empty);
    }

    let mut total: u64 = 0;
    let mut number: Option<u64> = None;

    for c in input.chars() {
        if let Some(digit) = c.to_digit(10) {
            let current = number.unwrap_or(0);
            number = Some(
                current
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(digit as u64))
                    .ok_or(ScheduleError::Overflow)?,
            );
            continue;
        }

        let unit_secs = match c {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            other => return Err(ScheduleError::UnknownUnit(other)),
        };
        let value = number.take().ok_or(ScheduleError::MissingNumber(c))?;
        total = value
            .checked_mul(unit_secs)
            .and_then(|secs| total.checked_add(secs))
            .ok_or(ScheduleError::Overflow)?;
    }

    if let Some(dangling) = number {
        return Err(ScheduleError::MissingUnit(dangling));
    }
    if total == 0 {
        return Err(ScheduleError::Zero);
    }

    Ok(Duration::from_secs(total))
}
