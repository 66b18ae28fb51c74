//! Wall-clock helpers: the operator time-set format and health readout.
//!
//! Accepted input is `DD/MM/YYYY HH:MM` or `DD/MM/YYYY HH:MM:SS`.  Day,
//! month and time fields need not be zero-padded; the year is always four
//! digits.  Anything else (extra fields, trailing text,
//! impossible dates) is rejected and the clock is left untouched.

use chrono::{NaiveDate, NaiveDateTime};

use crate::app::ports::ClockPort;
use crate::error::Error;
use crate::telemetry::TIMESTAMP_FORMAT;

const BAD_FORMAT: Error = Error::InvalidArgument("expected DD/MM/YYYY HH:MM[:SS]");

fn field(s: &str, max_digits: usize) -> Result<u32, Error> {
    if s.is_empty() || s.len() > max_digits || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BAD_FORMAT);
    }
    s.parse().map_err(|_| BAD_FORMAT)
}

/// Parse an operator-supplied timestamp.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, Error> {
    let (date, time) = input.trim().split_once(' ').ok_or(BAD_FORMAT)?;

    let mut d = date.split('/');
    let (Some(day), Some(month), Some(year), None) = (d.next(), d.next(), d.next(), d.next())
    else {
        return Err(BAD_FORMAT);
    };

    let t: heapless::Vec<&str, 4> = time.split(':').take(4).collect();
    let (hour, minute, second) = match t.as_slice() {
        [h, m] => (field(h, 2)?, field(m, 2)?, 0),
        [h, m, s] => (field(h, 2)?, field(m, 2)?, field(s, 2)?),
        _ => return Err(BAD_FORMAT),
    };

    if year.len() != 4 {
        return Err(BAD_FORMAT);
    }
    let year = i32::try_from(field(year, 4)?).map_err(|_| BAD_FORMAT)?;
    let (month, day) = (field(month, 2)?, field(day, 2)?);
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or(Error::InvalidArgument("no such date or time"))
}

/// Parse `input` and, only if valid, set the clock.
pub fn set_time(clock: &mut impl ClockPort, input: &str) -> Result<NaiveDateTime, Error> {
    let at = parse_timestamp(input)?;
    clock.adjust(at)?;
    log::info!("Clock: set to {}", at.format(TIMESTAMP_FORMAT));
    Ok(at)
}
