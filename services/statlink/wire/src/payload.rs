//! Payload primitives shared by requests and responses.
//!
//! Text is a `u32` byte count followed by UTF-16BE code units; a count of
//! `0xFFFF_FFFF` marks a null string and decodes as empty. Timestamps are a
//! Julian day number, milliseconds since midnight and a time-spec tag, the
//! layout a QDataStream peer produces for a date-time value.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};

use crate::error::{need, WireError};

/// Length prefix marking a null string
pub const NULL_TEXT: u32 = u32::MAX;

/// Julian day number of 0000-12-31 in the proleptic Gregorian calendar
const JULIAN_DAY_OFFSET: i64 = 1_721_425;

/// Encoded size of `text`, including the length prefix
pub fn encoded_text_len(text: &str) -> usize {
    4 + text.encode_utf16().count() * 2
}

/// Append `text` as a length-prefixed UTF-16BE string
///
/// Fails with [`WireError::Size`] when the byte count does not fit the
/// `u32` prefix.
pub fn put_text(buf: &mut BytesMut, text: &str) -> Result<(), WireError> {
    let units = text.encode_utf16().count();
    let len = text_byte_len(units)?;
    buf.reserve(4 + units * 2);
    buf.put_u32(len);
    for unit in text.encode_utf16() {
        buf.put_u16(unit);
    }
    Ok(())
}

/// Length prefix for `units` UTF-16 code units
fn text_byte_len(units: usize) -> Result<u32, WireError> {
    units
        .checked_mul(2)
        .and_then(|len| u32::try_from(len).ok())
        .ok_or(WireError::Size(units.saturating_mul(2)))
}

/// Read a length-prefixed UTF-16BE string from the front of `buf`
pub fn get_text(buf: &mut &[u8]) -> Result<String, WireError> {
    need(buf, 4)?;
    let len = buf.get_u32();
    if len == NULL_TEXT {
        return Ok(String::new());
    }

    let len = len as usize;
    if len % 2 != 0 {
        return Err(WireError::Malformed("odd text length"));
    }
    need(buf, len)?;

    let units: Vec<u16> = (0..len / 2).map(|_| buf.get_u16()).collect();
    String::from_utf16(&units).map_err(|_| WireError::Malformed("invalid utf-16"))
}

/// How the server's timestamp relates to UTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSpec {
    /// Server local time, zone unknown to the client
    Local,
    /// UTC
    Utc,
    /// Fixed offset from UTC in seconds
    Offset(i32),
    /// Named time zone
    Zone(String),
}

impl TimeSpec {
    fn tag(&self) -> u8 {
        match self {
            TimeSpec::Local => 0,
            TimeSpec::Utc => 1,
            TimeSpec::Offset(_) => 2,
            TimeSpec::Zone(_) => 3,
        }
    }
}

/// Timestamp returned for a time request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTime {
    /// Wall-clock date and time as sent
    pub datetime: NaiveDateTime,
    /// Interpretation of `datetime`
    pub spec: TimeSpec,
}

impl ServerTime {
    /// A UTC timestamp
    pub fn from_utc(time: DateTime<Utc>) -> Self {
        Self {
            datetime: time.naive_utc(),
            spec: TimeSpec::Utc,
        }
    }

    /// Resolve to UTC when the spec allows it
    ///
    /// Named zones cannot be resolved without a zone database and yield `None`.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match &self.spec {
            TimeSpec::Utc => Some(Utc.from_utc_datetime(&self.datetime)),
            TimeSpec::Offset(secs) => FixedOffset::east_opt(*secs)?
                .from_local_datetime(&self.datetime)
                .single()
                .map(|t| t.with_timezone(&Utc)),
            TimeSpec::Local => Local
                .from_local_datetime(&self.datetime)
                .single()
                .map(|t| t.with_timezone(&Utc)),
            TimeSpec::Zone(_) => None,
        }
    }

    /// Encode the timestamp
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        let julian_day = self.datetime.date().num_days_from_ce() as i64 + JULIAN_DAY_OFFSET;
        let time = self.datetime.time();
        let millis = time.nanosecond().min(999_999_999) / 1_000_000;

        buf.put_i64(julian_day);
        buf.put_u32(time.num_seconds_from_midnight() * 1000 + millis);
        buf.put_u8(self.spec.tag());
        match &self.spec {
            TimeSpec::Offset(secs) => buf.put_i32(*secs),
            TimeSpec::Zone(id) => put_text(buf, id)?,
            TimeSpec::Local | TimeSpec::Utc => {}
        }
        Ok(())
    }

    /// Decode a timestamp from the front of `buf`
    pub fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        need(buf, 13)?;
        let julian_day = buf.get_i64();
        let millis = buf.get_u32();
        let tag = buf.get_u8();

        let days = julian_day
            .checked_sub(JULIAN_DAY_OFFSET)
            .and_then(|d| i32::try_from(d).ok())
            .ok_or(WireError::Malformed("date out of range"))?;
        let date = NaiveDate::from_num_days_from_ce_opt(days)
            .ok_or(WireError::Malformed("date out of range"))?;
        let time =
            NaiveTime::from_num_seconds_from_midnight_opt(millis / 1000, (millis % 1000) * 1_000_000)
                .ok_or(WireError::Malformed("invalid time of day"))?;

        let spec = match tag {
            0 => TimeSpec::Local,
            1 => TimeSpec::Utc,
            2 => {
                need(buf, 4)?;
                TimeSpec::Offset(buf.get_i32())
            }
            3 => TimeSpec::Zone(get_text(buf)?),
            _ => return Err(WireError::Malformed("unknown time spec")),
        };

        Ok(Self {
            datetime: NaiveDateTime::new(date, time),
            spec,
        })
    }
}

impl fmt::Display for ServerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.datetime.format("%Y-%m-%d %H:%M:%S%.3f"))?;
        match &self.spec {
            TimeSpec::Local => write!(f, " (server local)"),
            TimeSpec::Utc => write!(f, " UTC"),
            TimeSpec::Offset(secs) => {
                let sign = if *secs < 0 { '-' } else { '+' };
                let abs = secs.unsigned_abs();
                write!(f, " {}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
            }
            TimeSpec::Zone(id) => write!(f, " {}", id),
        }
    }
}
