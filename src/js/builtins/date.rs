//! js::builtins::date
//!
//! `Date`, read against the interpreter's virtual clock. The sandbox has no
//! host time zone: local time is UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use super::{arg, define_constructor};
use crate::js::error::JsResult;
use crate::js::interp::Interpreter;
use crate::js::value::{date_to_iso, native_fn, sync_fn, NativeFn, Obj, ObjectKind, Value};

const MS_PER_DAY: f64 = 86_400_000.0;
/// Largest representable time value (±100,000,000 days)
const MAX_TIME: f64 = 8.64e15;

pub fn install(interp: &Interpreter) {
    let proto = interp.realm().date_proto.clone();
    let ctor = define_constructor(
        interp,
        "Date",
        native_fn(|interp, this, args| Box::pin(construct(interp, this, args))),
        &proto,
    );
    interp.define_method(
        &ctor,
        "now",
        sync_fn(|interp, _, _| Ok(Value::Number(interp.now_ms().floor()))),
    );
    interp.define_method(
        &ctor,
        "parse",
        sync_fn(|_, _, args| Ok(Value::Number(parse_date(&arg(&args, 0).to_display_string())))),
    );
    interp.define_method(
        &ctor,
        "UTC",
        sync_fn(|_, _, args| Ok(Value::Number(from_components(&args)))),
    );

    let getters: [(&str, fn(&DateTime<Utc>) -> f64); 8] = [
        ("FullYear", |d| f64::from(d.year())),
        ("Month", |d| f64::from(d.month0())),
        ("Date", |d| f64::from(d.day())),
        ("Day", |d| f64::from(d.weekday().num_days_from_sunday())),
        ("Hours", |d| f64::from(d.hour())),
        ("Minutes", |d| f64::from(d.minute())),
        ("Seconds", |d| f64::from(d.second())),
        ("Milliseconds", |d| f64::from(d.timestamp_subsec_millis())),
    ];
    for (suffix, getter) in getters {
        for prefix in ["get", "getUTC"] {
            let call = sync_fn(move |interp, this, _| {
                let ms = this_time(interp, &this)?;
                Ok(Value::Number(
                    DateTime::from_timestamp_millis(ms as i64)
                        .filter(|_| ms.is_finite())
                        .map_or(f64::NAN, |d| getter(&d)),
                ))
            });
            interp.define_method(&proto, &format!("{prefix}{suffix}"), call);
        }
    }

    let methods: [(&str, NativeFn); 8] = [
        ("getTime", sync_fn(|i, t, _| Ok(Value::Number(this_time(i, &t)?)))),
        ("valueOf", sync_fn(|i, t, _| Ok(Value::Number(this_time(i, &t)?)))),
        ("getTimezoneOffset", sync_fn(|i, t, _| this_time(i, &t).map(|_| Value::Number(0.0)))),
        (
            "toISOString",
            sync_fn(|i, t, _| {
                let ms = this_time(i, &t)?;
                date_to_iso(ms)
                    .map(Value::from)
                    .ok_or_else(|| i.range_error("Invalid time value"))
            }),
        ),
        (
            "toJSON",
            sync_fn(|i, t, _| Ok(date_to_iso(this_time(i, &t)?).map_or(Value::Null, Value::from))),
        ),
        ("toString", sync_fn(|i, t, _| Ok(Value::from(format_date(this_time(i, &t)?, FULL))))),
        ("toDateString", sync_fn(|i, t, _| Ok(Value::from(format_date(this_time(i, &t)?, "%a %b %d %Y"))))),
        (
            "setTime",
            sync_fn(|i, t, a| {
                this_time(i, &t)?;
                let ms = time_clip(arg(&a, 0).to_number());
                if let Some(obj) = t.as_object() {
                    obj.borrow_mut().kind = ObjectKind::Date(ms);
                }
                Ok(Value::Number(ms))
            }),
        ),
    ];
    for (name, call) in methods {
        interp.define_method(&proto, name, call);
    }
}

const FULL: &str = "%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)";

fn format_date(ms: f64, pattern: &str) -> String {
    if !ms.is_finite() {
        return "Invalid Date".to_string();
    }
    DateTime::from_timestamp_millis(ms as i64)
        .map_or_else(|| "Invalid Date".to_string(), |d| d.format(pattern).to_string())
}

fn this_time(interp: &Interpreter, this: &Value) -> JsResult<f64> {
    match this.as_object().map(|obj| match obj.borrow().kind {
        ObjectKind::Date(ms) => Some(ms),
        _ => None,
    }) {
        Some(Some(ms)) => Ok(ms),
        _ => Err(interp.type_error("this is not a Date object.")),
    }
}

async fn construct(interp: &Interpreter, this: Value, args: Vec<Value>) -> JsResult<Value> {
    let target = match &this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Ordinary) => obj.clone(),
        // `Date()` without `new` renders the current time
        _ => return Ok(Value::from(format_date(interp.now_ms().floor(), FULL))),
    };
    let ms = match args.as_slice() {
        [] => interp.now_ms().floor(),
        [Value::Object(obj)] if matches!(obj.borrow().kind, ObjectKind::Date(_)) => obj_time(obj),
        [Value::String(s)] => parse_date(s),
        [single] => time_clip(interp.to_number(single).await?),
        many => from_components(many),
    };
    target.borrow_mut().kind = ObjectKind::Date(ms);
    Ok(this)
}

fn obj_time(obj: &Obj) -> f64 {
    match obj.borrow().kind {
        ObjectKind::Date(ms) => ms,
        _ => f64::NAN,
    }
}

fn time_clip(ms: f64) -> f64 {
    if !ms.is_finite() || ms.abs() > MAX_TIME {
        return f64::NAN;
    }
    ms.trunc()
}

/// Days from 1970-01-01 to the given proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// `Date.UTC(year, month, day, hours, minutes, seconds, ms)`; months
/// overflow into years as in script code.
fn from_components(args: &[Value]) -> f64 {
    let part = |i: usize, default: f64| args.get(i).map_or(default, Value::to_number);
    let fields = [
        part(0, f64::NAN),
        part(1, 0.0),
        part(2, 1.0),
        part(3, 0.0),
        part(4, 0.0),
        part(5, 0.0),
        part(6, 0.0),
    ];
    if fields.iter().any(|f| !f.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hours, minutes, seconds, millis] = fields.map(f64::trunc);
    let year = if (0.0..=99.0).contains(&year) { 1900.0 + year } else { year };
    let year = year as i64 + month.div_euclid(12.0) as i64;
    let month = month.rem_euclid(12.0) as i64;
    let days = days_from_civil(year, month + 1, 1) as f64 + day - 1.0;
    time_clip(days * MS_PER_DAY + hours * 3_600_000.0 + minutes * 60_000.0 + seconds * 1000.0 + millis)
}

/// Parse the date formats script code commonly produces.
pub fn parse_date(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return dt.timestamp_millis() as f64;
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return naive.and_utc().timestamp_millis() as f64;
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map_or(f64::NAN, |d| d.and_utc().timestamp_millis() as f64);
    }
    f64::NAN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::interp::test_support::eval_string;

    #[test]
    fn civil_days() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
        assert_eq!(days_from_civil(1969, 12, 31), -1);
    }

    #[test]
    fn parsing() {
        assert_eq!(parse_date("1970-01-02"), MS_PER_DAY);
        assert_eq!(parse_date("1970-01-01T00:00:01.500Z"), 1500.0);
        assert_eq!(parse_date("1970-01-01T00:01:00"), 60_000.0);
        assert!(parse_date("not a date").is_nan());
    }

    #[test]
    fn components_overflow_months() {
        let args = [Value::from(2023.0), Value::from(12.0), Value::from(1.0)];
        assert_eq!(from_components(&args), parse_date("2024-01-01"));
    }

    #[tokio::test]
    async fn iso_rendering_and_getters() {
        assert_eq!(
            eval_string("const d = new Date(Date.UTC(2024, 1, 29, 13, 5, 9, 7))\nreturn [d.toISOString(), d.getFullYear(), d.getMonth(), d.getDate(), d.getDay(), d.getUTCHours()].join('|')").await,
            "2024-02-29T13:05:09.007Z|2024|1|29|4|13"
        );
    }

    #[tokio::test]
    async fn clock_starts_at_configured_time() {
        assert_eq!(eval_string("return new Date().toISOString()").await, "1970-01-01T00:00:00.000Z");
        assert_eq!(eval_string("return Date.now()").await, "0");
    }

    #[tokio::test]
    async fn arithmetic_and_invalid_dates() {
        assert_eq!(
            eval_string("const a = new Date(1000)\nconst b = new Date(a)\nreturn [b - a, new Date('nope').getTime(), String(new Date(0)).slice(0, 15)].join('|')").await,
            "0|NaN|Thu Jan 01 1970"
        );
        assert!(eval_string("return new Date('nope').toISOString()")
            .await
            .starts_with("threw RangeError: Invalid time value"));
    }
}
