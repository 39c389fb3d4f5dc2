use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime};

use crate::constants::schedule as consts;
use crate::error::{KeeperError, Result};
use crate::models::{ScheduleDefinition, ScheduleKind};

/// 日历触发规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerRule {
    Once { at: NaiveDateTime },
    Daily { time: NaiveTime },
    /// `weekday`: 0 = 周日 … 6 = 周六
    Weekly { weekday: u8, time: NaiveTime },
    Monthly { day: u32, time: NaiveTime },
    Yearly { month: u32, day: u32, time: NaiveTime },
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), consts::TIME_FORMAT)
        .map_err(|_| KeeperError::validation(format!("时间格式应为 HH:MM: {value}")))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), consts::DATE_FORMAT)
        .map_err(|_| KeeperError::validation(format!("日期格式应为 YYYY-MM-DD: {value}")))
}

fn require<T>(value: Option<T>, field: &str, kind: ScheduleKind) -> Result<T> {
    value.ok_or_else(|| {
        KeeperError::validation(format!("{} 类型的计划缺少字段 {}", kind.as_str(), field))
    })
}

impl TriggerRule {
    /// 由计划定义构造触发规则，同时完成字段校验
    pub fn from_definition(definition: &ScheduleDefinition) -> Result<Self> {
        let kind = definition.kind;
        let time = parse_time(&definition.time)?;

        let rule = match kind {
            ScheduleKind::Once => {
                let date = parse_date(require(definition.date.as_deref(), "date", kind)?)?;
                TriggerRule::Once {
                    at: date.and_time(time),
                }
            }
            ScheduleKind::Daily => TriggerRule::Daily { time },
            ScheduleKind::Weekly => {
                let weekday = require(definition.day_of_week, "day_of_week", kind)?;
                if weekday > 6 {
                    return Err(KeeperError::validation(format!(
                        "day_of_week 应在 0-6 之间（0 为周日）: {weekday}"
                    )));
                }
                TriggerRule::Weekly { weekday, time }
            }
            ScheduleKind::Monthly => {
                let day = require(definition.day, "day", kind)?;
                if !(1..=31).contains(&day) {
                    return Err(KeeperError::validation(format!("day 应在 1-31 之间: {day}")));
                }
                TriggerRule::Monthly { day, time }
            }
            ScheduleKind::Yearly => {
                let month = require(definition.month, "month", kind)?;
                let day = require(definition.day, "day", kind)?;
                // 2000 年是闰年，用来判断月日组合是否可能存在
                if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
                    return Err(KeeperError::validation(format!(
                        "不存在的日期: {month} 月 {day} 日"
                    )));
                }
                TriggerRule::Yearly { month, day, time }
            }
        };
        Ok(rule)
    }

    /// 严格晚于 `now` 的下一次触发时间，没有则返回 None
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = now.date();
        match *self {
            TriggerRule::Once { at } => (at > now).then_some(at),
            TriggerRule::Daily { time } => {
                let candidate = today.and_time(time);
                if candidate > now {
                    Some(candidate)
                } else {
                    today.checked_add_days(Days::new(1)).map(|d| d.and_time(time))
                }
            }
            TriggerRule::Weekly { weekday, time } => (0..=7u64)
                .filter_map(|offset| today.checked_add_days(Days::new(offset)))
                .find(|date| {
                    date.weekday().num_days_from_sunday() == u32::from(weekday)
                        && date.and_time(time) > now
                })
                .map(|date| date.and_time(time)),
            TriggerRule::Monthly { day, time } => {
                let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
                (0..=24u32)
                    .filter_map(|offset| first.checked_add_months(Months::new(offset)))
                    .filter_map(|month| NaiveDate::from_ymd_opt(month.year(), month.month(), day))
                    .map(|date| date.and_time(time))
                    .find(|candidate| *candidate > now)
            }
            TriggerRule::Yearly { month, day, time } => (0..=consts::YEARLY_SEARCH_YEARS)
                .filter_map(|offset| NaiveDate::from_ymd_opt(today.year() + offset, month, day))
                .map(|date| date.and_time(time))
                .find(|candidate| *candidate > now),
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, TriggerRule::Once { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleRequest;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn rule(request: ScheduleRequest) -> Result<TriggerRule> {
        TriggerRule::from_definition(&request.into_definition("sch_t".into(), at(2026, 1, 1, 0, 0)))
    }

    #[test]
    fn test_daily_today_or_tomorrow() {
        let daily = rule(ScheduleRequest::new(ScheduleKind::Daily, "02:30")).unwrap();
        assert_eq!(daily.next_after(at(2026, 3, 10, 1, 0)), Some(at(2026, 3, 10, 2, 30)));
        assert_eq!(daily.next_after(at(2026, 3, 10, 2, 30)), Some(at(2026, 3, 11, 2, 30)));
    }

    #[test]
    fn test_weekly_zero_is_sunday() {
        let mut request = ScheduleRequest::new(ScheduleKind::Weekly, "03:00");
        request.day_of_week = Some(0);
        let weekly = rule(request).unwrap();

        // 2026-03-10 是周二
        let next = weekly.next_after(at(2026, 3, 10, 12, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 15, 3, 0));
        assert_eq!(next.weekday(), chrono::Weekday::Sun);

        // 当天时刻已过则顺延一周
        assert_eq!(weekly.next_after(at(2026, 3, 15, 4, 0)), Some(at(2026, 3, 22, 3, 0)));
    }

    #[test]
    fn test_monthly_skips_short_months() {
        let mut request = ScheduleRequest::new(ScheduleKind::Monthly, "01:00");
        request.day = Some(31);
        let monthly = rule(request).unwrap();

        assert_eq!(monthly.next_after(at(2026, 1, 31, 2, 0)), Some(at(2026, 3, 31, 1, 0)));
        assert_eq!(monthly.next_after(at(2026, 4, 1, 0, 0)), Some(at(2026, 5, 31, 1, 0)));
    }

    #[test]
    fn test_yearly_leap_day() {
        let mut request = ScheduleRequest::new(ScheduleKind::Yearly, "00:15");
        request.month = Some(2);
        request.day = Some(29);
        let yearly = rule(request).unwrap();

        assert_eq!(yearly.next_after(at(2026, 1, 1, 0, 0)), Some(at(2028, 2, 29, 0, 15)));
    }

    #[test]
    fn test_once_in_the_past_never_fires() {
        let mut request = ScheduleRequest::new(ScheduleKind::Once, "08:00");
        request.date = Some("2026-04-01".into());
        let once = rule(request).unwrap();

        assert!(once.is_one_shot());
        assert_eq!(once.next_after(at(2026, 3, 1, 0, 0)), Some(at(2026, 4, 1, 8, 0)));
        assert_eq!(once.next_after(at(2026, 4, 1, 8, 0)), None);
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(rule(ScheduleRequest::new(ScheduleKind::Daily, "25:00")).is_err());
        assert!(rule(ScheduleRequest::new(ScheduleKind::Daily, "0230")).is_err());
        assert!(rule(ScheduleRequest::new(ScheduleKind::Once, "08:00")).is_err());
        assert!(rule(ScheduleRequest::new(ScheduleKind::Weekly, "08:00")).is_err());

        let mut weekly = ScheduleRequest::new(ScheduleKind::Weekly, "08:00");
        weekly.day_of_week = Some(7);
        assert!(rule(weekly).is_err());

        let mut yearly = ScheduleRequest::new(ScheduleKind::Yearly, "08:00");
        yearly.month = Some(2);
        yearly.day = Some(30);
        assert!(matches!(rule(yearly), Err(KeeperError::Validation(_))));
    }
}
