use crate::models::{ScheduleDefinition, ScheduleKind};

const WEEKDAY_NAMES: [&str; 7] = ["日", "一", "二", "三", "四", "五", "六"];

/// 计划的中文描述
pub fn describe(definition: &ScheduleDefinition) -> String {
    let time = definition.time.as_str();
    match definition.kind {
        ScheduleKind::Once => match &definition.date {
            Some(date) => format!("仅一次：{date} {time}"),
            None => format!("仅一次：{time}"),
        },
        ScheduleKind::Daily => format!("每天 {time}"),
        ScheduleKind::Weekly => match definition
            .day_of_week
            .and_then(|d| WEEKDAY_NAMES.get(usize::from(d)))
        {
            Some(name) => format!("每周{name} {time}"),
            None => format!("每周 {time}"),
        },
        ScheduleKind::Monthly => match definition.day {
            Some(day) => format!("每月 {day} 日 {time}"),
            None => format!("每月 {time}"),
        },
        ScheduleKind::Yearly => match (definition.month, definition.day) {
            (Some(month), Some(day)) => format!("每年 {month} 月 {day} 日 {time}"),
            _ => format!("每年 {time}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleRequest;
    use chrono::NaiveDate;

    fn definition(request: ScheduleRequest) -> ScheduleDefinition {
        let created = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        request.into_definition("sch_d".into(), created)
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(
            describe(&definition(ScheduleRequest::new(ScheduleKind::Daily, "02:00"))),
            "每天 02:00"
        );

        let mut weekly = ScheduleRequest::new(ScheduleKind::Weekly, "03:30");
        weekly.day_of_week = Some(0);
        assert_eq!(describe(&definition(weekly)), "每周日 03:30");

        let mut yearly = ScheduleRequest::new(ScheduleKind::Yearly, "00:00");
        yearly.month = Some(12);
        yearly.day = Some(31);
        assert_eq!(describe(&definition(yearly)), "每年 12 月 31 日 00:00");

        let mut once = ScheduleRequest::new(ScheduleKind::Once, "08:15");
        once.date = Some("2026-07-01".into());
        assert_eq!(describe(&definition(once)), "仅一次：2026-07-01 08:15");
    }
}
