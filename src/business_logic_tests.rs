#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use crate::normalizer::{
        department_levels, is_over_standard_reason, is_yes, parse_date_str, parse_money_str,
        parse_project_field, parse_time_str, serial_to_date, split_department, AttendanceRecord,
        AttendanceStatus, TravelKind, TravelRecord,
    };
    use crate::validator::{detect_anomalies, AnomalyKind};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn att(date: &str, name: &str, status: AttendanceStatus, hours: f64) -> AttendanceRecord {
        AttendanceRecord {
            date: day(date),
            employee_name: name.to_string(),
            department: vec!["行政部".to_string()],
            status,
            work_hours: hours,
            checkout_time: None,
        }
    }

    fn order(date: &str, name: &str, kind: TravelKind, amount: f64) -> TravelRecord {
        TravelRecord {
            kind,
            event_date: day(date),
            booker_name: name.to_string(),
            traveller_name: name.to_string(),
            department: vec!["行政部".to_string()],
            amount,
            project_code: None,
            project_name: None,
            advance_days: None,
            is_over_standard: false,
            over_standard_reason: None,
        }
    }

    #[test]
    fn test_money_parsing() {
        assert!((parse_money_str("¥1,234.56") - 1234.56).abs() < 1e-6);
        assert!((parse_money_str("1,234.56") - 1234.56).abs() < 1e-6);
        assert!((parse_money_str("2000") - 2000.0).abs() < 1e-6);
        assert_eq!(parse_money_str(""), 0.0);
        assert_eq!(parse_money_str("  "), 0.0);
        assert_eq!(parse_money_str("N/A"), 0.0);
        // full-width separator shows up in some exports
        assert!((parse_money_str("￥12，000") - 12000.0).abs() < 1e-6);

        // scenario: two parsed amounts sum to 3234.56
        let total = parse_money_str("¥1,234.56") + parse_money_str("2000");
        assert!((total - 3234.56).abs() < 1e-6);
    }

    #[test]
    fn test_date_parsing() {
        assert_eq!(parse_date_str("2025-08-01"), Some(day("2025-08-01")));
        assert_eq!(parse_date_str("2025/8/1"), Some(day("2025-08-01")));
        assert_eq!(
            parse_date_str("2025-08-01 09:30:00"),
            Some(day("2025-08-01"))
        );
        assert_eq!(parse_date_str("invalid"), None);
        assert_eq!(parse_date_str(""), None);
    }

    #[test]
    fn test_serial_dates() {
        // 45870 = 2025-08-01
        assert_eq!(serial_to_date(45870.0), Some(day("2025-08-01")));
        assert_eq!(serial_to_date(45870.75), Some(day("2025-08-01")));
        assert_eq!(serial_to_date(0.5), None);
        assert_eq!(serial_to_date(-3.0), None);
    }

    #[test]
    fn test_time_parsing() {
        assert_eq!(
            parse_time_str("19:45:00"),
            NaiveTime::from_hms_opt(19, 45, 0)
        );
        assert_eq!(parse_time_str("19:45"), NaiveTime::from_hms_opt(19, 45, 0));
        assert_eq!(parse_time_str("nope"), None);
    }

    #[test]
    fn test_department_splitting() {
        assert_eq!(split_department("研发/算法/NLP"), vec!["研发", "算法", "NLP"]);
        assert_eq!(split_department(r"研发\算法"), vec!["研发", "算法"]);
        assert_eq!(split_department("研发 - 算法"), vec!["研发", "算法"]);
        assert_eq!(split_department("研发>算法>NLP"), vec!["研发", "算法", "NLP"]);
        // deeper paths truncate from the root
        assert_eq!(split_department("a/b/c/d"), vec!["a", "b", "c"]);
        assert_eq!(split_department("  "), vec!["未知"]);
        assert_eq!(split_department("//"), vec!["未知"]);

        let levels = department_levels(&split_department("研发/算法"));
        assert_eq!(
            levels,
            ("研发".to_string(), Some("算法".to_string()), None)
        );
    }

    #[test]
    fn test_project_field() {
        assert_eq!(
            parse_project_field("05010013 市场-整星项目"),
            (
                Some("05010013".to_string()),
                Some("市场-整星项目".to_string())
            )
        );
        assert_eq!(
            parse_project_field("  123   卫星总装  "),
            (Some("123".to_string()), Some("卫星总装".to_string()))
        );
        assert_eq!(
            parse_project_field("公司公共"),
            (None, Some("公司公共".to_string()))
        );
        // a bare digit run has no name part, so it stays a name
        assert_eq!(parse_project_field("123"), (None, Some("123".to_string())));
        assert_eq!(parse_project_field(""), (None, None));
        assert_eq!(parse_project_field("   "), (None, None));
    }

    #[test]
    fn test_status_lookup() {
        assert_eq!(AttendanceStatus::from_label("上班"), AttendanceStatus::Work);
        assert_eq!(
            AttendanceStatus::from_label("公休日上班"),
            AttendanceStatus::WeekendWork
        );
        assert_eq!(
            AttendanceStatus::from_label("周末加班"),
            AttendanceStatus::WeekendWork
        );
        assert_eq!(
            AttendanceStatus::from_label("出差"),
            AttendanceStatus::Travel
        );
        for label in ["请假", "年假", "病假", "事假"] {
            assert_eq!(AttendanceStatus::from_label(label), AttendanceStatus::Leave);
        }
        assert_eq!(
            AttendanceStatus::from_label("调休"),
            AttendanceStatus::Unknown
        );
        assert_eq!(AttendanceStatus::from_label(" 上班 "), AttendanceStatus::Work);
    }

    #[test]
    fn test_over_standard_flags() {
        assert!(is_yes("是"));
        assert!(is_yes("Y"));
        assert!(is_yes("true"));
        assert!(!is_yes("否"));
        assert!(!is_yes(""));

        assert!(is_over_standard_reason(TravelKind::Flight, "超折扣"));
        assert!(is_over_standard_reason(TravelKind::Flight, "超时间"));
        assert!(!is_over_standard_reason(TravelKind::Flight, "正常"));
        assert!(is_over_standard_reason(TravelKind::Hotel, "超出标准"));
        assert!(!is_over_standard_reason(TravelKind::Hotel, ""));
    }

    #[test]
    fn test_conflict_work_has_travel() {
        let attendance = vec![att("2025-08-01", "张三", AttendanceStatus::Work, 8.0)];
        let travel = vec![order("2025-08-01", "张三", TravelKind::Flight, 2000.0)];

        let (anomalies, warnings) = detect_anomalies(&attendance, &travel);
        assert!(warnings.is_empty());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::ConflictWorkHasTravel);
        assert_eq!(anomalies[0].date, day("2025-08-01"));
        assert_eq!(anomalies[0].employee_name, "张三");
        assert!(anomalies[0].detail.contains("机票"));
        assert_eq!(anomalies[0].attendance_status.as_deref(), Some("WORK"));
    }

    #[test]
    fn test_weekend_work_also_conflicts() {
        let attendance = vec![att("2025-08-02", "张三", AttendanceStatus::WeekendWork, 4.0)];
        let travel = vec![order("2025-08-02", "张三", TravelKind::Train, 300.0)];

        let (anomalies, _) = detect_anomalies(&attendance, &travel);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::ConflictWorkHasTravel);
    }

    #[test]
    fn test_missing_travel_tolerated_within_three_days() {
        let attendance = vec![att("2025-08-10", "李四", AttendanceStatus::Travel, 0.0)];
        let travel = vec![order("2025-08-12", "李四", TravelKind::Hotel, 800.0)];

        let (anomalies, _) = detect_anomalies(&attendance, &travel);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_missing_travel_breach_beyond_three_days() {
        let attendance = vec![att("2025-08-10", "李四", AttendanceStatus::Travel, 0.0)];
        let travel = vec![order("2025-08-14", "李四", TravelKind::Hotel, 800.0)];

        let (anomalies, _) = detect_anomalies(&attendance, &travel);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::MissingTravelForTripStatus);
    }

    #[test]
    fn test_conflict_collapses_multiple_orders() {
        let attendance = vec![att("2025-08-01", "张三", AttendanceStatus::Work, 8.0)];
        let travel = vec![
            order("2025-08-01", "张三", TravelKind::Flight, 2000.0),
            order("2025-08-01", "张三", TravelKind::Flight, 1800.0),
            order("2025-08-01", "张三", TravelKind::Hotel, 500.0),
        ];

        let (anomalies, _) = detect_anomalies(&attendance, &travel);
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].detail.contains("共3笔"));
        assert!(anomalies[0].detail.contains("机票"));
        assert!(anomalies[0].detail.contains("酒店"));
    }

    #[test]
    fn test_anomaly_order_is_stable() {
        let attendance = vec![
            att("2025-08-03", "王五", AttendanceStatus::Travel, 0.0),
            att("2025-08-01", "张三", AttendanceStatus::Work, 8.0),
            att("2025-08-01", "李四", AttendanceStatus::Travel, 0.0),
        ];
        let travel = vec![order("2025-08-01", "张三", TravelKind::Flight, 2000.0)];

        let (anomalies, _) = detect_anomalies(&attendance, &travel);
        assert_eq!(anomalies.len(), 3);
        // date asc, then employee asc (both rules fire on 08-01)
        assert_eq!(anomalies[0].employee_name, "张三");
        assert_eq!(anomalies[1].employee_name, "李四");
        assert_eq!(anomalies[2].employee_name, "王五");
    }

    #[test]
    fn test_anomalies_independent_of_enumeration_order() {
        let mut attendance = vec![
            att("2025-08-01", "张三", AttendanceStatus::Work, 8.0),
            att("2025-08-05", "李四", AttendanceStatus::Travel, 0.0),
            att("2025-08-02", "王五", AttendanceStatus::WeekendWork, 4.0),
        ];
        let mut travel = vec![
            order("2025-08-01", "张三", TravelKind::Flight, 2000.0),
            order("2025-08-02", "王五", TravelKind::Train, 400.0),
            order("2025-08-20", "李四", TravelKind::Hotel, 600.0),
        ];

        let (forward, _) = detect_anomalies(&attendance, &travel);
        attendance.reverse();
        travel.reverse();
        let (reversed, _) = detect_anomalies(&attendance, &travel);

        assert_eq!(forward.len(), reversed.len());
        for (a, b) in forward.iter().zip(reversed.iter()) {
            assert_eq!(a.date, b.date);
            assert_eq!(a.employee_name, b.employee_name);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.detail, b.detail);
        }
    }

    #[test]
    fn test_month_tag_helpers() {
        use crate::month::{is_month_tag, month_of, parse_months_param, quarter_months};

        assert_eq!(month_of(day("2025-08-15")), "2025-08");
        assert!(is_month_tag("2025-08"));
        assert!(!is_month_tag("2025-13"));
        assert!(!is_month_tag("202508"));

        let months = parse_months_param("2025-02, 2025-01,2025-02").unwrap();
        assert_eq!(months, vec!["2025-01", "2025-02"]);
        assert!(parse_months_param("2025/08").is_err());

        assert_eq!(
            quarter_months(2025, 3).unwrap(),
            vec!["2025-07", "2025-08", "2025-09"]
        );
        assert!(quarter_months(2025, 5).is_err());
    }

    #[test]
    fn test_allowed_origins_forms() {
        use crate::config::parse_origins;

        assert_eq!(
            parse_origins(Some("http://a,http://b")),
            vec!["http://a".to_string(), "http://b".to_string()]
        );
        assert_eq!(
            parse_origins(Some(r#"["http://a", "http://b"]"#)),
            vec!["http://a".to_string(), "http://b".to_string()]
        );
        // blank falls back to the defaults
        assert!(!parse_origins(Some("")).is_empty());
        assert!(!parse_origins(None).is_empty());
    }

    #[test]
    fn test_upload_naming() {
        use crate::ingest::unique_upload_name;

        let name = unique_upload_name("8月考勤.xlsx", "20250801_120000");
        assert!(name.starts_with("8月考勤_"));
        assert!(name.ends_with(".xlsx"));
        // 8 hex digits between stem and extension
        let tag = name
            .trim_start_matches("8月考勤_")
            .trim_end_matches(".xlsx");
        assert_eq!(tag.len(), 8);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));

        // same name, different timestamp -> different file
        let other = unique_upload_name("8月考勤.xlsx", "20250801_120001");
        assert_ne!(name, other);
    }
}
