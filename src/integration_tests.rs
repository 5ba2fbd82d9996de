#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use crate::commands::{anomalies, dashboard, departments, projects};
    use crate::db::{self, DbPool};
    use crate::error::CostMatrixError;
    use crate::month::resolve_months;
    use crate::normalizer::{
        parse_money_str, AttendanceRecord, AttendanceStatus, TravelKind, TravelRecord,
    };
    use crate::store::{self, MonthLocks};
    use crate::validator::detect_anomalies;

    async fn setup_test_db() -> DbPool {
        let pool = db::init_memory_pool().await.expect("Failed to create pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn months(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    fn att(
        date: &str,
        name: &str,
        dept: &[&str],
        status: AttendanceStatus,
        hours: f64,
    ) -> AttendanceRecord {
        att_full(date, name, dept, status, hours, None)
    }

    fn att_full(
        date: &str,
        name: &str,
        dept: &[&str],
        status: AttendanceStatus,
        hours: f64,
        checkout: Option<&str>,
    ) -> AttendanceRecord {
        AttendanceRecord {
            date: day(date),
            employee_name: name.to_string(),
            department: dept.iter().map(|d| d.to_string()).collect(),
            status,
            work_hours: hours,
            checkout_time: checkout.map(|c| NaiveTime::parse_from_str(c, "%H:%M:%S").unwrap()),
        }
    }

    fn order(
        date: &str,
        name: &str,
        dept: &[&str],
        kind: TravelKind,
        amount: f64,
    ) -> TravelRecord {
        order_for_project(date, name, dept, kind, amount, None, None)
    }

    fn order_for_project(
        date: &str,
        name: &str,
        dept: &[&str],
        kind: TravelKind,
        amount: f64,
        code: Option<&str>,
        project_name: Option<&str>,
    ) -> TravelRecord {
        TravelRecord {
            kind,
            event_date: day(date),
            booker_name: name.to_string(),
            traveller_name: name.to_string(),
            department: dept.iter().map(|d| d.to_string()).collect(),
            amount,
            project_code: code.map(str::to_string),
            project_name: project_name.map(str::to_string),
            advance_days: Some(3),
            is_over_standard: false,
            over_standard_reason: None,
        }
    }

    async fn table_count(pool: &DbPool, table: &str, month: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE source_month = ?");
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(month)
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_replace_month_and_list_months() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        store::replace_month(
            &pool,
            &locks,
            "2025-02",
            &[att("2025-02-03", "张三", &["行政部"], AttendanceStatus::Work, 8.0)],
            &[],
            &[],
        )
        .await
        .unwrap();
        store::replace_month(
            &pool,
            &locks,
            "2025-01",
            &[att("2025-01-06", "张三", &["行政部"], AttendanceStatus::Work, 8.0)],
            &[],
            &[],
        )
        .await
        .unwrap();

        let listed = store::list_months(&pool).await.unwrap();
        assert_eq!(listed, vec!["2025-01", "2025-02"]);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let attendance = vec![
            att("2025-08-01", "张三", &["行政部"], AttendanceStatus::Work, 8.0),
            att("2025-08-02", "李四", &["行政部"], AttendanceStatus::Travel, 0.0),
        ];
        let travel = vec![order(
            "2025-08-02",
            "李四",
            &["行政部"],
            TravelKind::Hotel,
            800.0,
        )];

        for _ in 0..2 {
            store::replace_month(&pool, &locks, "2025-08", &attendance, &travel, &[])
                .await
                .unwrap();
        }

        assert_eq!(table_count(&pool, "attendance", "2025-08").await, 2);
        assert_eq!(table_count(&pool, "travel_orders", "2025-08").await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_attendance_rows_collapse() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let attendance = vec![
            att("2025-08-01", "张三", &["行政部"], AttendanceStatus::Work, 8.0),
            att("2025-08-01", "张三", &["行政部"], AttendanceStatus::Work, 9.0),
        ];
        let stats = store::replace_month(&pool, &locks, "2025-08", &attendance, &[], &[])
            .await
            .unwrap();

        assert_eq!(stats.attendance_count, 1);
        assert_eq!(table_count(&pool, "attendance", "2025-08").await, 1);
    }

    #[tokio::test]
    async fn test_delete_month_removes_everything() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let attendance = vec![att(
            "2025-08-01",
            "张三",
            &["行政部"],
            AttendanceStatus::Work,
            8.0,
        )];
        let travel = vec![order(
            "2025-08-01",
            "张三",
            &["行政部"],
            TravelKind::Flight,
            2000.0,
        )];
        let (anoms, _) = detect_anomalies(&attendance, &travel);
        assert_eq!(anoms.len(), 1);
        store::replace_month(&pool, &locks, "2025-08", &attendance, &travel, &anoms)
            .await
            .unwrap();
        store::replace_month(
            &pool,
            &locks,
            "2025-09",
            &[att("2025-09-01", "李四", &["行政部"], AttendanceStatus::Work, 8.0)],
            &[],
            &[],
        )
        .await
        .unwrap();

        let report = store::delete_month(&pool, &locks, "2025-08").await.unwrap();
        assert_eq!(report.deleted_attendance, 1);
        assert_eq!(report.deleted_travel, 1);
        assert_eq!(report.deleted_anomalies, 1);

        assert_eq!(table_count(&pool, "attendance", "2025-08").await, 0);
        assert_eq!(table_count(&pool, "travel_orders", "2025-08").await, 0);
        assert_eq!(table_count(&pool, "anomalies", "2025-08").await, 0);
        assert_eq!(store::list_months(&pool).await.unwrap(), vec!["2025-09"]);
    }

    #[tokio::test]
    async fn test_delete_month_shrinks_upload_records() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        store::replace_month(
            &pool,
            &locks,
            "2025-01",
            &[att("2025-01-06", "张三", &["行政部"], AttendanceStatus::Work, 8.0)],
            &[],
            &[],
        )
        .await
        .unwrap();
        store::replace_month(
            &pool,
            &locks,
            "2025-02",
            &[att("2025-02-03", "张三", &["行政部"], AttendanceStatus::Work, 8.0)],
            &[],
            &[],
        )
        .await
        .unwrap();
        store::upsert_upload(
            &pool,
            "考勤.xlsx",
            "/nonexistent/考勤_deadbeef.xlsx",
            1024,
            "hash-1",
            &months(&["2025-01", "2025-02"]),
        )
        .await
        .unwrap();

        store::delete_month(&pool, &locks, "2025-01").await.unwrap();
        let uploads = store::list_uploads(&pool).await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].months(), vec!["2025-02"]);

        let report = store::delete_month(&pool, &locks, "2025-02").await.unwrap();
        assert_eq!(report.deleted_uploads.len(), 1);
        assert!(store::list_uploads(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_upload_unions_months() {
        let pool = setup_test_db().await;

        // months arrive unsorted; the stored set is sorted from the start
        let record = store::upsert_upload(
            &pool,
            "a.xlsx",
            "/tmp/a.xlsx",
            10,
            "h",
            &months(&["2025-03", "2025-01"]),
        )
        .await
        .unwrap();
        assert_eq!(record.months(), vec!["2025-01", "2025-03"]);

        store::delete_month(&pool, &MonthLocks::new(), "2025-03")
            .await
            .unwrap();
        let record = store::upsert_upload(
            &pool,
            "a.xlsx",
            "/tmp/a2.xlsx",
            12,
            "h",
            &months(&["2025-02"]),
        )
        .await
        .unwrap();

        assert_eq!(record.months(), vec!["2025-01", "2025-02"]);
        assert_eq!(record.file_path, "/tmp/a2.xlsx");
        assert!(record.parsed);
        assert_eq!(store::list_uploads(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_multi_month_summary_totals() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        store::replace_month(
            &pool,
            &locks,
            "2025-01",
            &[],
            &[order(
                "2025-01-10",
                "张三",
                &["行政部"],
                TravelKind::Flight,
                1000.0,
            )],
            &[],
        )
        .await
        .unwrap();
        store::replace_month(
            &pool,
            &locks,
            "2025-02",
            &[],
            &[order(
                "2025-02-10",
                "张三",
                &["行政部"],
                TravelKind::Flight,
                2000.0,
            )],
            &[],
        )
        .await
        .unwrap();

        let summary = dashboard::summary_internal(&pool, &months(&["2025-01", "2025-02"]))
            .await
            .unwrap();
        assert!((summary.total_cost - 3000.0).abs() < 1e-6);
        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.order_breakdown.flight, 2);
        assert_eq!(summary.order_breakdown.total, 2);
    }

    #[tokio::test]
    async fn test_summary_sums_cleaned_amounts() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let travel = vec![
            order(
                "2025-08-01",
                "张三",
                &["行政部"],
                TravelKind::Flight,
                parse_money_str("¥1,234.56"),
            ),
            order(
                "2025-08-02",
                "李四",
                &["行政部"],
                TravelKind::Flight,
                parse_money_str("2000"),
            ),
        ];
        store::replace_month(&pool, &locks, "2025-08", &[], &travel, &[])
            .await
            .unwrap();

        let summary = dashboard::summary_internal(&pool, &months(&["2025-08"]))
            .await
            .unwrap();
        assert!((summary.total_cost - 3234.56).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_summary_work_hour_metrics() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let attendance = vec![
            att("2025-08-01", "张三", &["行政部"], AttendanceStatus::Work, 8.0),
            att("2025-08-04", "张三", &["行政部"], AttendanceStatus::Work, 10.0),
            // zero-hour workday rows stay out of the mean
            att("2025-08-05", "李四", &["行政部"], AttendanceStatus::Work, 0.0),
            att(
                "2025-08-02",
                "李四",
                &["行政部"],
                AttendanceStatus::WeekendWork,
                4.0,
            ),
            att("2025-08-06", "王五", &["行政部"], AttendanceStatus::Leave, 0.0),
        ];
        store::replace_month(&pool, &locks, "2025-08", &attendance, &[], &[])
            .await
            .unwrap();

        let summary = dashboard::summary_internal(&pool, &months(&["2025-08"]))
            .await
            .unwrap();
        assert!((summary.avg_work_hours - 9.0).abs() < 1e-6);
        assert!((summary.holiday_avg_work_hours - 4.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_summary_over_standard_breakdowns() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let mut flight_over = order(
            "2025-08-01",
            "张三",
            &["行政部"],
            TravelKind::Flight,
            5000.0,
        );
        flight_over.is_over_standard = true;
        flight_over.over_standard_reason = Some("超折扣".to_string());
        let mut hotel_over = order("2025-08-02", "李四", &["行政部"], TravelKind::Hotel, 900.0);
        hotel_over.is_over_standard = true;
        hotel_over.over_standard_reason = Some("超出协议价".to_string());
        let normal = order("2025-08-03", "王五", &["行政部"], TravelKind::Train, 200.0);

        store::replace_month(
            &pool,
            &locks,
            "2025-08",
            &[],
            &[flight_over, hotel_over, normal],
            &[],
        )
        .await
        .unwrap();

        let summary = dashboard::summary_internal(&pool, &months(&["2025-08"]))
            .await
            .unwrap();
        assert_eq!(summary.over_standard_count, 2);
        assert_eq!(summary.over_standard_breakdown.flight, 1);
        assert_eq!(summary.over_standard_breakdown.hotel, 1);
        assert_eq!(summary.over_standard_breakdown.train, 0);
        // reasons are opaque strings, histogrammed only for flights
        assert_eq!(
            summary.flight_over_type_breakdown.get("超折扣").copied(),
            Some(1)
        );
        assert_eq!(summary.flight_over_type_breakdown.len(), 1);
    }

    #[tokio::test]
    async fn test_aggregator_purity_across_months() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        store::replace_month(
            &pool,
            &locks,
            "2025-01",
            &[att("2025-01-06", "张三", &["行政部"], AttendanceStatus::Work, 8.0)],
            &[order(
                "2025-01-10",
                "张三",
                &["行政部"],
                TravelKind::Flight,
                1000.0,
            )],
            &[],
        )
        .await
        .unwrap();

        let before = dashboard::summary_internal(&pool, &months(&["2025-01"]))
            .await
            .unwrap();

        // rows outside the queried month set must not change anything
        store::replace_month(
            &pool,
            &locks,
            "2025-02",
            &[att("2025-02-03", "李四", &["行政部"], AttendanceStatus::Work, 12.0)],
            &[order(
                "2025-02-10",
                "李四",
                &["行政部"],
                TravelKind::Hotel,
                999.0,
            )],
            &[],
        )
        .await
        .unwrap();

        let after = dashboard::summary_internal(&pool, &months(&["2025-01"]))
            .await
            .unwrap();
        assert_eq!(before.total_cost, after.total_cost);
        assert_eq!(before.total_orders, after.total_orders);
        assert_eq!(before.avg_work_hours, after.avg_work_hours);
    }

    #[tokio::test]
    async fn test_unknown_month_yields_empty_results() {
        let pool = setup_test_db().await;

        let summary = dashboard::summary_internal(&pool, &months(&["2031-01"]))
            .await
            .unwrap();
        assert_eq!(summary.total_cost, 0.0);
        assert_eq!(summary.total_orders, 0);

        let projects = projects::list_projects_internal(&pool, &months(&["2031-01"]))
            .await
            .unwrap();
        assert!(projects.is_empty());

        let listed = anomalies::list_anomalies_internal(&pool, &months(&["2031-01"]))
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_department_level2_aggregation() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let travel = vec![
            order(
                "2025-08-01",
                "张三",
                &["研发", "算法", "NLP"],
                TravelKind::Flight,
                1000.0,
            ),
            order(
                "2025-08-02",
                "李四",
                &["研发", "算法", "CV"],
                TravelKind::Hotel,
                1000.0,
            ),
        ];
        store::replace_month(&pool, &locks, "2025-08", &[], &travel, &[])
            .await
            .unwrap();

        let list = departments::department_list_internal(
            &pool,
            &months(&["2025-08"]),
            2,
            Some("研发"),
        )
        .await
        .unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "算法");
        assert!((list[0].total_cost - 2000.0).abs() < 1e-6);
        assert_eq!(list[0].person_count, 2);
        assert_eq!(list[0].parent.as_deref(), Some("研发"));
    }

    #[tokio::test]
    async fn test_department_hierarchy_shape() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        store::replace_month(
            &pool,
            &locks,
            "2025-08",
            &[att(
                "2025-08-01",
                "张三",
                &["研发", "算法", "NLP"],
                AttendanceStatus::Work,
                8.0,
            )],
            &[order(
                "2025-08-01",
                "李四",
                &["市场"],
                TravelKind::Train,
                300.0,
            )],
            &[],
        )
        .await
        .unwrap();

        let hierarchy = departments::department_hierarchy(&pool, &months(&["2025-08"]))
            .await
            .unwrap();
        assert_eq!(hierarchy.level1, vec!["市场", "研发"]);
        assert_eq!(hierarchy.level2.get("研发").unwrap(), &vec!["算法"]);
        assert_eq!(hierarchy.level3.get("算法").unwrap(), &vec!["NLP"]);
        assert!(!hierarchy.level2.contains_key("市场"));
    }

    #[tokio::test]
    async fn test_department_details_dossier() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        // 2025-08-02 is a Saturday, 2025-08-03 a Sunday
        let attendance = vec![
            att_full(
                "2025-08-01",
                "张三",
                &["研发"],
                AttendanceStatus::Work,
                9.0,
                Some("20:15:00"),
            ),
            att_full(
                "2025-08-04",
                "张三",
                &["研发"],
                AttendanceStatus::Work,
                8.0,
                Some("18:30:00"),
            ),
            att("2025-08-02", "李四", &["研发"], AttendanceStatus::WeekendWork, 4.0),
            att("2025-08-05", "李四", &["研发"], AttendanceStatus::Travel, 0.0),
            att("2025-08-06", "王五", &["研发"], AttendanceStatus::Leave, 0.0),
            att("2025-08-03", "王五", &["研发"], AttendanceStatus::Work, 6.0),
        ];
        let travel = vec![order(
            "2025-08-05",
            "李四",
            &["研发"],
            TravelKind::Hotel,
            650.0,
        )];
        let (anoms, _) = detect_anomalies(&attendance, &travel);
        store::replace_month(&pool, &locks, "2025-08", &attendance, &travel, &anoms)
            .await
            .unwrap();

        let details = departments::department_details_internal(
            &pool,
            &months(&["2025-08"]),
            "研发",
            1,
        )
        .await
        .unwrap();

        assert_eq!(details.workday_attendance_days, 3);
        assert_eq!(details.weekend_work_days, 1);
        assert_eq!(details.travel_days, 1);
        assert_eq!(details.leave_days, 1);
        assert_eq!(details.late_after_1930_count, 1);
        // WORK row on the Sunday counts as weekend attendance
        assert_eq!(details.weekend_attendance_count, 1);
        assert_eq!(details.person_count, 3);
        assert!((details.total_cost - 650.0).abs() < 1e-6);
        assert!(
            (details.avg_work_hours - (9.0 + 8.0 + 6.0) / 3.0).abs() < 1e-6
        );
        assert_eq!(
            details.attendance_days_distribution.get("WORK").copied(),
            Some(3)
        );
        assert_eq!(details.travel_ranking.len(), 1);
        assert_eq!(details.travel_ranking[0].name, "李四");
        assert_eq!(details.latest_checkout_ranking[0].name, "张三");
        assert_eq!(details.latest_checkout_ranking[0].detail, "20:15:00");
        assert_eq!(details.longest_hours_ranking[0].name, "张三");
    }

    #[tokio::test]
    async fn test_level1_statistics_children() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let attendance = vec![
            att(
                "2025-08-01",
                "张三",
                &["研发", "算法"],
                AttendanceStatus::Work,
                8.0,
            ),
            att(
                "2025-08-01",
                "李四",
                &["研发", "平台"],
                AttendanceStatus::Work,
                10.0,
            ),
        ];
        let travel = vec![
            order(
                "2025-08-02",
                "张三",
                &["研发", "算法"],
                TravelKind::Flight,
                3000.0,
            ),
            order(
                "2025-08-03",
                "李四",
                &["研发", "平台"],
                TravelKind::Train,
                500.0,
            ),
        ];
        store::replace_month(&pool, &locks, "2025-08", &attendance, &travel, &[])
            .await
            .unwrap();

        let stats = departments::level_statistics_internal(
            &pool,
            &months(&["2025-08"]),
            "研发",
            1,
        )
        .await
        .unwrap();

        assert!((stats.total_travel_cost - 3500.0).abs() < 1e-6);
        assert_eq!(stats.children.len(), 2);
        // children sorted by cost
        assert_eq!(stats.children[0].name, "算法");
        assert!((stats.children[0].total_cost - 3000.0).abs() < 1e-6);
        assert_eq!(stats.children[1].name, "平台");
    }

    #[tokio::test]
    async fn test_project_rollup_and_nan_bucket() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let travel = vec![
            order_for_project(
                "2025-08-01",
                "张三",
                &["研发"],
                TravelKind::Flight,
                1000.0,
                Some("05010013"),
                Some("整星项目"),
            ),
            order_for_project(
                "2025-08-03",
                "李四",
                &["市场"],
                TravelKind::Hotel,
                500.0,
                Some("05010013"),
                Some("整星项目"),
            ),
            order_for_project(
                "2025-08-05",
                "张三",
                &["研发"],
                TravelKind::Train,
                200.0,
                Some("05010013"),
                Some("整星工程"),
            ),
            order_for_project(
                "2025-08-02",
                "王五",
                &["行政部"],
                TravelKind::Flight,
                300.0,
                None,
                None,
            ),
        ];
        store::replace_month(&pool, &locks, "2025-08", &[], &travel, &[])
            .await
            .unwrap();
        let selected = months(&["2025-08"]);

        let projects_list = projects::list_projects_internal(&pool, &selected)
            .await
            .unwrap();
        assert_eq!(projects_list.len(), 2);

        let top = &projects_list[0];
        assert_eq!(top.code, "05010013");
        // most frequent name wins
        assert_eq!(top.name, "整星项目");
        assert!((top.total_cost - 1700.0).abs() < 1e-6);
        assert_eq!(top.record_count, 3);
        assert_eq!(top.flight_count, 1);
        assert_eq!(top.hotel_count, 1);
        assert_eq!(top.train_count, 1);
        assert_eq!(top.person_count, 2);
        assert_eq!(top.person_list, vec!["张三", "李四"]);
        assert_eq!(top.department_list, vec!["研发", "市场"]);
        assert_eq!(top.date_range.start, "2025-08-01");
        assert_eq!(top.date_range.end, "2025-08-05");

        let nan_bucket = &projects_list[1];
        assert_eq!(nan_bucket.code, "nan");
        assert_eq!(nan_bucket.name, "未知项目");
        assert!((nan_bucket.total_cost - 300.0).abs() < 1e-6);

        // the null-code rows count as exactly one project bucket
        let summary = dashboard::summary_internal(&pool, &selected).await.unwrap();
        assert_eq!(summary.total_project_count, 2);

        let orders = projects::project_orders_internal(&pool, &selected, "nan")
            .await
            .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].traveller_name, "王五");
        assert_eq!(orders[0].project_code, "nan");

        let top_list = projects::project_top_n(&pool, &selected, 1).await.unwrap();
        assert_eq!(top_list.len(), 2);
        assert_eq!(top_list[0].code, "05010013");
        assert_eq!(top_list[1].code, "其他");
        assert!((top_list[1].total_cost - 300.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_project_name_tie_breaks_to_first_seen() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        // two names with equal counts; the earliest row order decides
        let travel = vec![
            order_for_project(
                "2025-08-01",
                "张三",
                &["研发"],
                TravelKind::Flight,
                100.0,
                Some("05020001"),
                Some("甲方案"),
            ),
            order_for_project(
                "2025-08-02",
                "张三",
                &["研发"],
                TravelKind::Hotel,
                100.0,
                Some("05020001"),
                Some("乙方案"),
            ),
            order_for_project(
                "2025-08-03",
                "张三",
                &["研发"],
                TravelKind::Hotel,
                100.0,
                Some("05020001"),
                Some("乙方案"),
            ),
            order_for_project(
                "2025-08-04",
                "张三",
                &["研发"],
                TravelKind::Train,
                100.0,
                Some("05020001"),
                Some("甲方案"),
            ),
        ];
        store::replace_month(&pool, &locks, "2025-08", &[], &travel, &[])
            .await
            .unwrap();

        let projects_list = projects::list_projects_internal(&pool, &months(&["2025-08"]))
            .await
            .unwrap();
        assert_eq!(projects_list.len(), 1);
        assert_eq!(projects_list[0].name, "甲方案");
    }

    #[tokio::test]
    async fn test_anomaly_listing_projection() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        let attendance = vec![att(
            "2025-08-01",
            "张三",
            &["行政部"],
            AttendanceStatus::Work,
            8.0,
        )];
        let travel = vec![order(
            "2025-08-01",
            "张三",
            &["行政部"],
            TravelKind::Flight,
            2000.0,
        )];
        let (anoms, _) = detect_anomalies(&attendance, &travel);
        store::replace_month(&pool, &locks, "2025-08", &attendance, &travel, &anoms)
            .await
            .unwrap();

        let listed = anomalies::list_anomalies_internal(&pool, &months(&["2025-08"]))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, "CONFLICT_WORK_HAS_TRAVEL");
        assert_eq!(listed[0].date, "2025-08-01");
        assert_eq!(listed[0].employee_name, "张三");
        assert_eq!(listed[0].department_path, vec!["行政部"]);
        assert_eq!(listed[0].attendance_status.as_deref(), Some("WORK"));
        assert!(listed[0].detail.contains("机票"));
    }

    #[tokio::test]
    async fn test_dashboard_bundle_month_breakdown() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        store::replace_month(
            &pool,
            &locks,
            "2025-01",
            &[],
            &[order(
                "2025-01-10",
                "张三",
                &["行政部"],
                TravelKind::Flight,
                1000.0,
            )],
            &[],
        )
        .await
        .unwrap();
        store::replace_month(
            &pool,
            &locks,
            "2025-02",
            &[],
            &[order(
                "2025-02-10",
                "李四",
                &["行政部"],
                TravelKind::Hotel,
                2000.0,
            )],
            &[],
        )
        .await
        .unwrap();

        let bundle = dashboard::dashboard_bundle(&pool, &months(&["2025-01", "2025-02"]))
            .await
            .unwrap();
        assert_eq!(bundle.month_breakdown.len(), 2);
        assert!((bundle.month_breakdown[0].total_cost - 1000.0).abs() < 1e-6);
        assert!((bundle.month_breakdown[1].total_cost - 2000.0).abs() < 1e-6);
        assert_eq!(bundle.department_stats.len(), 1);
        assert_eq!(bundle.department_stats[0].dept, "行政部");
    }

    #[tokio::test]
    async fn test_resolve_months_year_expansion() {
        let pool = setup_test_db().await;
        let locks = MonthLocks::new();

        store::replace_month(
            &pool,
            &locks,
            "2025-03",
            &[att("2025-03-03", "张三", &["行政部"], AttendanceStatus::Work, 8.0)],
            &[],
            &[],
        )
        .await
        .unwrap();

        let resolved = resolve_months(&pool, None, None, Some(2025)).await.unwrap();
        assert_eq!(resolved, vec!["2025-03"]);

        let resolved = resolve_months(&pool, None, Some(1), Some(2025))
            .await
            .unwrap();
        assert_eq!(resolved, vec!["2025-01", "2025-02", "2025-03"]);

        let resolved = resolve_months(&pool, Some("2025-03"), None, None)
            .await
            .unwrap();
        assert_eq!(resolved, vec!["2025-03"]);

        assert!(resolve_months(&pool, None, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_same_month_lock_contention() {
        let locks = MonthLocks::new();
        let _guard = locks.acquire("2025-08").await.unwrap();

        // a different month is independent
        let other = locks.acquire("2025-09").await;
        assert!(other.is_ok());

        // the held month times out with a contention error
        let err = locks.acquire("2025-08").await.unwrap_err();
        assert!(matches!(err, CostMatrixError::Contention(_)));
    }

    #[test]
    fn test_progress_lifecycle() {
        use crate::progress::{ProgressTracker, TaskStatus};

        let tracker = ProgressTracker::new();
        tracker.create("t1", "考勤.xlsx");

        let task = tracker.get("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Uploading);
        assert_eq!(task.progress, 0);

        tracker.update("t1", 30, "交叉验证与入库...");
        tracker.add_step("t1", "解析 Excel 文件");
        let task = tracker.get("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.progress, 30);
        assert_eq!(task.steps.len(), 1);

        // progress never regresses
        tracker.update("t1", 10, "later");
        assert_eq!(tracker.get("t1").unwrap().progress, 30);

        tracker.complete("t1");
        let task = tracker.get("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);

        // terminal tasks survive an immediate sweep
        tracker.sweep_expired();
        assert!(tracker.get("t1").is_some());

        tracker.create("t2", "b.xlsx");
        tracker.request_cancel("t2");
        assert!(tracker.cancel_requested("t2"));
        tracker.fail("t2", "CANCELLED");
        assert_eq!(tracker.get("t2").unwrap().status, TaskStatus::Failed);
        assert_eq!(tracker.get("t2").unwrap().error.as_deref(), Some("CANCELLED"));
    }
}
