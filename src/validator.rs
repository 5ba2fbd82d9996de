use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::normalizer::{AttendanceRecord, AttendanceStatus, TravelKind, TravelRecord};

/// Two booking events within this many calendar days of a TRAVEL
/// attendance day count as supporting evidence for the trip.
const TRAVEL_TOLERANCE_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnomalyKind {
    ConflictWorkHasTravel,
    MissingTravelForTripStatus,
}

impl AnomalyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyKind::ConflictWorkHasTravel => "CONFLICT_WORK_HAS_TRAVEL",
            AnomalyKind::MissingTravelForTripStatus => "MISSING_TRAVEL_FOR_TRIP_STATUS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyDraft {
    pub date: NaiveDate,
    pub employee_name: String,
    pub department: Vec<String>,
    pub kind: AnomalyKind,
    pub detail: String,
    pub attendance_status: Option<String>,
}

fn status_label(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Work => "上班",
        AttendanceStatus::WeekendWork => "公休日上班",
        AttendanceStatus::Travel => "出差",
        AttendanceStatus::Leave => "请假",
        AttendanceStatus::Unknown => "未知",
    }
}

/// Joins one month's attendance and travel streams and emits the
/// inconsistencies. Pure: the result depends only on the two row sets,
/// not on their enumeration order, and the function never fails --
/// defective rows are skipped and reported in the warning vector.
pub fn detect_anomalies(
    attendance: &[AttendanceRecord],
    travel: &[TravelRecord],
) -> (Vec<AnomalyDraft>, Vec<String>) {
    let mut warnings = Vec::new();

    // traveller name -> booking events, matched after trimming
    let mut bookings: HashMap<&str, Vec<(NaiveDate, TravelKind)>> = HashMap::new();
    for order in travel {
        let name = order.traveller_name.trim();
        if name.is_empty() {
            warnings.push(format!(
                "差旅记录缺少差旅人员姓名 ({} {})",
                order.kind.label(),
                order.event_date
            ));
            continue;
        }
        bookings
            .entry(name)
            .or_default()
            .push((order.event_date, order.kind));
    }

    let mut anomalies = Vec::new();
    let mut seen: BTreeSet<(NaiveDate, String, AnomalyKind)> = BTreeSet::new();

    for record in attendance {
        let name = record.employee_name.trim();
        if name.is_empty() {
            warnings.push(format!("考勤记录缺少姓名 ({})", record.date));
            continue;
        }
        let person_bookings = bookings.get(name).map(Vec::as_slice).unwrap_or(&[]);

        match record.status {
            AttendanceStatus::Work | AttendanceStatus::WeekendWork => {
                let mut same_day: Vec<TravelKind> = person_bookings
                    .iter()
                    .filter(|(date, _)| *date == record.date)
                    .map(|(_, kind)| *kind)
                    .collect();
                if same_day.is_empty() {
                    continue;
                }
                let key = (
                    record.date,
                    name.to_string(),
                    AnomalyKind::ConflictWorkHasTravel,
                );
                if !seen.insert(key) {
                    continue;
                }

                let order_count = same_day.len();
                same_day.sort();
                same_day.dedup();
                let kinds = same_day
                    .iter()
                    .map(|k| k.label())
                    .collect::<Vec<_>>()
                    .join(",");
                let mut detail = format!(
                    "{name} 在 {} 考勤显示{}，但有 {kinds} 消费记录",
                    record.date,
                    status_label(record.status),
                );
                if order_count > 1 {
                    detail.push_str(&format!("（共{order_count}笔）"));
                }

                anomalies.push(AnomalyDraft {
                    date: record.date,
                    employee_name: name.to_string(),
                    department: record.department.clone(),
                    kind: AnomalyKind::ConflictWorkHasTravel,
                    detail,
                    attendance_status: Some(record.status.as_str().to_string()),
                });
            }
            AttendanceStatus::Travel => {
                let supported = person_bookings.iter().any(|(date, _)| {
                    (*date - record.date).num_days().abs() <= TRAVEL_TOLERANCE_DAYS
                });
                if supported {
                    continue;
                }
                let key = (
                    record.date,
                    name.to_string(),
                    AnomalyKind::MissingTravelForTripStatus,
                );
                if !seen.insert(key) {
                    continue;
                }

                anomalies.push(AnomalyDraft {
                    date: record.date,
                    employee_name: name.to_string(),
                    department: record.department.clone(),
                    kind: AnomalyKind::MissingTravelForTripStatus,
                    detail: format!(
                        "{name} 在 {} 考勤显示出差，但前后{TRAVEL_TOLERANCE_DAYS}天内无差旅消费记录",
                        record.date
                    ),
                    attendance_status: Some(record.status.as_str().to_string()),
                });
            }
            AttendanceStatus::Leave | AttendanceStatus::Unknown => {}
        }
    }

    // stable order: date, then employee, then conflict before missing-travel
    anomalies.sort_by(|a, b| {
        (a.date, &a.employee_name, a.kind).cmp(&(b.date, &b.employee_name, b.kind))
    });

    (anomalies, warnings)
}
