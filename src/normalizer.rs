use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CostMatrixError, CostMatrixResult};
use crate::month::month_of;

pub const SHEET_ATTENDANCE: &str = "状态明细";
pub const SHEET_FLIGHT: &str = "机票";
pub const SHEET_HOTEL: &str = "酒店";
pub const SHEET_TRAIN: &str = "火车票";

pub const UNKNOWN_DEPARTMENT: &str = "未知";

static PROJECT_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(.*)$").expect("project field regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AttendanceStatus {
    Work,
    WeekendWork,
    Travel,
    Leave,
    Unknown,
}

impl AttendanceStatus {
    /// Fixed lookup from the workbook's status text.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "上班" => AttendanceStatus::Work,
            "公休日上班" | "周末加班" => AttendanceStatus::WeekendWork,
            "出差" => AttendanceStatus::Travel,
            "请假" | "年假" | "病假" | "事假" => AttendanceStatus::Leave,
            _ => AttendanceStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Work => "WORK",
            AttendanceStatus::WeekendWork => "WEEKEND_WORK",
            AttendanceStatus::Travel => "TRAVEL",
            AttendanceStatus::Leave => "LEAVE",
            AttendanceStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TravelKind {
    Flight,
    Hotel,
    Train,
}

impl TravelKind {
    pub const ALL: [TravelKind; 3] = [TravelKind::Flight, TravelKind::Hotel, TravelKind::Train];

    pub fn sheet_name(self) -> &'static str {
        match self {
            TravelKind::Flight => SHEET_FLIGHT,
            TravelKind::Hotel => SHEET_HOTEL,
            TravelKind::Train => SHEET_TRAIN,
        }
    }

    /// Storage tag; also the key used in order breakdowns.
    pub fn as_str(self) -> &'static str {
        match self {
            TravelKind::Flight => "flight",
            TravelKind::Hotel => "hotel",
            TravelKind::Train => "train",
        }
    }

    /// Human label, used in anomaly detail strings.
    pub fn label(self) -> &'static str {
        self.sheet_name()
    }

    fn date_column(self) -> &'static str {
        match self {
            TravelKind::Flight => "起飞日期",
            TravelKind::Hotel => "入住日期",
            TravelKind::Train => "出发日期",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub employee_name: String,
    pub department: Vec<String>,
    pub status: AttendanceStatus,
    pub work_hours: f64,
    pub checkout_time: Option<NaiveTime>,
}

#[derive(Debug, Clone)]
pub struct TravelRecord {
    pub kind: TravelKind,
    pub event_date: NaiveDate,
    pub booker_name: String,
    pub traveller_name: String,
    pub department: Vec<String>,
    pub amount: f64,
    pub project_code: Option<String>,
    pub project_name: Option<String>,
    pub advance_days: Option<i64>,
    pub is_over_standard: bool,
    pub over_standard_reason: Option<String>,
}

/// Typed frames for one workbook, plus everything the ingestor needs to
/// shard them: the covered months and the per-row defect warnings.
#[derive(Debug, Default)]
pub struct NormalizedWorkbook {
    pub attendance: Vec<AttendanceRecord>,
    pub travel: Vec<TravelRecord>,
    pub months_covered: BTreeSet<String>,
    pub warnings: Vec<String>,
    pub sheet_names: Vec<String>,
}

/// Parses and cleans the four required sheets. Missing sheets are fatal;
/// defective rows are dropped and reported as warnings.
pub fn load_workbook(path: &Path) -> CostMatrixResult<NormalizedWorkbook> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| CostMatrixError::SourceInvalid(format!("读取 Excel 文件失败: {e}")))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_owned();
    for required in [SHEET_ATTENDANCE, SHEET_FLIGHT, SHEET_HOTEL, SHEET_TRAIN] {
        if !sheet_names.iter().any(|s| s == required) {
            return Err(CostMatrixError::SourceInvalid(format!(
                "缺少工作表: {required}"
            )));
        }
    }

    let mut out = NormalizedWorkbook {
        sheet_names,
        ..Default::default()
    };

    let range = workbook
        .worksheet_range(SHEET_ATTENDANCE)
        .map_err(|e| CostMatrixError::SourceInvalid(format!("{SHEET_ATTENDANCE}: {e}")))?;
    parse_attendance_sheet(&range, &mut out);

    for kind in TravelKind::ALL {
        let range = workbook
            .worksheet_range(kind.sheet_name())
            .map_err(|e| CostMatrixError::SourceInvalid(format!("{}: {e}", kind.sheet_name())))?;
        parse_travel_sheet(kind, &range, &mut out);
    }

    for warning in &out.warnings {
        tracing::warn!("{warning}");
    }

    Ok(out)
}

struct Frame {
    headers: HashMap<String, usize>,
    rows: Vec<Vec<Data>>,
}

impl Frame {
    fn from_range(range: &Range<Data>) -> Self {
        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|header_row| {
                header_row
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, cell)| {
                        cell.as_string()
                            .map(|name| (name.trim().to_string(), idx))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let rows = rows.map(|r| r.to_vec()).collect();
        Self { headers, rows }
    }

    fn cell<'a>(&self, row: &'a [Data], column: &str) -> Option<&'a Data> {
        self.headers.get(column).and_then(|&idx| row.get(idx))
    }

    /// First of the candidate columns that exists in this sheet.
    fn first_column<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .copied()
            .find(|name| self.headers.contains_key(*name))
    }
}

fn parse_attendance_sheet(range: &Range<Data>, out: &mut NormalizedWorkbook) {
    let frame = Frame::from_range(range);

    for (line, row) in frame.rows.iter().enumerate() {
        let Some(name) = frame.cell(row, "姓名").and_then(cell_string) else {
            continue; // padding rows at the bottom of real exports
        };

        let Some(date) = frame.cell(row, "日期").and_then(cell_date) else {
            out.warnings.push(format!(
                "{SHEET_ATTENDANCE} 第{}行: 无法解析日期, 行已跳过",
                line + 2
            ));
            continue;
        };

        let status_label = frame
            .cell(row, "当日状态判断")
            .and_then(cell_string)
            .unwrap_or_default();
        let status = AttendanceStatus::from_label(&status_label);
        if status == AttendanceStatus::Unknown && !status_label.is_empty() {
            out.warnings.push(format!(
                "{SHEET_ATTENDANCE} 第{}行: 未知考勤状态 \"{status_label}\"",
                line + 2
            ));
        }

        let department = frame
            .cell(row, "部门")
            .and_then(cell_string)
            .map(|raw| split_department(&raw))
            .unwrap_or_else(|| vec![UNKNOWN_DEPARTMENT.to_string()]);

        let work_hours = frame
            .cell(row, "工时")
            .map(cell_number)
            .unwrap_or(0.0)
            .max(0.0);

        let checkout_time = frame.cell(row, "最晚打卡时间").and_then(cell_time);

        out.months_covered.insert(month_of(date));
        out.attendance.push(AttendanceRecord {
            date,
            employee_name: name,
            department,
            status,
            work_hours,
            checkout_time,
        });
    }
}

fn parse_travel_sheet(kind: TravelKind, range: &Range<Data>, out: &mut NormalizedWorkbook) {
    let frame = Frame::from_range(range);
    let sheet = kind.sheet_name();

    let date_column = frame
        .first_column(&[kind.date_column(), "出发日期", "订单日期"])
        .unwrap_or_else(|| kind.date_column());
    let amount_column = frame.first_column(&["授信金额", "金额"]).unwrap_or("金额");
    // the over-standard reason header varies between monthly templates
    let over_reason_column = frame
        .first_column(&["超标类型", "超标项", "超标项目", "超标类别", "超标选项"])
        .unwrap_or("超标类型");

    for (line, row) in frame.rows.iter().enumerate() {
        let booker = frame.cell(row, "预订人姓名").and_then(cell_string);
        let traveller = frame.cell(row, "差旅人员姓名").and_then(cell_string);
        let (booker, traveller) = match (booker, traveller) {
            (Some(b), Some(t)) => (b, t),
            (Some(b), None) => (b.clone(), b),
            (None, Some(t)) => (t.clone(), t),
            (None, None) => continue,
        };

        let Some(event_date) = frame.cell(row, date_column).and_then(cell_date) else {
            out.warnings.push(format!(
                "{sheet} 第{}行: 无法解析{date_column}, 行已跳过",
                line + 2
            ));
            continue;
        };

        let department = frame
            .cell(row, "部门")
            .and_then(cell_string)
            .map(|raw| split_department(&raw))
            .unwrap_or_else(|| vec![UNKNOWN_DEPARTMENT.to_string()]);

        let amount = frame
            .cell(row, amount_column)
            .map(cell_number)
            .unwrap_or(0.0)
            .max(0.0);

        let (project_code, project_name) = frame
            .cell(row, "项目")
            .and_then(cell_string)
            .map(|raw| parse_project_field(&raw))
            .unwrap_or((None, None));

        let advance_days = frame.cell(row, "提前预定天数").and_then(cell_i64);

        let over_reason = frame.cell(row, over_reason_column).and_then(cell_string);
        let over_flag = frame
            .cell(row, "是否超标")
            .and_then(cell_string)
            .map(|s| is_yes(&s))
            .unwrap_or(false);
        let is_over_standard =
            over_flag || is_over_standard_reason(kind, over_reason.as_deref().unwrap_or(""));

        out.months_covered.insert(month_of(event_date));
        out.travel.push(TravelRecord {
            kind,
            event_date,
            booker_name: booker,
            traveller_name: traveller,
            department,
            amount,
            project_code,
            project_name,
            advance_days,
            is_over_standard,
            over_standard_reason: over_reason,
        });
    }
}

/// Splits the collapsed hierarchy string into at most three tokens from
/// the root. An empty path maps to the placeholder department.
pub fn split_department(raw: &str) -> Vec<String> {
    let mut tokens: Vec<String> = raw
        .split(['/', '\\', '-', '>'])
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tokens.truncate(3);
    if tokens.is_empty() {
        tokens.push(UNKNOWN_DEPARTMENT.to_string());
    }
    tokens
}

/// (level1, level2, level3) columns for a normalised path.
pub fn department_levels(path: &[String]) -> (String, Option<String>, Option<String>) {
    (
        path.first()
            .cloned()
            .unwrap_or_else(|| UNKNOWN_DEPARTMENT.to_string()),
        path.get(1).cloned(),
        path.get(2).cloned(),
    )
}

/// `"05010013 市场-整星..."` -> (code, name). Strings without a leading
/// digit run keep the whole text as the name.
pub fn parse_project_field(raw: &str) -> (Option<String>, Option<String>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (None, None);
    }
    if let Some(caps) = PROJECT_FIELD.captures(trimmed) {
        let code = caps.get(1).map(|m| m.as_str().to_string());
        let name = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        return (code, name);
    }
    (None, Some(trimmed.to_string()))
}

/// Currency-formatted strings: `¥1,234.56`, `1,234.56`, `1234`, blank.
/// Anything unparseable is zero, never an error.
pub fn parse_money_str(raw: &str) -> f64 {
    let cleaned = raw
        .trim()
        .trim_start_matches(['¥', '￥'])
        .replace([',', '，'], "");
    cleaned.trim().parse::<f64>().unwrap_or(0.0)
}

/// ISO, slash and datetime-suffixed date strings.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }
    None
}

pub fn parse_time_str(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(trimmed, format) {
            return Some(time);
        }
    }
    None
}

/// Spreadsheet serial, days since 1899-12-30.
pub(crate) fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    // 9999-12-31 is serial 2958465; below 61 the 1900 leap-year bug bites
    if !(61.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .checked_add_days(chrono::Days::new(serial.trunc() as u64))
}

fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(_) | Data::DateTimeIso(_) => cell.as_date(),
        Data::Float(f) => serial_to_date(*f),
        Data::Int(i) => serial_to_date(*i as f64),
        Data::String(s) => parse_date_str(s),
        _ => None,
    }
}

fn cell_time(cell: &Data) -> Option<NaiveTime> {
    match cell {
        Data::DateTime(_) => cell.as_time(),
        Data::String(s) => parse_time_str(s),
        _ => None,
    }
}

fn cell_string(cell: &Data) -> Option<String> {
    if cell.is_empty() {
        return None;
    }
    cell.as_string()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn cell_number(cell: &Data) -> f64 {
    match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => parse_money_str(s),
        _ => 0.0,
    }
}

fn cell_i64(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) => Some(f.trunc() as i64),
        Data::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// The source workbook writes the flag as 是/否 but templates vary.
pub fn is_yes(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    matches!(trimmed, "是" | "Y" | "YES" | "Yes" | "yes" | "TRUE" | "True" | "true" | "1")
        || trimmed.contains('是')
}

/// Flight rows carry over-standard markers in the reason column even when
/// the yes/no column is absent.
pub fn is_over_standard_reason(kind: TravelKind, reason: &str) -> bool {
    let reason = reason.trim();
    if reason.is_empty() {
        return false;
    }
    match kind {
        TravelKind::Flight => ["超折扣", "超时间", "超标"]
            .iter()
            .any(|k| reason.contains(k)),
        _ => reason.contains('超'),
    }
}
