//! Mô hình dữ liệu lõi cho timeline trạng thái huyết học.

pub mod knowledge;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use knowledge::{
    Bin, BinAxis, ByGender, CrossTable, KnowledgeBase, Lookup, RangeRow, RangeTable,
    RecommendationRow, RecommendationTable, SystemicRow, SystemicTable, TestValidity,
};

/// Giá trị đánh dấu một bản ghi đã bị xóa mềm.
pub const DELETED_SENTINEL: &str = "DELETED";

/// Giới tính dùng để chọn biến thể bảng tra cứu.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// `"female"` (không phân biệt hoa thường) là nữ, mọi giá trị khác mặc định là nam.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("female") {
            Self::Female
        } else {
            Self::Male
        }
    }
}

/// Các xét nghiệm mà engine biết cách diễn giải.
///
/// Tên serde trùng với khóa trong bảng thời hạn hiệu lực.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClinicalTest {
    #[serde(rename = "hemoglobin")]
    Hemoglobin,
    #[serde(rename = "WBC")]
    WhiteCellCount,
    #[serde(rename = "fever")]
    Fever,
    #[serde(rename = "chills")]
    Chills,
    #[serde(rename = "skin-look")]
    SkinLook,
    #[serde(rename = "allergic state")]
    AllergicState,
}

impl ClinicalTest {
    pub const ALL: [ClinicalTest; 6] = [
        ClinicalTest::Hemoglobin,
        ClinicalTest::WhiteCellCount,
        ClinicalTest::Fever,
        ClinicalTest::Chills,
        ClinicalTest::SkinLook,
        ClinicalTest::AllergicState,
    ];

    /// Các chỉ số toàn thân, theo thứ tự chấm điểm cố định.
    pub const SYSTEMIC: [ClinicalTest; 4] = [
        ClinicalTest::Fever,
        ClinicalTest::Chills,
        ClinicalTest::SkinLook,
        ClinicalTest::AllergicState,
    ];

    pub fn loinc(self) -> &'static str {
        match self {
            ClinicalTest::Hemoglobin => "30313-1",
            ClinicalTest::WhiteCellCount => "6690-2",
            ClinicalTest::Fever => "8310-5",
            ClinicalTest::Chills => "75275-8",
            ClinicalTest::SkinLook => "39106-0",
            ClinicalTest::AllergicState => "56840-2",
        }
    }

    /// Tên cấu hình của xét nghiệm.
    pub fn name(self) -> &'static str {
        match self {
            ClinicalTest::Hemoglobin => "hemoglobin",
            ClinicalTest::WhiteCellCount => "WBC",
            ClinicalTest::Fever => "fever",
            ClinicalTest::Chills => "chills",
            ClinicalTest::SkinLook => "skin-look",
            ClinicalTest::AllergicState => "allergic state",
        }
    }

    pub fn from_loinc(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL.into_iter().find(|test| test.loinc() == code)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|test| test.name().eq_ignore_ascii_case(name))
    }

    pub fn is_systemic(self) -> bool {
        Self::SYSTEMIC.contains(&self)
    }
}

impl fmt::Display for ClinicalTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Khóa định danh bệnh nhân (họ tên đầy đủ hoặc mã).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PatientKey(pub String);

impl PatientKey {
    pub fn from_name(first_name: &str, last_name: &str) -> Self {
        Self(format!("{} {}", first_name.trim(), last_name.trim()))
    }
}

impl From<&str> for PatientKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PatientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Giá trị đo: số, nhãn phân loại, hoặc dấu xóa mềm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "String", into = "String")]
pub enum ObservationValue {
    Numeric(f64),
    Categorical(String),
    Deleted,
}

impl ObservationValue {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == DELETED_SENTINEL {
            return Self::Deleted;
        }
        match raw.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Numeric(number),
            _ => Self::Categorical(raw.to_string()),
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Numeric(number) => Some(*number),
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl From<String> for ObservationValue {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for ObservationValue {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<f64> for ObservationValue {
    fn from(value: f64) -> Self {
        Self::Numeric(value)
    }
}

impl From<ObservationValue> for String {
    fn from(value: ObservationValue) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ObservationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(number) => write!(f, "{number}"),
            Self::Categorical(text) => f.write_str(text),
            Self::Deleted => f.write_str(DELETED_SENTINEL),
        }
    }
}

/// Một kết quả xét nghiệm đã được đọc từ kho dữ liệu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub patient: PatientKey,
    pub test_code: String,
    pub value: ObservationValue,
    pub measured_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Observation {
    pub fn test(&self) -> Option<ClinicalTest> {
        ClinicalTest::from_loinc(&self.test_code)
    }

    pub fn is_test(&self, test: ClinicalTest) -> bool {
        self.test_code.trim() == test.loinc()
    }
}

/// Khoảng hiệu lực nửa mở `[anchor - before, anchor + after)` của một kết quả đo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidityWindow {
    pub anchor: DateTime<Utc>,
    pub value: ObservationValue,
    pub hours_before: f64,
    pub hours_after: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ValidityWindow {
    /// `None` khi một trong hai biên vượt quá miền thời gian biểu diễn được.
    pub fn around(
        anchor: DateTime<Utc>,
        value: ObservationValue,
        validity: TestValidity,
    ) -> Option<Self> {
        Some(Self {
            anchor,
            value,
            hours_before: validity.hours_before(),
            hours_after: validity.hours_after(),
            start: anchor.checked_sub_signed(validity.before())?,
            end: anchor.checked_add_signed(validity.after())?,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Phần giao khác rỗng của hai khoảng hiệu lực.
    pub fn overlap(&self, other: &ValidityWindow) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some((start, end))
    }
}

/// Trạng thái của một đoạn timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum SegmentState {
    Resolved(String),
    Unresolved,
}

impl SegmentState {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Resolved(label) => Some(label),
            Self::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl From<&str> for SegmentState {
    fn from(value: &str) -> Self {
        Self::Resolved(value.to_string())
    }
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(label) => f.write_str(label),
            Self::Unresolved => f.write_str("unresolved"),
        }
    }
}

/// Một đoạn nửa mở `[start, end)` của timeline với trạng thái không đổi.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: SegmentState,
}

impl Segment {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, state: SegmentState) -> Self {
        Self { start, end, state }
    }

    /// Kiểm tra bao hàm theo đoạn đóng `[start, end]`, dùng khi tra trạng thái tại một thời điểm.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Mức độc tính toàn thân (1-5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    /// Grade tương ứng với chỉ số cột (bắt đầu từ 0) trong bảng toàn thân.
    pub fn from_column(index: usize) -> Option<Self> {
        u8::try_from(index + 1).ok().and_then(Self::new)
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Nhãn dùng trong bảng khuyến nghị, ví dụ `GRADE 2`.
    pub fn label(self) -> String {
        format!("GRADE {}", self.0)
    }
}

impl TryFrom<u8> for Grade {
    type Error = StateError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| StateError::Parse(format!("Grade ngoài phạm vi: {value}")))
    }
}

impl From<Grade> for u8 {
    fn from(value: Grade) -> Self {
        value.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grade {}", self.0)
    }
}

/// Lỗi chung khi tính trạng thái.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("Chưa cấu hình thời hạn hiệu lực cho xét nghiệm {test}")]
    MissingValidityConfig { test: String },
    #[error("Không đọc được thời điểm đo: {raw}")]
    MalformedTimestamp { raw: String },
    #[error("Bảng {table} không hợp lệ: {reason}")]
    MalformedTable { table: String, reason: String },
    #[error("Chỉnh sửa cấu hình không hợp lệ: {0}")]
    InvalidEdit(String),
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
}
