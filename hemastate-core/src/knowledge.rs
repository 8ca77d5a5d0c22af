//! Bảng tri thức: bảng khoảng giá trị, bảng chéo, bảng toàn thân, bảng khuyến nghị
//! và thời hạn hiệu lực của từng xét nghiệm.
//!
//! Mọi bảng được kiểm tra khi khởi tạo (kể cả khi deserialize), nên một
//! `KnowledgeBase` đã tồn tại thì luôn hợp lệ.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{ClinicalTest, Gender, Grade, ObservationValue, StateError};

/// Giới hạn trên của thời hạn hiệu lực (10 năm), đủ xa để phép cộng thời gian không tràn.
const MAX_VALIDITY_HOURS: f64 = 24.0 * 366.0 * 10.0;

/// Một bin nửa mở `[low, high)`; `high = None` nghĩa là không giới hạn trên.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bin {
    pub low: f64,
    #[serde(default)]
    pub high: Option<f64>,
}

impl Bin {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low,
            high: Some(high),
        }
    }

    pub fn unbounded(low: f64) -> Self {
        Self { low, high: None }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && self.high.map_or(true, |high| value < high)
    }
}

/// Kết quả tra cứu bảng: một nhãn trạng thái hoặc "không xác định".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    State(&'a str),
    Unresolved,
}

impl<'a> Lookup<'a> {
    pub fn state(self) -> Option<&'a str> {
        match self {
            Lookup::State(label) => Some(label),
            Lookup::Unresolved => None,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, Lookup::State(_))
    }
}

fn malformed(table: &str, reason: impl Into<String>) -> StateError {
    StateError::MalformedTable {
        table: table.to_string(),
        reason: reason.into(),
    }
}

fn check_bins(bins: &[Bin]) -> Result<(), String> {
    let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
        return Err("không có bin nào".to_string());
    };
    if first.low != 0.0 {
        return Err(format!("bin đầu tiên phải bắt đầu từ 0, nhận {}", first.low));
    }
    if last.high.is_some() {
        return Err("bin cuối cùng phải không giới hạn trên".to_string());
    }

    for (index, bin) in bins.iter().enumerate() {
        if !bin.low.is_finite() {
            return Err(format!("bin {index} có cận dưới không hữu hạn"));
        }
        let Some(next) = bins.get(index + 1) else {
            continue;
        };
        let Some(high) = bin.high else {
            return Err(format!("chỉ bin cuối được phép không giới hạn (bin {index})"));
        };
        if !high.is_finite() || high <= bin.low {
            return Err(format!("bin {index} không tăng dần: [{}, {high})", bin.low));
        }
        if high != next.low {
            return Err(format!(
                "bin {index} và {} không liền nhau: {high} != {}",
                index + 1,
                next.low
            ));
        }
    }
    Ok(())
}

/// Một trục gồm các bin liền nhau, tăng dần, phủ `[0, +∞)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<Bin>", into = "Vec<Bin>")]
pub struct BinAxis {
    bins: Vec<Bin>,
}

impl BinAxis {
    pub fn new(bins: Vec<Bin>) -> Result<Self, StateError> {
        check_bins(&bins).map_err(|reason| malformed("trục bin", reason))?;
        Ok(Self { bins })
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Chỉ số bin chứa `value`, hoặc `None` nếu giá trị nằm ngoài mọi bin (âm, NaN).
    pub fn locate(&self, value: f64) -> Option<usize> {
        let index = self
            .bins
            .partition_point(|bin| bin.low <= value)
            .checked_sub(1)?;
        self.bins[index].contains(value).then_some(index)
    }
}

impl TryFrom<Vec<Bin>> for BinAxis {
    type Error = StateError;

    fn try_from(bins: Vec<Bin>) -> Result<Self, Self::Error> {
        Self::new(bins)
    }
}

impl From<BinAxis> for Vec<Bin> {
    fn from(axis: BinAxis) -> Self {
        axis.bins
    }
}

/// Một dòng của bảng khoảng giá trị một chiều.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RangeRow {
    #[serde(alias = "low_range")]
    pub low: f64,
    #[serde(default, alias = "high_range")]
    pub high: Option<f64>,
    pub state: String,
}

impl RangeRow {
    pub fn new(low: f64, high: Option<f64>, state: &str) -> Self {
        Self {
            low,
            high,
            state: state.to_string(),
        }
    }
}

/// Bảng khoảng giá trị một chiều: mỗi bin ánh xạ tới một nhãn trạng thái.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<RangeRow>", into = "Vec<RangeRow>")]
pub struct RangeTable {
    axis: BinAxis,
    states: Vec<String>,
}

impl RangeTable {
    pub fn new(rows: Vec<RangeRow>) -> Result<Self, StateError> {
        let bins = rows
            .iter()
            .map(|row| Bin {
                low: row.low,
                high: row.high,
            })
            .collect::<Vec<_>>();
        check_bins(&bins).map_err(|reason| malformed("khoảng giá trị", reason))?;
        Ok(Self {
            axis: BinAxis { bins },
            states: rows.into_iter().map(|row| row.state).collect(),
        })
    }

    pub fn resolve(&self, value: f64) -> Lookup<'_> {
        match self.axis.locate(value) {
            Some(index) => Lookup::State(&self.states[index]),
            None => Lookup::Unresolved,
        }
    }

    pub fn rows(&self) -> Vec<RangeRow> {
        self.axis
            .bins
            .iter()
            .zip(&self.states)
            .map(|(bin, state)| RangeRow {
                low: bin.low,
                high: bin.high,
                state: state.clone(),
            })
            .collect()
    }
}

impl TryFrom<Vec<RangeRow>> for RangeTable {
    type Error = StateError;

    fn try_from(rows: Vec<RangeRow>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<RangeTable> for Vec<RangeRow> {
    fn from(table: RangeTable) -> Self {
        table.rows()
    }
}

#[derive(Deserialize)]
struct RawCrossTable {
    rows: BinAxis,
    columns: BinAxis,
    cells: Vec<Vec<String>>,
}

/// Bảng chéo hai chiều: hàng theo WBC, cột theo hemoglobin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawCrossTable")]
pub struct CrossTable {
    rows: BinAxis,
    columns: BinAxis,
    cells: Vec<Vec<String>>,
}

impl CrossTable {
    pub fn new(rows: Vec<Bin>, columns: Vec<Bin>, cells: Vec<Vec<String>>) -> Result<Self, StateError> {
        let rows = BinAxis::new(rows)?;
        let columns = BinAxis::new(columns)?;
        Self::from_axes(rows, columns, cells)
    }

    fn from_axes(
        rows: BinAxis,
        columns: BinAxis,
        cells: Vec<Vec<String>>,
    ) -> Result<Self, StateError> {
        if cells.len() != rows.len() {
            return Err(malformed(
                "bảng chéo",
                format!("có {} hàng ô nhưng trục hàng có {} bin", cells.len(), rows.len()),
            ));
        }
        if let Some((index, row)) = cells
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(malformed(
                "bảng chéo",
                format!(
                    "hàng {index} có {} ô nhưng trục cột có {} bin",
                    row.len(),
                    columns.len()
                ),
            ));
        }
        Ok(Self {
            rows,
            columns,
            cells,
        })
    }

    pub fn resolve(&self, row_value: f64, column_value: f64) -> Lookup<'_> {
        match (self.rows.locate(row_value), self.columns.locate(column_value)) {
            (Some(row), Some(column)) => Lookup::State(&self.cells[row][column]),
            _ => Lookup::Unresolved,
        }
    }

    pub fn row_axis(&self) -> &BinAxis {
        &self.rows
    }

    pub fn column_axis(&self) -> &BinAxis {
        &self.columns
    }
}

impl TryFrom<RawCrossTable> for CrossTable {
    type Error = StateError;

    fn try_from(raw: RawCrossTable) -> Result<Self, Self::Error> {
        Self::from_axes(raw.rows, raw.columns, raw.cells)
    }
}

/// Một hàng của bảng toàn thân: các giá trị theo mức độ nặng tăng dần.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemicRow {
    pub indicator: ClinicalTest,
    pub values: Vec<String>,
}

impl SystemicRow {
    pub fn new(indicator: ClinicalTest, values: &[&str]) -> Self {
        Self {
            indicator,
            values: values.iter().map(|value| value.to_string()).collect(),
        }
    }
}

/// Bảng toàn thân: chỉ số cột của một giá trị chính là hạng độ nặng.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<SystemicRow>", into = "Vec<SystemicRow>")]
pub struct SystemicTable {
    rows: Vec<SystemicRow>,
}

impl SystemicTable {
    pub fn new(rows: Vec<SystemicRow>) -> Result<Self, StateError> {
        for (index, row) in rows.iter().enumerate() {
            if !row.indicator.is_systemic() {
                return Err(malformed(
                    "toàn thân",
                    format!("{} không phải chỉ số toàn thân", row.indicator),
                ));
            }
            if rows[..index].iter().any(|other| other.indicator == row.indicator) {
                return Err(malformed(
                    "toàn thân",
                    format!("chỉ số {} bị lặp", row.indicator),
                ));
            }
            if row.values.is_empty() || row.values.len() > usize::from(Grade::MAX) {
                return Err(malformed(
                    "toàn thân",
                    format!(
                        "chỉ số {} có {} cột, cần từ 1 đến {}",
                        row.indicator,
                        row.values.len(),
                        Grade::MAX
                    ),
                ));
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[SystemicRow] {
        &self.rows
    }

    pub fn row(&self, indicator: ClinicalTest) -> Option<&SystemicRow> {
        self.rows.iter().find(|row| row.indicator == indicator)
    }

    /// Chỉ số cột đầu tiên (từ trái sang) khớp với giá trị quan sát.
    pub fn severity_index(&self, indicator: ClinicalTest, value: &ObservationValue) -> Option<usize> {
        self.row(indicator)?
            .values
            .iter()
            .position(|cell| cell_matches(cell, value))
    }

    fn set_value(&mut self, indicator: ClinicalTest, grade: Grade, value: String) -> Result<(), StateError> {
        let row = self
            .rows
            .iter_mut()
            .find(|row| row.indicator == indicator)
            .ok_or_else(|| StateError::InvalidEdit(format!("không có chỉ số {indicator}")))?;
        let column = usize::from(grade.level()) - 1;
        let cell = row.values.get_mut(column).ok_or_else(|| {
            StateError::InvalidEdit(format!("chỉ số {indicator} không có cột {grade}"))
        })?;
        *cell = value;
        Ok(())
    }
}

impl TryFrom<Vec<SystemicRow>> for SystemicTable {
    type Error = StateError;

    fn try_from(rows: Vec<SystemicRow>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<SystemicTable> for Vec<SystemicRow> {
    fn from(table: SystemicTable) -> Self {
        table.rows
    }
}

/// Một ô khớp khi trùng văn bản, hoặc (với giá trị số) khi là số bằng nhau,
/// khoảng `low-high` nửa mở, hay khoảng mở `low+`.
fn cell_matches(cell: &str, value: &ObservationValue) -> bool {
    let cell = cell.trim();
    if cell == value.to_string() {
        return true;
    }
    let Some(number) = value.as_numeric() else {
        return false;
    };

    if let Some(low) = cell.strip_suffix('+') {
        return parse_bound(low).is_some_and(|low| number >= low);
    }
    if let Ok(exact) = cell.parse::<f64>() {
        return exact == number;
    }
    match cell.split_once('-') {
        Some((low, high)) => match (parse_bound(low), parse_bound(high)) {
            (Some(low), Some(high)) => low <= number && number < high,
            _ => false,
        },
        None => false,
    }
}

fn parse_bound(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|bound| bound.is_finite())
}

/// Một dòng khuyến nghị điều trị.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRow {
    #[serde(alias = "Hemoglobinstate")]
    pub hemoglobin_state: String,
    #[serde(alias = "Hematologicalstate")]
    pub hematological_state: String,
    #[serde(alias = "Systematic Toxicity")]
    pub toxicity: String,
    #[serde(alias = "Recommendation")]
    pub recommendation: String,
}

impl RecommendationRow {
    pub fn new(hemoglobin_state: &str, hematological_state: &str, grade: u8, recommendation: &str) -> Self {
        Self {
            hemoglobin_state: hemoglobin_state.to_string(),
            hematological_state: hematological_state.to_string(),
            toxicity: format!("GRADE {grade}"),
            recommendation: recommendation.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RecommendationTable {
    pub rows: Vec<RecommendationRow>,
}

impl RecommendationTable {
    /// Dòng đầu tiên khớp chính xác cả ba khóa.
    pub fn find(&self, hemoglobin_state: &str, hematological_state: &str, grade: Grade) -> Option<&str> {
        let toxicity = grade.label();
        self.rows
            .iter()
            .find(|row| {
                row.hemoglobin_state == hemoglobin_state
                    && row.hematological_state == hematological_state
                    && row.toxicity == toxicity
            })
            .map(|row| row.recommendation.as_str())
    }
}

#[derive(Deserialize)]
struct RawTestValidity {
    #[serde(alias = "good-before")]
    hours_before: f64,
    #[serde(alias = "good-after")]
    hours_after: f64,
}

/// Thời hạn hiệu lực (giờ) trước và sau thời điểm đo.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawTestValidity")]
pub struct TestValidity {
    hours_before: f64,
    hours_after: f64,
}

impl TestValidity {
    pub fn new(hours_before: f64, hours_after: f64) -> Result<Self, StateError> {
        for hours in [hours_before, hours_after] {
            if !(0.0..=MAX_VALIDITY_HOURS).contains(&hours) {
                return Err(StateError::InvalidEdit(format!(
                    "thời hạn hiệu lực phải nằm trong [0, {MAX_VALIDITY_HOURS}] giờ, nhận {hours}"
                )));
            }
        }
        Ok(Self {
            hours_before,
            hours_after,
        })
    }

    pub fn hours_before(&self) -> f64 {
        self.hours_before
    }

    pub fn hours_after(&self) -> f64 {
        self.hours_after
    }

    pub fn before(&self) -> Duration {
        hours_to_duration(self.hours_before)
    }

    pub fn after(&self) -> Duration {
        hours_to_duration(self.hours_after)
    }
}

impl TryFrom<RawTestValidity> for TestValidity {
    type Error = StateError;

    fn try_from(raw: RawTestValidity) -> Result<Self, Self::Error> {
        Self::new(raw.hours_before, raw.hours_after)
    }
}

fn hours_to_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Cặp bảng theo giới tính.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ByGender<T> {
    pub male: T,
    pub female: T,
}

impl<T> ByGender<T> {
    pub fn get(&self, gender: Gender) -> &T {
        match gender {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
        }
    }
}

/// Ảnh chụp bất biến, có phiên bản, của toàn bộ bảng tri thức.
///
/// Mỗi lần chỉnh sửa trả về một bản mới với `version` tăng lên; bản cũ không đổi.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBase {
    #[serde(default)]
    version: u64,
    hemoglobin: ByGender<RangeTable>,
    hematological: ByGender<CrossTable>,
    systemic: SystemicTable,
    test_validity: BTreeMap<ClinicalTest, TestValidity>,
    recommendations: ByGender<RecommendationTable>,
}

impl KnowledgeBase {
    pub fn new(
        hemoglobin: ByGender<RangeTable>,
        hematological: ByGender<CrossTable>,
        systemic: SystemicTable,
        test_validity: BTreeMap<ClinicalTest, TestValidity>,
        recommendations: ByGender<RecommendationTable>,
    ) -> Self {
        Self {
            version: 0,
            hemoglobin,
            hematological,
            systemic,
            test_validity,
            recommendations,
        }
    }

    /// Bộ bảng mặc định đi kèm hệ thống.
    pub fn baseline() -> Self {
        baseline::knowledge_base()
    }

    pub fn from_json_str(json: &str) -> Result<Self, StateError> {
        serde_json::from_str(json).map_err(|err| StateError::Parse(err.to_string()))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn hemoglobin_table(&self, gender: Gender) -> &RangeTable {
        self.hemoglobin.get(gender)
    }

    pub fn hematological_table(&self, gender: Gender) -> &CrossTable {
        self.hematological.get(gender)
    }

    pub fn systemic_table(&self) -> &SystemicTable {
        &self.systemic
    }

    pub fn recommendations(&self, gender: Gender) -> &RecommendationTable {
        self.recommendations.get(gender)
    }

    pub fn test_validity(&self, test: ClinicalTest) -> Result<TestValidity, StateError> {
        self.test_validity
            .get(&test)
            .copied()
            .ok_or_else(|| StateError::MissingValidityConfig {
                test: test.name().to_string(),
            })
    }

    pub fn with_test_validity(
        &self,
        test: ClinicalTest,
        hours_before: f64,
        hours_after: f64,
    ) -> Result<Self, StateError> {
        let validity = TestValidity::new(hours_before, hours_after)?;
        let mut next = self.next_version();
        next.test_validity.insert(test, validity);
        Ok(next)
    }

    pub fn without_test_validity(&self, test: ClinicalTest) -> Self {
        let mut next = self.next_version();
        next.test_validity.remove(&test);
        next
    }

    pub fn with_systemic_value(
        &self,
        indicator: ClinicalTest,
        grade: Grade,
        value: impl Into<String>,
    ) -> Result<Self, StateError> {
        let mut next = self.next_version();
        next.systemic.set_value(indicator, grade, value.into())?;
        Ok(next)
    }

    /// Bỏ cấu hình hiện tại và nạp lại bộ bảng mặc định.
    pub fn reset_to_baseline(&self) -> Self {
        Self {
            version: self.version + 1,
            ..Self::baseline()
        }
    }

    fn next_version(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::baseline()
    }
}

mod baseline {
    use super::*;

    pub(super) fn knowledge_base() -> KnowledgeBase {
        KnowledgeBase::new(
            ByGender {
                male: hemoglobin(&[9.0, 11.0, 13.0, 16.0], "Polyhemia"),
                female: hemoglobin(&[8.0, 10.0, 12.0, 14.0], "Polycytemia"),
            },
            ByGender {
                male: hematological(&[9.0, 11.0, 13.0, 16.0]),
                female: hematological(&[8.0, 10.0, 12.0, 14.0]),
            },
            systemic(),
            test_validity(),
            ByGender {
                male: male_recommendations(),
                female: female_recommendations(),
            },
        )
    }

    fn axis(cuts: &[f64]) -> Vec<Bin> {
        let mut low = 0.0;
        let mut bins = Vec::with_capacity(cuts.len() + 1);
        for &cut in cuts {
            bins.push(Bin::new(low, cut));
            low = cut;
        }
        bins.push(Bin::unbounded(low));
        bins
    }

    fn hemoglobin(cuts: &[f64], top_state: &str) -> RangeTable {
        let states = [
            "Severe Anemia",
            "Moderate Anemia",
            "Mild Anemia",
            "Normal Hemoglobin",
            top_state,
        ];
        RangeTable {
            axis: BinAxis { bins: axis(cuts) },
            states: states.iter().map(|state| state.to_string()).collect(),
        }
    }

    fn hematological(hemoglobin_cuts: &[f64]) -> CrossTable {
        let cells = [
            [
                "Pancytopenia",
                "Pancytopenia",
                "Pancytopenia",
                "Leukopenia",
                "Suspected Polycytemia Vera",
            ],
            ["Anemia", "Anemia", "Anemia", "Normal", "Polyhemia"],
            [
                "Suspected Leukemia",
                "Suspected Leukemia",
                "Suspected Leukemia",
                "Leukemoid reaction",
                "Suspected Polycytemia Vera",
            ],
        ];
        CrossTable {
            rows: BinAxis {
                bins: axis(&[4000.0, 10000.0]),
            },
            columns: BinAxis {
                bins: axis(hemoglobin_cuts),
            },
            cells: cells
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    fn systemic() -> SystemicTable {
        SystemicTable {
            rows: vec![
                SystemicRow::new(
                    ClinicalTest::Fever,
                    &["0-38.5", "38.5-40.0", "40.0+", "40.0"],
                ),
                SystemicRow::new(ClinicalTest::Chills, &["None", "Shaking", "Rigor", "Rigor"]),
                SystemicRow::new(
                    ClinicalTest::SkinLook,
                    &["Erythema", "Vesiculation", "Desquamation", "Exfoliation"],
                ),
                SystemicRow::new(
                    ClinicalTest::AllergicState,
                    &[
                        "Edema",
                        "Bronchospasm",
                        "Sever-Bronchospasm",
                        "Anaphylactic-Shock",
                    ],
                ),
            ],
        }
    }

    fn test_validity() -> BTreeMap<ClinicalTest, TestValidity> {
        ClinicalTest::ALL
            .into_iter()
            .map(|test| {
                let hours = match test {
                    ClinicalTest::WhiteCellCount => 5.0,
                    _ => 3.0,
                };
                (
                    test,
                    TestValidity {
                        hours_before: hours,
                        hours_after: hours,
                    },
                )
            })
            .collect()
    }

    fn male_recommendations() -> RecommendationTable {
        RecommendationTable {
            rows: vec![
                RecommendationRow::new("Severe Anemia", "Pancytopenia", 1, "Measure BP once a week"),
                RecommendationRow::new(
                    "Moderate Anemia",
                    "Anemia",
                    2,
                    "Measure BP every 3 days. Give aspirin 5g twice a week",
                ),
                RecommendationRow::new(
                    "Mild Anemia",
                    "Suspected Leukemia",
                    3,
                    "Measure BP every day, Give aspirin 15g every day. Diet consultation",
                ),
                RecommendationRow::new(
                    "Normal Hemoglobin",
                    "Leukemoid reaction",
                    4,
                    "Measure BP twice a day. Give aspirin 15g every day. Exercise consultation. Diet consultation",
                ),
                RecommendationRow::new(
                    "Polyhemia",
                    "Suspected Polycytemia Vera",
                    4,
                    "Measure BP every hour. Give 1 gr magnesium every hour. Exercise consultation. Call family",
                ),
            ],
        }
    }

    fn female_recommendations() -> RecommendationTable {
        RecommendationTable {
            rows: vec![
                RecommendationRow::new("Severe Anemia", "Pancytopenia", 1, "Measure BP every 3 days"),
                RecommendationRow::new(
                    "Moderate Anemia",
                    "Anemia",
                    2,
                    "Measure BP every 3 days and Give Celectone 2g twice a day for two days drug treatment",
                ),
                RecommendationRow::new(
                    "Mild Anemia",
                    "Suspected Leukemia",
                    3,
                    "Measure BP every day and Give 1 gr magnesium every 3 hours. Diet consultation",
                ),
                RecommendationRow::new(
                    "Normal Hemoglobin",
                    "Leukemoid reaction",
                    4,
                    "Measure BP twice a day, Give 1 gr magnesium every hour. Exercise consultation. Diet consultation",
                ),
                RecommendationRow::new(
                    "Polyhemia",
                    "Suspected Polycytemia Vera",
                    4,
                    "Measure BP every hour. Give 1 gr magnesium every hour. Exercise consultation. Call help",
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_table_resolves_half_open_bins() {
        let kb = KnowledgeBase::baseline();
        let table = kb.hemoglobin_table(Gender::Female);
        assert_eq!(table.resolve(7.99), Lookup::State("Severe Anemia"));
        assert_eq!(table.resolve(8.0), Lookup::State("Moderate Anemia"));
        assert_eq!(table.resolve(14.0), Lookup::State("Polycytemia"));
        assert_eq!(table.resolve(1e9), Lookup::State("Polycytemia"));
        assert_eq!(table.resolve(-0.1), Lookup::Unresolved);
        assert_eq!(table.resolve(f64::NAN), Lookup::Unresolved);
    }

    #[test]
    fn cross_table_resolves_both_axes() {
        let kb = KnowledgeBase::baseline();
        let table = kb.hematological_table(Gender::Female);
        assert_eq!(table.resolve(5000.0, 14.1), Lookup::State("Polyhemia"));
        assert_eq!(table.resolve(3500.0, 7.5), Lookup::State("Pancytopenia"));
        assert_eq!(table.resolve(10000.0, 13.0), Lookup::State("Leukemoid reaction"));
        assert_eq!(table.resolve(-1.0, 13.0), Lookup::Unresolved);
        assert_eq!(table.resolve(5000.0, -1.0), Lookup::Unresolved);
    }

    #[test]
    fn range_table_rejects_non_monotonic_bins() {
        let err = RangeTable::new(vec![
            RangeRow::new(0.0, Some(9.0), "A"),
            RangeRow::new(9.0, Some(8.0), "B"),
            RangeRow::new(8.0, None, "C"),
        ])
        .unwrap_err();
        assert!(matches!(err, StateError::MalformedTable { .. }));

        let gap = RangeTable::new(vec![
            RangeRow::new(0.0, Some(9.0), "A"),
            RangeRow::new(10.0, None, "B"),
        ]);
        assert!(gap.is_err());

        let bounded_top = RangeTable::new(vec![RangeRow::new(0.0, Some(9.0), "A")]);
        assert!(bounded_top.is_err());

        assert!(RangeTable::new(Vec::new()).is_err());
    }

    #[test]
    fn cross_table_rejects_ragged_cells() {
        let err = CrossTable::new(
            vec![Bin::unbounded(0.0)],
            vec![Bin::new(0.0, 1.0), Bin::unbounded(1.0)],
            vec![vec!["only one".to_string()]],
        )
        .unwrap_err();
        assert!(matches!(err, StateError::MalformedTable { .. }));
    }

    #[test]
    fn systemic_cells_match_text_and_numeric_ranges() {
        let kb = KnowledgeBase::baseline();
        let table = kb.systemic_table();
        let fever = |raw: &str| table.severity_index(ClinicalTest::Fever, &ObservationValue::parse(raw));
        assert_eq!(fever("36.5"), Some(0));
        assert_eq!(fever("38.5"), Some(1));
        assert_eq!(fever("39.0"), Some(1));
        assert_eq!(fever("40.0"), Some(2));
        assert_eq!(fever("-3"), None);
        assert_eq!(fever("hot"), None);

        let chills = table.severity_index(ClinicalTest::Chills, &ObservationValue::parse("Rigor"));
        assert_eq!(chills, Some(2));
        let unknown = table.severity_index(ClinicalTest::SkinLook, &ObservationValue::parse("Pale"));
        assert_eq!(unknown, None);
    }

    #[test]
    fn edits_return_new_versions_and_reset_reloads_baseline() {
        let kb = KnowledgeBase::baseline();
        let edited = kb
            .with_test_validity(ClinicalTest::Hemoglobin, 12.0, 1.5)
            .unwrap();
        assert_eq!(edited.version(), kb.version() + 1);
        assert_eq!(
            edited.test_validity(ClinicalTest::Hemoglobin).unwrap().hours_before(),
            12.0
        );
        assert_eq!(kb.test_validity(ClinicalTest::Hemoglobin).unwrap().hours_before(), 3.0);

        let relabeled = edited
            .with_systemic_value(ClinicalTest::Chills, Grade::new(1).unwrap(), "Mild")
            .unwrap();
        assert_eq!(relabeled.systemic_table().row(ClinicalTest::Chills).unwrap().values[0], "Mild");
        assert!(edited
            .with_systemic_value(ClinicalTest::Chills, Grade::new(5).unwrap(), "x")
            .is_err());
        assert!(kb.with_test_validity(ClinicalTest::Fever, -1.0, 1.0).is_err());

        let reset = relabeled.reset_to_baseline();
        assert_eq!(reset.version(), relabeled.version() + 1);
        assert_eq!(reset.systemic_table(), KnowledgeBase::baseline().systemic_table());
    }

    #[test]
    fn missing_validity_is_reported() {
        let kb = KnowledgeBase::baseline().without_test_validity(ClinicalTest::Fever);
        assert_eq!(
            kb.test_validity(ClinicalTest::Fever),
            Err(StateError::MissingValidityConfig {
                test: "fever".to_string()
            })
        );
    }

    #[test]
    fn knowledge_base_round_trips_through_json() {
        let kb = KnowledgeBase::baseline();
        let json = serde_json::to_string(&kb).expect("Không serialize được bảng tri thức");
        let loaded = KnowledgeBase::from_json_str(&json).expect("Không đọc lại được bảng tri thức");
        assert_eq!(loaded, kb);
    }

    #[test]
    fn loading_rejects_malformed_tables() {
        let kb = KnowledgeBase::baseline();
        let mut value = serde_json::to_value(&kb).unwrap();
        value["hemoglobin"]["male"][1]["low"] = serde_json::json!(99.0);
        let err = KnowledgeBase::from_json_str(&value.to_string()).unwrap_err();
        assert!(matches!(err, StateError::Parse(_)));
    }
}
