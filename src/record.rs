use serde::{Deserialize, Serialize};

pub const UNKNOWN_TAG: &str = "Unknown";

/// One student's mark for one subject/exam in one class and batch.
///
/// `(registration_number, class, batch, subject, exam_date)` is the natural
/// key; the store never holds two records with the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub registration_number: String,
    pub student_name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub batch: String,
    pub subject: String,
    pub marks: f64,
    pub grade: String,
    pub exam_date: String,
}

impl ResultRecord {
    /// Builds a record with the grade derived from `marks`.
    pub fn new(
        registration_number: impl Into<String>,
        student_name: impl Into<String>,
        class_name: impl Into<String>,
        batch: impl Into<String>,
        subject: impl Into<String>,
        marks: f64,
        exam_date: impl Into<String>,
    ) -> Self {
        ResultRecord {
            registration_number: registration_number.into(),
            student_name: student_name.into(),
            class_name: class_name.into(),
            batch: batch.into(),
            subject: subject.into(),
            marks,
            grade: grade_for(marks).to_string(),
            exam_date: exam_date.into(),
        }
    }
}

/// Ordered threshold ladder; boundaries are inclusive and evaluated top-down.
const GRADE_LADDER: [(f64, &str); 6] = [
    (80.0, "A+"),
    (70.0, "A"),
    (60.0, "A-"),
    (50.0, "B"),
    (40.0, "C"),
    (33.0, "D"),
];

pub fn grade_for(marks: f64) -> &'static str {
    for (min, grade) in GRADE_LADDER {
        if marks >= min {
            return grade;
        }
    }
    "F"
}
