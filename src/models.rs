use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indexer::document::ScoredDocument;

// Chat completions wire types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// Query API types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub body_search: Option<String>,
    #[serde(default)]
    pub filters: CourseFilters,
}

/// Post-retrieval filters over the returned courses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseFilters {
    /// Keep only courses from these source files.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Case-insensitive department prefix, e.g. "CSCI".
    #[serde(default)]
    pub department: Option<String>,
    /// Case-insensitive substring of the meeting time, e.g. "TTh".
    #[serde(default)]
    pub meeting_day: Option<String>,
    #[serde(default)]
    pub sort_by_score: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CourseFilters {
    pub fn apply(&self, mut courses: Vec<RetrievedCourse>) -> Vec<RetrievedCourse> {
        if !self.sources.is_empty() {
            courses.retain(|c| self.sources.iter().any(|s| *s == c.source));
        }
        if let Some(dept) = self.department.as_deref().filter(|d| !d.is_empty()) {
            let dept = dept.to_lowercase();
            courses.retain(|c| c.department.to_lowercase().starts_with(&dept));
        }
        if let Some(day) = self.meeting_day.as_deref().filter(|d| !d.is_empty()) {
            let day = day.to_lowercase();
            courses.retain(|c| c.time.to_lowercase().contains(&day));
        }
        if self.sort_by_score {
            courses.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }
        if let Some(limit) = self.limit {
            courses.truncate(limit);
        }
        courses
    }
}

/// A retrieved course record as returned to API and CLI callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCourse {
    pub source: String,
    pub code: String,
    pub title: String,
    pub department: String,
    pub professor: String,
    pub time: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
    pub content: String,
    pub score: f32,
}

impl RetrievedCourse {
    /// Only documents with a course code become retrieved courses.
    pub fn from_scored(doc: &ScoredDocument) -> Option<Self> {
        let meta = &doc.document.metadata;
        meta.identifier()?;
        let course = meta.course.as_ref()?;
        Some(Self {
            source: meta.source.clone(),
            code: course.code.clone(),
            title: course.title.clone(),
            department: course.department.clone(),
            professor: course.professor.clone(),
            time: course.time.clone(),
            extra: meta.extra.clone(),
            content: doc.document.content.clone(),
            score: doc.score,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub request_id: Uuid,
    pub answer: String,
    pub retrieved_courses: Vec<RetrievedCourse>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateQuery {
    pub labeled_set_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatusResponse {
    pub entries: usize,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub is_rebuilding: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::document::{CourseFields, Document, Metadata, SourceFamily};

    fn scored(source: &str, code: &str, dept: &str, time: &str, score: f32) -> ScoredDocument {
        let mut meta = Metadata::new(source, SourceFamily::StructuredCourseJson);
        meta.course = Some(CourseFields {
            code: code.into(),
            department: dept.into(),
            time: time.into(),
            ..Default::default()
        });
        ScoredDocument { document: Document::new("content", meta), score }
    }

    fn courses() -> Vec<RetrievedCourse> {
        [
            scored("fall_2025_courses.json", "0320", "CSCI", "MWF 10-10:50a", 0.4),
            scored("spring_2026_courses.json", "0100", "MATH", "TTh 1-2:20p", 0.9),
            scored("fall_2025_courses.json", "0220", "CSCI", "TTh 9-10:20a", 0.7),
        ]
        .iter()
        .filter_map(RetrievedCourse::from_scored)
        .collect()
    }

    #[test]
    fn test_from_scored_requires_code() {
        let pdf = ScoredDocument {
            document: Document::new("page", Metadata::new("bulletin.pdf", SourceFamily::CatalogPdf)),
            score: 0.5,
        };
        assert!(RetrievedCourse::from_scored(&pdf).is_none());
        assert!(RetrievedCourse::from_scored(&scored("a.json", "", "CSCI", "", 0.1)).is_none());
    }

    #[test]
    fn test_filters() {
        let filters = CourseFilters {
            department: Some("cs".into()),
            meeting_day: Some("tth".into()),
            ..Default::default()
        };
        let kept = filters.apply(courses());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].code, "0220");

        let filters = CourseFilters {
            sources: vec!["fall_2025_courses.json".into()],
            sort_by_score: true,
            limit: Some(1),
            ..Default::default()
        };
        let kept = filters.apply(courses());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].code, "0220");
    }

    #[test]
    fn test_retrieved_course_flattens_extras() {
        let mut doc = scored("LSU_courses.json", "ACCT 3001", "ACCT", "", 0.2);
        doc.document.metadata.extra.insert("university_name".into(), "LSU".into());
        let course = RetrievedCourse::from_scored(&doc).unwrap();
        let json = serde_json::to_value(&course).unwrap();
        assert_eq!(json["university_name"], "LSU");
        assert_eq!(json["code"], "ACCT 3001");
    }
}
