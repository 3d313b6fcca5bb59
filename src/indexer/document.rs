use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The producer a source file came from. Each family has a fixed field mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFamily {
    StructuredCourseJson,
    LsuVariantJson,
    CatalogPdf,
}

impl SourceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredCourseJson => "structured-course-json",
            Self::LsuVariantJson => "lsu-variant-json",
            Self::CatalogPdf => "catalog-pdf",
        }
    }

    /// Whether documents of this family describe individual courses.
    pub fn is_course_record(&self) -> bool {
        !matches!(self, Self::CatalogPdf)
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Required fields for course-record families. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseFields {
    pub code: String,
    pub title: String,
    pub department: String,
    pub professor: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// File name of the source the document came from.
    pub source: String,
    pub family: SourceFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseFields>,
    /// Family-specific extras, kept sorted for stable prompt rendering.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(source: impl Into<String>, family: SourceFamily) -> Self {
        Self {
            source: source.into(),
            family,
            page: None,
            course: None,
            extra: BTreeMap::new(),
        }
    }

    /// The course code, if this document names one.
    pub fn identifier(&self) -> Option<&str> {
        self.course
            .as_ref()
            .map(|c| c.code.as_str())
            .filter(|code| !code.is_empty())
    }

    /// Flattened `key: value` view in a fixed order: source, page, course fields, extras.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![("source".to_string(), self.source.clone())];
        if let Some(page) = self.page {
            entries.push(("page".to_string(), page.to_string()));
        }
        if let Some(course) = &self.course {
            entries.push(("title".to_string(), course.title.clone()));
            entries.push(("code".to_string(), course.code.clone()));
            entries.push(("department".to_string(), course.department.clone()));
            entries.push(("professor".to_string(), course.professor.clone()));
            entries.push(("time".to_string(), course.time.clone()));
        }
        entries.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        entries
    }
}

/// Normalized text plus metadata. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self { content: content.into(), metadata }
    }
}

/// A document annotated with its retrieval-time similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_ignores_empty_code() {
        let mut meta = Metadata::new("fall.json", SourceFamily::StructuredCourseJson);
        assert_eq!(meta.identifier(), None);

        meta.course = Some(CourseFields::default());
        assert_eq!(meta.identifier(), None);

        meta.course = Some(CourseFields { code: "CSCI0320".into(), ..Default::default() });
        assert_eq!(meta.identifier(), Some("CSCI0320"));
    }

    #[test]
    fn test_entries_order() {
        let mut meta = Metadata::new("bulletin.pdf", SourceFamily::CatalogPdf);
        meta.page = Some(3);
        meta.extra.insert("chunk_index".into(), "1".into());

        let keys: Vec<String> = meta.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["source", "page", "chunk_index"]);
    }

    #[test]
    fn test_family_serde_names() {
        let json = serde_json::to_string(&SourceFamily::LsuVariantJson).unwrap();
        assert_eq!(json, "\"lsu-variant-json\"");
    }
}
