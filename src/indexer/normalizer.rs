use std::path::Path;

use serde_json::{Map, Value};

use super::document::{CourseFields, Document, Metadata, SourceFamily};
use crate::error::{RagError, Result};

/// Documents read from one source file, plus the records that were dropped.
#[derive(Debug, Default)]
pub struct SourceLoad {
    pub documents: Vec<Document>,
    pub dropped_records: Vec<RagError>,
}

/// Read a source file and normalize every record (or PDF page) in it.
///
/// Fails with [`RagError::Format`] when the file as a whole is not valid for
/// `family`. Individual bad records are dropped and reported in the result.
pub fn load_source(path: &Path, family: SourceFamily) -> Result<SourceLoad> {
    let source_name = source_name(path);
    match family {
        SourceFamily::CatalogPdf => {
            let pages = pdf_extract::extract_text_by_pages(path)
                .map_err(|e| RagError::format(&source_name, format!("failed to extract PDF text: {e}")))?;
            let documents = pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| normalize_pdf_page(&text, i as u32 + 1, &source_name))
                .collect();
            Ok(SourceLoad { documents, dropped_records: Vec::new() })
        }
        SourceFamily::StructuredCourseJson | SourceFamily::LsuVariantJson => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| RagError::format(&source_name, format!("failed to read file: {e}")))?;
            normalize_json_str(&contents, family, &source_name)
        }
    }
}

/// Normalize the contents of a JSON course file (a top-level array of records).
pub fn normalize_json_str(contents: &str, family: SourceFamily, source_name: &str) -> Result<SourceLoad> {
    let value: Value = serde_json::from_str(contents)
        .map_err(|e| RagError::format(source_name, format!("malformed JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(RagError::format(source_name, "expected a JSON array of course records"));
    };

    let mut load = SourceLoad::default();
    for (i, item) in items.iter().enumerate() {
        match normalize_record(item, family, source_name) {
            Ok(doc) => load.documents.push(doc),
            Err(e) => {
                tracing::warn!(source = source_name, record = i, error = %e, "dropping course record");
                load.dropped_records.push(e);
            }
        }
    }
    Ok(load)
}

/// Map one raw JSON record of a course-record family to a [`Document`].
pub fn normalize_record(record: &Value, family: SourceFamily, source_name: &str) -> Result<Document> {
    let Value::Object(fields) = record else {
        return Err(RagError::format(source_name, "course record is not a JSON object"));
    };

    match family {
        SourceFamily::StructuredCourseJson => Ok(structured_course(fields, source_name)),
        SourceFamily::LsuVariantJson => Ok(lsu_course(fields, source_name)),
        SourceFamily::CatalogPdf => Err(RagError::format(
            source_name,
            "catalog PDFs are normalized per page, not per record",
        )),
    }
}

pub fn normalize_pdf_page(text: &str, page: u32, source_name: &str) -> Document {
    let mut metadata = Metadata::new(source_name, SourceFamily::CatalogPdf);
    metadata.page = Some(page);
    Document::new(text, metadata)
}

fn structured_course(fields: &Map<String, Value>, source_name: &str) -> Document {
    let title = field(fields, "title");
    let code = field(fields, "code");
    let department_full = field(fields, "department_full");
    let department_short = field(fields, "department_short");
    let professor = field(fields, "professor");
    let time = field(fields, "time");
    let description = field(fields, "description");
    let attributes = field(fields, "attributes");

    let content = format!(
        "Title: {title}\nCode: {code}\nDepartment: {department_full} ({department_short})\n\
         Professor: {professor}\nTime: {time}\nDescription:\n{description}"
    );

    let mut metadata = Metadata::new(source_name, SourceFamily::StructuredCourseJson);
    metadata.course = Some(CourseFields {
        code,
        title,
        department: department_short,
        professor,
        time,
    });
    metadata.extra.insert("department_full".to_string(), department_full);
    if !attributes.is_empty() {
        metadata.extra.insert("attributes".to_string(), attributes);
    }
    Document::new(content, metadata)
}

fn lsu_course(fields: &Map<String, Value>, source_name: &str) -> Document {
    let dept = field(fields, "Dept");
    let num = field(fields, "Num");
    let name = field(fields, "Name");
    let desc = field(fields, "Desc");
    let reqs = field(fields, "Reqs");
    let university = field(fields, "university_name");

    let content = format!(
        "Department: {dept}\nCourse Number: {num}\nCourse Name: {name}\nDescription:\n{desc}\n\
         Requirements: {reqs}\nUniversity: {university}"
    );

    let mut metadata = Metadata::new(source_name, SourceFamily::LsuVariantJson);
    metadata.course = Some(CourseFields {
        code: format!("{dept} {num}").trim().to_string(),
        title: name,
        department: dept,
        professor: String::new(),
        time: String::new(),
    });
    metadata.extra.insert("course_number".to_string(), num);
    metadata.extra.insert("requirements".to_string(), reqs);
    metadata.extra.insert("university_name".to_string(), university);
    Document::new(content, metadata)
}

/// Render a record field as text. Missing, null and non-scalar values become "".
fn field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
