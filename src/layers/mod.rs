use std::collections::HashMap;

/// One paper discovered for the target venue, keyed by its venue identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperRecord {
    /// Venue identifier, e.g. `2020.acl-main.1` or `P19-1001`.
    pub id: String,
    pub title: Option<String>,
    /// Canonical id in the metadata source (Semantic Scholar `paperId`).
    pub paper_id: Option<String>,
    /// Open-access PDF link, when the source resolved one.
    pub pdf_url: Option<String>,
    pub citations: Option<u64>,
}

impl PaperRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            paper_id: None,
            pdf_url: None,
            citations: None,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("<untitled>")
    }
}

/// Papers found by one fetch run, in order of discovery.
///
/// Identifiers are unique: inserting a record whose id is already present
/// replaces the earlier record but keeps its position.
#[derive(Debug, Default, Clone)]
pub struct FetchResult {
    records: Vec<PaperRecord>,
    index: HashMap<String, usize>,
}

impl FetchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the identifier was not seen before.
    pub fn insert(&mut self, record: PaperRecord) -> bool {
        match self.index.get(&record.id) {
            Some(&pos) => {
                self.records[pos] = record;
                false
            }
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&PaperRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PaperRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    /// Number of records that already carry a PDF link.
    pub fn with_pdf_count(&self) -> usize {
        self.records.iter().filter(|r| r.pdf_url.is_some()).count()
    }
}

impl FromIterator<PaperRecord> for FetchResult {
    fn from_iter<I: IntoIterator<Item = PaperRecord>>(iter: I) -> Self {
        let mut result = Self::new();
        for record in iter {
            result.insert(record);
        }
        result
    }
}

impl<'a> IntoIterator for &'a FetchResult {
    type Item = &'a PaperRecord;
    type IntoIter = std::slice::Iter<'a, PaperRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub mod batch;
pub mod discovery;
pub mod download;
pub mod resolution;
pub mod selection;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str) -> PaperRecord {
        PaperRecord {
            title: Some(title.to_string()),
            ..PaperRecord::new(id)
        }
    }

    #[test]
    fn test_insert_keeps_discovery_order() {
        let mut result = FetchResult::new();
        assert!(result.insert(record("P19-1001", "First")));
        assert!(result.insert(record("2020.acl-main.1", "Second")));
        assert_eq!(result.ids().collect::<Vec<_>>(), vec!["P19-1001", "2020.acl-main.1"]);
    }

    #[test]
    fn test_duplicate_id_replaces_in_place() {
        let mut result = FetchResult::new();
        result.insert(record("A", "old"));
        result.insert(record("B", "other"));
        assert!(!result.insert(record("A", "new")));

        assert_eq!(result.len(), 2);
        assert_eq!(result.get("A").unwrap().display_title(), "new");
        assert_eq!(result.ids().next(), Some("A"));
    }

    #[test]
    fn test_with_pdf_count() {
        let result: FetchResult = vec![
            PaperRecord {
                pdf_url: Some("https://example.org/a.pdf".to_string()),
                ..PaperRecord::new("A")
            },
            PaperRecord::new("B"),
        ]
        .into_iter()
        .collect();
        assert_eq!(result.with_pdf_count(), 1);
        assert_eq!(PaperRecord::new("B").display_title(), "<untitled>");
    }
}
