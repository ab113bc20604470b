use url::Url;

use crate::config::FileNaming;
use crate::layers::PaperRecord;

/// Decides which URL a paper's PDF is fetched from.
pub struct PdfResolver {
    base_url: Option<String>,
}

impl PdfResolver {
    /// `base_url` builds `<base>/<id>.pdf` for records without a direct link.
    pub fn new(base_url: Option<&Url>) -> Self {
        Self {
            base_url: base_url.map(|u| u.as_str().trim_end_matches('/').to_string()),
        }
    }

    pub fn resolve(&self, paper: &PaperRecord) -> Option<String> {
        if let Some(url) = paper.pdf_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}.pdf", base, paper.id))
    }
}

/// Keeps alphanumerics, spaces, underscores and hyphens; trims trailing whitespace.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn sanitize_id(id: &str) -> String {
    id.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-', "_")
}

/// Longest stem in bytes; leaves room for `.pdf.part` under the usual 255-byte name limit.
const MAX_STEM_BYTES: usize = 200;

fn truncate_stem(stem: &str) -> &str {
    if stem.len() <= MAX_STEM_BYTES {
        return stem;
    }
    let mut end = MAX_STEM_BYTES;
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    stem[..end].trim_end()
}

/// File name (with `.pdf`) a paper is saved under.
pub fn pdf_file_name(paper: &PaperRecord, naming: FileNaming) -> String {
    let stem = match naming {
        FileNaming::Identifier => sanitize_id(&paper.id),
        FileNaming::Title => {
            let title = paper.title.as_deref().map(sanitize_title).unwrap_or_default();
            if title.trim().is_empty() {
                sanitize_id(&paper.id)
            } else {
                title
            }
        }
    };
    format!("{}.pdf", truncate_stem(&stem))
}
