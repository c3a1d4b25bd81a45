//! Loading guideline text from an uploaded document.
//!
//! PDFs go through `pdf-extract` (feature `pdf`); anything else is read as text, with
//! invalid UTF-8 sequences replaced.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::GuidelineError;

#[instrument(target = "sba_generator::guideline", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_guideline(path: impl AsRef<Path>) -> Result<String, GuidelineError> {
    let path = path.as_ref();
    let text = if is_pdf(path) {
        extract_pdf_text(path)?
    } else {
        String::from_utf8_lossy(&std::fs::read(path)?).into_owned()
    };

    if text.trim().is_empty() {
        return Err(GuidelineError::Empty);
    }
    info!(chars = text.chars().count(), "Loaded guideline text");
    Ok(text)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(feature = "pdf")]
fn extract_pdf_text(path: &Path) -> Result<String, GuidelineError> {
    let bytes = std::fs::read(path)?;
    debug!(bytes = bytes.len(), "Extracting text from PDF");
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| GuidelineError::Pdf(e.to_string()))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf_text(_path: &Path) -> Result<String, GuidelineError> {
    debug!("PDF extraction requested without the pdf feature");
    Err(GuidelineError::PdfUnsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_extension_case_insensitively() {
        assert!(is_pdf(Path::new("nice.PDF")));
        assert!(is_pdf(Path::new("dir/rcem.pdf")));
        assert!(!is_pdf(Path::new("notes.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn text_guidelines_tolerate_invalid_utf8() {
        let path = std::env::temp_dir().join(format!("sba_guideline_{}.txt", std::process::id()));
        std::fs::write(&path, b"Give aspirin \xff\xfe 300 mg").unwrap();

        let text = load_guideline(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(text.starts_with("Give aspirin "));
        assert!(text.ends_with(" 300 mg"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn blank_text_guideline_is_rejected() {
        let path = std::env::temp_dir().join(format!("sba_blank_guideline_{}.txt", std::process::id()));
        std::fs::write(&path, " \n\t").unwrap();

        let result = load_guideline(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(GuidelineError::Empty)));
    }
}
