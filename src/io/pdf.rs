//! PDF text extraction.

use std::fs::File;
use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use crate::core::Page;
use crate::error::DocumentError;

/// Magic bytes every PDF file starts with.
const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// Extracts the text of every page of the PDF at `path`.
///
/// Pages are numbered from 1 in document order. A page without text is
/// returned with an empty string so page numbers stay aligned.
///
/// # Errors
///
/// Returns [`DocumentError::Load`] if the file cannot be read, does not
/// carry the PDF header, or the extractor fails or panics on it.
pub fn load_pdf_pages(path: &Path) -> Result<Vec<Page>, DocumentError> {
    let load_err = |message: String| DocumentError::Load {
        path: path.to_path_buf(),
        message,
    };

    let mut file = File::open(path).map_err(|e| load_err(e.to_string()))?;
    let mut header = [0u8; 5];
    file.read_exact(&mut header)
        .map_err(|_| load_err("file is too short to be a PDF".to_string()))?;
    if &header != PDF_MAGIC {
        return Err(load_err("not a PDF file (missing %PDF- header)".to_string()));
    }
    drop(file);

    // pdf-extract panics on some malformed inputs.
    let extracted = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_by_pages(path)));
    let texts = match extracted {
        Ok(Ok(texts)) => texts,
        Ok(Err(e)) => return Err(load_err(e.to_string())),
        Err(_) => return Err(load_err("PDF parser panicked on malformed input".to_string())),
    };

    let pages: Vec<Page> = texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page::new(i + 1, text))
        .collect();

    tracing::debug!(path = %path.display(), pages = pages.len(), "extracted PDF text");
    Ok(pages)
}
