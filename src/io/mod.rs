//! Document input.

pub mod pdf;

pub use pdf::load_pdf_pages;
