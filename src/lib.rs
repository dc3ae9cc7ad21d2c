//! # docquery
//!
//! Question answering over a PDF and over a single database table, driven
//! by tool-calling LLM agents.
//!
//! ## Document questions
//!
//! A PDF is split into overlapping chunks, embedded and kept in an
//! in-memory [`VectorIndex`]. The [`DocumentAgent`] exposes a `retrieve`
//! tool over that index and composes its answer from the passages the
//! tool returned.
//!
//! ## Table questions
//!
//! The [`DatabaseAgent`] answers through a read-only SQL toolkit that can
//! only see one table.
//!
//! Both agents retry rate-limited runs and report other failures as
//! [`AgentError::QueryProcessing`].

pub mod agent;
pub mod chunking;
pub mod cli;
pub mod core;
pub mod credentials;
pub mod embedding;
pub mod error;
pub mod index;
pub mod io;
pub mod sql;

pub use agent::{AgentAnswer, AgentConfig, DatabaseAgent, DocumentAgent, NO_ANSWER_SENTINEL};
pub use chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, RecursiveSplitter};
pub use crate::core::{Chunk, Page};
pub use credentials::{CredentialProfile, Credentials, load_credentials, load_credentials_if_needed};
pub use embedding::{Embedder, EmbedderKind, create_embedder};
pub use error::{AgentError, Error, Result};
pub use index::{DocumentIndexer, Retriever, VectorIndex};
pub use io::load_pdf_pages;
pub use sql::{DatabaseConfig, SqlDatabase};
