//! Pipeline stages for scanned-page-to-document conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the external capabilities (layout model, cleanup
//! service, OCR) can be swapped behind their traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ layout ──▶ enrich ──▶ assemble ──▶ export
//! (folder)  (regions)  (LLM/crop)  (pages)     (html/docx/pdf/tex)
//! ```
//!
//! 1. [`input`]   : find and decode page images, prepare the regions directory
//! 2. [`layout`]  : detect regions and sort them into reading order
//! 3. [`enrich`]  : clean text regions via [`llm`] and [`postprocess`];
//!    crop and save visual regions
//! 4. [`assemble`]: page header plus fragments; blank pages dropped
//!
//! Export lives in [`crate::export`].

pub mod assemble;
pub mod encode;
pub mod enrich;
pub mod input;
pub mod layout;
pub mod llm;
pub mod postprocess;
