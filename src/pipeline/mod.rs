//! Pipeline stages for harvesting one submission slot.
//!
//! Each submodule implements one step, so each can be tested without the
//! network or without a PDF engine.
//!
//! ## Data Flow
//!
//! ```text
//! link ──▶ fetch ──▶ classify ──▶ convert ──▶ <entrant>/<slot>.avif
//! (id)    (retry)   (bytes vs     │
//!                    header)      ├─ render  (pdfium, first page)
//!                                 ├─ heif    (libheif, optional)
//!                                 └─ encode  (AVIF)
//! ```
//!
//! 1. [`link`]    : pull the resource id out of a sharing URL; pure string work
//! 2. [`fetch`]   : download with retries and interstitial confirmation, stage
//!    the bytes, then drive classification and conversion
//! 3. [`classify`]: settle the payload kind; signature inspection overrides a
//!    generic declared type
//! 4. [`convert`] : strategy per kind, AVIF encode, size gate; runs in
//!    `spawn_blocking` because pdfium and the encoder are CPU-bound
//! 5. [`render`], [`heif`], [`encode`]: the format-specific pieces

pub mod classify;
pub mod convert;
pub mod encode;
pub mod fetch;
pub mod heif;
pub mod link;
pub mod render;
