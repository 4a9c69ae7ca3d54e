//! # Attach Harness
//!
//! Content-addressed attachment text extraction for RAG ingestion.
//!
//! Attach Harness takes structured records that reference downloaded
//! attachments (zip archives, HWP documents, PDFs, raster images), converts
//! every attachment to text, and writes one aggregated text field per record
//! for downstream chunking and embedding. Byte-identical attachments are
//! extracted exactly once per run, however many records or archives contain
//! them.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Records   │──▶│ RecordAggregator │──▶│ output JSON  │
//! │  (JSON)    │   └────────┬─────────┘   └──────────────┘
//! └────────────┘            ▼
//!                  ┌──────────────────┐   ┌──────────────┐
//!                  │ ExtractionRouter │──▶│ ContentCache │
//!                  └────────┬─────────┘   └──────────────┘
//!              ┌────────────┼─────────────┬──────────────┐
//!              ▼            ▼             ▼              ▼
//!          ┌───────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐
//!          │  PDF  │   │ hwp5txt │   │   OCR   │   │ Archive  │──▶ router (members)
//!          └───────┘   └─────────┘   └─────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! atx run --input data/records.json --output data/records_rag.json
//! atx probe downloads/notice.hwp
//! atx classify downloads/*
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Records, reports, processed output |
//! | [`outcome`] | Extraction outcomes and error taxonomy |
//! | [`hasher`] | SHA-256 content fingerprints |
//! | [`cache`] | Fingerprint-keyed outcome cache |
//! | [`extract`] | File classification, extractor trait, PDF |
//! | [`converter`] | External converter for HWP documents |
//! | [`ocr`] | OCR backends and the image extractor |
//! | [`archive`] | Recursive zip expansion |
//! | [`router`] | Fingerprint → cache → extractor dispatch |
//! | [`aggregate`] | Per-record aggregated text |
//! | [`ingest`] | Batch run orchestration |
//! | [`progress`] | Run progress on stderr |
//! | [`stats`] | Run statistics and summary |

pub mod aggregate;
pub mod archive;
pub mod cache;
pub mod config;
pub mod converter;
pub mod extract;
pub mod hasher;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod outcome;
pub mod progress;
pub mod router;
pub mod stats;
