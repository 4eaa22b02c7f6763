//! RAPIC Ingest Library
//!
//! Decodes RAPIC weather radar streams (the mixed text and binary
//! transmission format used by Australian weather radars) into composite
//! radar beams and writes each complete volume to Apache Parquet.
//!
//! The pipeline is layered bottom-up:
//! - [`record_reader`]: splits the byte stream into text and binary records
//! - [`codec`]: decodes 6-level, 16-level and binary radials
//! - [`scan_list`] and [`scan_params`]: image and sweep metadata
//! - [`processor`]: the scan assembler, beam merge and output sinks

pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod processor;
pub mod record_reader;
pub mod scan_list;
pub mod scan_params;

pub use config::{CompressionAlgorithm, IngestConfig};
pub use error::{CodecError, ImageError, MetadataError, RapicError, Result};
pub use models::{
    CompositeBeam, FieldParams, IngestStats, ProcessingStats, RadarAngle, RadarParams,
    RawRecord, RecordKind, VolumeInfo,
};
pub use processor::{
    IngestProcessor, ingest_file,
    assembler::ScanAssembler,
    sink::{BeamSink, CollectingSink, RadarMessage, SummarySink},
    writer::ParquetSink,
};
pub use record_reader::RecordReader;
