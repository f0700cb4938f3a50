//! Read records one at a time from a byte stream.
//!
//! An ISO 8211 file is a DDR followed by any number of data records. Each
//! record states its own length in the first five bytes of its leader, so the
//! stream can be split without looking past the leader:
//!
//! ```
//! # use iso8211::reader::Iso8211Reader;
//! # use iso8211::write::{RecordBuilder, encode_ddr_field};
//! let mut file = RecordBuilder::ddr(3, 6)
//!     .field("NAME", encode_ddr_field("0000;&", "Name", "", "(A)"))
//!     .build()
//!     .unwrap();
//! file.extend(RecordBuilder::dr().field("NAME", b"buoy\x1f\x1e".to_vec()).build().unwrap());
//!
//! let reader = Iso8211Reader::new(file.as_slice()).unwrap();
//! let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].values[0].value.as_str(), Some("buoy"));
//! ```
use std::fmt::Display;
use std::io::{self, Read};

use error_stack::{Report, ResultExt};
use log::{debug, trace};

use crate::ddr::{Catalogue, DdrRecord};
use crate::dr::{DataRecord, DecodeSettings};
use crate::parsing::ascii_decimal;
use crate::LEADER_LENGTH;

/// What was being read when a stream failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// Reading bytes from the underlying stream
    Io,
    /// Decoding the descriptive record that opens the stream
    Ddr,
    /// Decoding a data record
    DataRecord,
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Io => write!(f, "Could not read an ISO 8211 record from the stream"),
            ReadError::Ddr => write!(f, "Could not decode the data descriptive record"),
            ReadError::DataRecord => write!(f, "Could not decode a data record"),
        }
    }
}

impl std::error::Error for ReadError {}

/// Read the bytes of the next record, leader included.
///
/// Returns `Ok(None)` at a clean end of stream (no bytes before the next
/// leader). A stream ending partway through a record is an `UnexpectedEof`
/// error, and a leader whose record length is not a decimal of at least 24
/// is `InvalidData`.
pub fn read_record<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut leader = [0u8; LEADER_LENGTH];
    let mut filled = 0;
    while filled < LEADER_LENGTH {
        match reader.read(&mut leader[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, format!("stream ended {filled} bytes into a record leader"))),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let record_length = ascii_decimal(&leader[..5])
        .filter(|n| *n >= LEADER_LENGTH)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("record length '{}' is not valid", leader[..5].escape_ascii())))?;

    let mut record = vec![0u8; record_length];
    record[..LEADER_LENGTH].copy_from_slice(&leader);
    reader.read_exact(&mut record[LEADER_LENGTH..])?;
    trace!("read record of {record_length} bytes");
    Ok(Some(record))
}


/// Decodes an ISO 8211 stream: the DDR on construction, then one data record
/// per call to [`Iso8211Reader::next_record`] (or per iteration).
///
/// A data record that fails to decode is reported and skipped, so iteration
/// can continue past it. An I/O failure ends the iteration.
pub struct Iso8211Reader<R: Read> {
    reader: R,
    catalogue: Catalogue,
    settings: DecodeSettings,
    /// Index of the next record; the DDR is record 0
    index: usize,
    /// Byte offset of the next record in the stream
    offset: usize,
    done: bool,
}

impl<R: Read> Iso8211Reader<R> {
    /// Read the DDR from `reader`, using the default decode settings for data records.
    pub fn new(reader: R) -> Result<Self, Report<ReadError>> {
        Self::with_settings(reader, DecodeSettings::default())
    }

    pub fn with_settings(mut reader: R, settings: DecodeSettings) -> Result<Self, Report<ReadError>> {
        let record = read_record(&mut reader)
            .change_context(ReadError::Io)
            .attach_printable("while reading the DDR at byte 0")?
            .ok_or_else(|| Report::new(ReadError::Ddr).attach_printable("the stream is empty"))?;

        let ddr = DdrRecord::parse(&record)
            .change_context(ReadError::Ddr)
            .attach_printable("record 0 at byte 0")?;
        debug!("DDR read: {} field descriptions", ddr.catalogue.len());

        Ok(Self {
            reader,
            catalogue: ddr.catalogue,
            settings,
            index: 1,
            offset: record.len(),
            done: false,
        })
    }

    /// The field descriptions from the stream's DDR.
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Read and decode the next data record, `Ok(None)` at the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<DataRecord>, Report<ReadError>> {
        if self.done {
            return Ok(None);
        }

        let (index, offset) = (self.index, self.offset);
        let record = match read_record(&mut self.reader) {
            Ok(Some(r)) => r,
            Ok(None) => {
                self.done = true;
                return Ok(None);
            },
            Err(e) => {
                self.done = true;
                return Err(Report::new(e)
                    .change_context(ReadError::Io)
                    .attach_printable(format!("record {index} at byte {offset}")));
            }
        };

        self.index += 1;
        self.offset += record.len();

        let rec = DataRecord::parse_custom(&record, &self.catalogue, self.settings.clone())
            .change_context(ReadError::DataRecord)
            .attach_printable(format!("record {index} at byte {offset}"))?;
        trace!("record {index}: {} values", rec.values.len());
        Ok(Some(rec))
    }
}

impl<R: Read> Iterator for Iso8211Reader<R> {
    type Item = Result<DataRecord, Report<ReadError>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
