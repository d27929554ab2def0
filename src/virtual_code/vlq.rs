//! Source map v3 `mappings` decoding and encoding.
//!
//! The compiler reports its line mapping as a standard source map: one group per
//! generated line separated by `;`, segments separated by `,`, each segment a run of
//! base64 VLQ numbers delta-encoded against the previous segment. Columns are UTF-16
//! code units.

use serde::Deserialize;

use crate::error::{Error, Result};

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const CONTINUATION: i64 = 0b10_0000;
const VALUE_MASK: i64 = 0b01_1111;

/// The fields of a source map this crate reads.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSourceMap {
    pub version: u32,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

/// A source location pointed to by a segment (zero-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePoint {
    pub source_index: u32,
    pub line: u32,
    pub column: u32,
}

/// One decoded segment with absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSegment {
    pub generated_column: u32,
    /// `None` for segments that only mark where the previous mapping stops.
    pub source: Option<SourcePoint>,
}

/// Decoded segments, one vector per generated line.
pub type DecodedMappings = Vec<Vec<DecodedSegment>>;

/// Parse a source map JSON document and decode its mappings.
pub fn parse_source_map(json: &str) -> Result<DecodedMappings> {
    let raw: RawSourceMap = serde_json::from_str(json)?;
    if raw.version != 3 {
        return Err(Error::SourceMapVersion(raw.version));
    }
    decode_mappings(&raw.mappings)
}

/// Decode a `mappings` string.
pub fn decode_mappings(mappings: &str) -> Result<DecodedMappings> {
    let mut lines = Vec::new();
    let mut line = Vec::new();
    let mut source_index = 0i64;
    let mut source_line = 0i64;
    let mut source_column = 0i64;

    let bytes = mappings.as_bytes();
    let mut pos = 0;
    let mut generated_column = 0i64;

    while pos <= bytes.len() {
        match bytes.get(pos) {
            None => {
                lines.push(std::mem::take(&mut line));
                break;
            }
            Some(b';') => {
                lines.push(std::mem::take(&mut line));
                generated_column = 0;
                pos += 1;
            }
            Some(b',') => pos += 1,
            Some(_) => {
                let start = pos;
                let mut fields = [0i64; 5];
                let mut count = 0;
                while pos < bytes.len() && bytes[pos] != b',' && bytes[pos] != b';' {
                    if count == fields.len() {
                        return Err(vlq_error(start, "segment has more than five fields"));
                    }
                    let (value, next) = decode_value(bytes, pos)?;
                    fields[count] = value;
                    count += 1;
                    pos = next;
                }

                generated_column = accumulate(generated_column, fields[0], start)?;
                let source = match count {
                    1 => None,
                    4 | 5 => {
                        source_index = accumulate(source_index, fields[1], start)?;
                        source_line = accumulate(source_line, fields[2], start)?;
                        source_column = accumulate(source_column, fields[3], start)?;
                        Some(SourcePoint {
                            source_index: non_negative(source_index, start)?,
                            line: non_negative(source_line, start)?,
                            column: non_negative(source_column, start)?,
                        })
                    }
                    n => return Err(vlq_error(start, &format!("segment has {} fields", n))),
                };
                line.push(DecodedSegment {
                    generated_column: non_negative(generated_column, start)?,
                    source,
                });
            }
        }
    }

    Ok(lines)
}

fn decode_value(bytes: &[u8], mut pos: usize) -> Result<(i64, usize)> {
    let start = pos;
    let mut result = 0i64;
    let mut shift = 0;
    loop {
        let Some(&byte) = bytes.get(pos) else {
            return Err(vlq_error(start, "unterminated value"));
        };
        let digit = BASE64
            .iter()
            .position(|&b| b == byte)
            .ok_or_else(|| vlq_error(pos, "invalid base64 character"))? as i64;
        pos += 1;
        if shift > 60 {
            return Err(vlq_error(start, "value overflows"));
        }
        result |= (digit & VALUE_MASK) << shift;
        shift += 5;
        if digit & CONTINUATION == 0 {
            break;
        }
    }
    let negative = result & 1 == 1;
    let magnitude = result >> 1;
    Ok((if negative { -magnitude } else { magnitude }, pos))
}

fn accumulate(total: i64, delta: i64, position: usize) -> Result<i64> {
    total
        .checked_add(delta)
        .ok_or_else(|| vlq_error(position, "value overflows"))
}

fn non_negative(value: i64, position: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| vlq_error(position, "negative or oversized value"))
}

fn vlq_error(position: usize, message: &str) -> Error {
    Error::Vlq {
        position,
        message: message.to_string(),
    }
}

/// Incremental `mappings` encoder.
///
/// Segments must be added in generated order (line, then column).
#[derive(Debug, Default)]
pub struct MappingsEncoder {
    out: String,
    line: u32,
    segments_on_line: usize,
    generated_column: i64,
    source_line: i64,
    source_column: i64,
}

impl MappingsEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a segment at `(line, column)` in the generated text.
    pub fn add(&mut self, line: u32, column: u32, source: Option<(u32, u32)>) {
        while self.line < line {
            self.out.push(';');
            self.line += 1;
            self.segments_on_line = 0;
            self.generated_column = 0;
        }
        if self.segments_on_line > 0 {
            self.out.push(',');
        }
        self.segments_on_line += 1;

        encode_value(&mut self.out, column as i64 - self.generated_column);
        self.generated_column = column as i64;

        if let Some((source_line, source_column)) = source {
            // Single source file: the index delta is always zero.
            encode_value(&mut self.out, 0);
            encode_value(&mut self.out, source_line as i64 - self.source_line);
            encode_value(&mut self.out, source_column as i64 - self.source_column);
            self.source_line = source_line as i64;
            self.source_column = source_column as i64;
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

fn encode_value(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = vlq & VALUE_MASK;
        vlq >>= 5;
        if vlq > 0 {
            digit |= CONTINUATION;
        }
        out.push(BASE64[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_mappings() {
        // "AAAA" = [0,0,0,0]; "IAAI" = [4,0,0,4]; "C" = [1]; ";" starts a new line
        let decoded = decode_mappings("AAAA,IAAI,C;AACA").unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].len(), 3);
        assert_eq!(decoded[0][1].generated_column, 4);
        assert_eq!(
            decoded[0][1].source,
            Some(SourcePoint {
                source_index: 0,
                line: 0,
                column: 4
            })
        );
        assert_eq!(decoded[0][2].generated_column, 5);
        assert_eq!(decoded[0][2].source, None);
        assert_eq!(decoded[1][0].source.unwrap().line, 1);
        assert_eq!(decoded[1][0].generated_column, 0);
    }

    #[test]
    fn empty_lines_are_kept() {
        let decoded = decode_mappings(";;AAAA").unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].is_empty());
        assert!(decoded[1].is_empty());
    }

    #[test]
    fn encoder_output_decodes_back() {
        let mut encoder = MappingsEncoder::new();
        encoder.add(0, 0, Some((2, 0)));
        encoder.add(0, 17, None);
        encoder.add(2, 4, Some((10, 123)));
        encoder.add(2, 40, Some((1, 3)));
        let decoded = decode_mappings(&encoder.finish()).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0][1].generated_column, 17);
        let last = decoded[2][1];
        assert_eq!(last.generated_column, 40);
        assert_eq!(last.source.map(|s| (s.line, s.column)), Some((1, 3)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_mappings("AA!A").is_err());
        assert!(decode_mappings("AA").is_err());
        assert!(decode_mappings("g").is_err());
        assert!(decode_mappings("D").is_err());
    }

    #[test]
    fn huge_values_are_errors() {
        // 2^62 - 1, the largest magnitude a 13-digit value carries.
        let huge = "+///////////H";
        assert_eq!(decode_value(huge.as_bytes(), 0).unwrap(), ((1 << 62) - 1, 13));
        for mappings in [
            huge.to_string(),
            format!("A{huge}AA"),
            format!("AAA{huge},{huge}"),
        ] {
            assert!(matches!(
                decode_mappings(&mappings),
                Err(Error::Vlq { .. })
            ));
        }
        assert!(accumulate(i64::MAX, 1, 0).is_err());
        assert_eq!(accumulate(5, -2, 0).unwrap(), 3);
    }

    #[test]
    fn parses_json_and_checks_version() {
        let decoded = parse_source_map(r#"{"version":3,"sources":["a.astro"],"mappings":"AAAA"}"#);
        assert_eq!(decoded.unwrap().len(), 1);
        assert!(matches!(
            parse_source_map(r#"{"version":2,"mappings":""}"#),
            Err(Error::SourceMapVersion(2))
        ));
        assert!(matches!(
            parse_source_map("not json"),
            Err(Error::SourceMapJson(_))
        ));
    }
}
