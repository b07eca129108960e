//! Stream filters.
//!
//! A stream's `/Filter` entry names a chain of decoders that are applied in the
//! order they are declared. Generic filters (compression, ASCII armour) are
//! decoded here. Image codecs are left for the image decoder, which receives
//! the bytes produced by the generic filters in front of them.
//!
//! Based on PDF.js src/core/flate_stream.js, lzw_stream.js, ascii_85_stream.js,
//! run_length_stream.js and predictor_stream.js

use super::error::{PDFError, PDFResult};
use super::parser::{PDFDict, PDFObject};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;
use weezl::{BitOrder, decode::Decoder as LzwDecoder};

/// A decoder named in a `/Filter` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Flate,
    Lzw,
    AsciiHex,
    Ascii85,
    RunLength,
    /// Only the Identity crypt filter is accepted.
    Crypt,
    Dct,
    Jpx,
    CcittFax,
    Jbig2,
}

impl Filter {
    /// Maps a filter name, including the abbreviations allowed in inline
    /// images, to a filter.
    pub fn from_name(name: &str) -> Option<Filter> {
        Some(match name {
            "FlateDecode" | "Fl" => Filter::Flate,
            "LZWDecode" | "LZW" => Filter::Lzw,
            "ASCIIHexDecode" | "AHx" => Filter::AsciiHex,
            "ASCII85Decode" | "A85" => Filter::Ascii85,
            "RunLengthDecode" | "RL" => Filter::RunLength,
            "Crypt" => Filter::Crypt,
            "DCTDecode" | "DCT" => Filter::Dct,
            "JPXDecode" => Filter::Jpx,
            "CCITTFaxDecode" | "CCF" => Filter::CcittFax,
            "JBIG2Decode" => Filter::Jbig2,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Filter::Flate => "FlateDecode",
            Filter::Lzw => "LZWDecode",
            Filter::AsciiHex => "ASCIIHexDecode",
            Filter::Ascii85 => "ASCII85Decode",
            Filter::RunLength => "RunLengthDecode",
            Filter::Crypt => "Crypt",
            Filter::Dct => "DCTDecode",
            Filter::Jpx => "JPXDecode",
            Filter::CcittFax => "CCITTFaxDecode",
            Filter::Jbig2 => "JBIG2Decode",
        }
    }

    /// Filters that produce pixels rather than bytes.
    pub fn is_image_codec(self) -> bool {
        matches!(
            self,
            Filter::Dct | Filter::Jpx | Filter::CcittFax | Filter::Jbig2
        )
    }
}

/// Parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
    pub early_change: i64,
    /// Raw dictionary, kept for image codecs (e.g. `/ColorTransform`).
    pub dict: Option<PDFDict>,
}

impl Default for DecodeParams {
    fn default() -> Self {
        DecodeParams {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: 1,
            dict: None,
        }
    }
}

impl DecodeParams {
    pub fn from_dict(dict: Option<&PDFDict>) -> Self {
        let mut params = DecodeParams::default();
        let Some(dict) = dict else {
            return params;
        };
        let int = |key: &str| dict.get(key).and_then(PDFObject::as_int);

        if let Some(p) = int("Predictor") {
            params.predictor = p;
        }
        if let Some(c) = int("Colors").filter(|c| *c >= 1) {
            params.colors = c as usize;
        }
        if let Some(b) = int("BitsPerComponent").filter(|b| [1, 2, 4, 8, 16].contains(b)) {
            params.bits_per_component = b as usize;
        }
        if let Some(c) = int("Columns").filter(|c| *c >= 1) {
            params.columns = c as usize;
        }
        if let Some(e) = int("EarlyChange") {
            params.early_change = e;
        }
        params.dict = Some(dict.clone());
        params
    }
}

/// One entry of a filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStep {
    pub filter: Filter,
    pub params: DecodeParams,
}

/// Output of [`decode_until_image_codec`].
#[derive(Debug, Clone)]
pub struct DecodedStream {
    pub data: Vec<u8>,
    /// Trailing image codec still to be applied, if any.
    pub image_codec: Option<FilterStep>,
}

/// Builds a filter chain from already resolved `/Filter` and `/DecodeParms`
/// values.
///
/// Unknown filter names fail with `UnsupportedFilter`.
pub fn filter_chain(
    filter: Option<&PDFObject>,
    params: Option<&PDFObject>,
) -> PDFResult<Vec<FilterStep>> {
    let names: Vec<&str> = match filter {
        None | Some(PDFObject::Null) => return Ok(Vec::new()),
        Some(PDFObject::Name(name)) => vec![name.as_str()],
        Some(PDFObject::Array(items)) => items.iter().filter_map(|o| o.as_name()).collect(),
        Some(other) => {
            return Err(PDFError::Generic(format!(
                "/Filter must be a name or array, found {}",
                other.type_name()
            )));
        }
    };

    let param_dicts: Vec<Option<&PDFDict>> = match params {
        Some(PDFObject::Array(items)) => items.iter().map(|o| o.as_dict()).collect(),
        Some(PDFObject::Dictionary(d)) => vec![Some(d)],
        _ => Vec::new(),
    };

    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let filter =
                Filter::from_name(name)
                    .ok_or_else(|| PDFError::UnsupportedFilter(name.to_string()))?;
            let dict = param_dicts.get(i).copied().flatten();
            Ok(FilterStep {
                filter,
                params: DecodeParams::from_dict(dict),
            })
        })
        .collect()
}

/// Applies the chain in declared order.
///
/// Image codecs are not byte filters, so reaching one is an error here; use
/// [`decode_until_image_codec`] for image streams.
pub fn apply_filters(data: &[u8], chain: &[FilterStep]) -> PDFResult<Vec<u8>> {
    let decoded = decode_until_image_codec(data, chain)?;
    match decoded.image_codec {
        None => Ok(decoded.data),
        Some(step) => Err(PDFError::UnsupportedFilter(step.filter.name().to_string())),
    }
}

/// Applies generic filters in declared order and stops at a trailing image
/// codec, returning it alongside the bytes it should consume.
pub fn decode_until_image_codec(data: &[u8], chain: &[FilterStep]) -> PDFResult<DecodedStream> {
    let mut current = data.to_vec();

    for (i, step) in chain.iter().enumerate() {
        if step.filter.is_image_codec() {
            if i + 1 != chain.len() {
                return Err(PDFError::UnsupportedFilter(format!(
                    "{} followed by further filters",
                    step.filter.name()
                )));
            }
            return Ok(DecodedStream {
                data: current,
                image_codec: Some(step.clone()),
            });
        }
        current = apply_filter(&current, step)?;
    }

    Ok(DecodedStream {
        data: current,
        image_codec: None,
    })
}

fn apply_filter(data: &[u8], step: &FilterStep) -> PDFResult<Vec<u8>> {
    let decoded = match step.filter {
        Filter::Flate => decode_flate(data)?,
        Filter::Lzw => decode_lzw(data, step.params.early_change),
        Filter::AsciiHex => decode_ascii_hex(data),
        Filter::Ascii85 => decode_ascii85(data)?,
        Filter::RunLength => decode_run_length(data),
        Filter::Crypt => {
            let name = step
                .params
                .dict
                .as_ref()
                .and_then(|d| d.get("Name"))
                .and_then(PDFObject::as_name)
                .unwrap_or("Identity");
            if name != "Identity" {
                return Err(PDFError::UnsupportedFilter(format!("Crypt /{}", name)));
            }
            data.to_vec()
        }
        other => return Err(PDFError::UnsupportedFilter(other.name().to_string())),
    };

    match step.filter {
        Filter::Flate | Filter::Lzw => apply_predictor(decoded, &step.params),
        _ => Ok(decoded),
    }
}

/// Inflates zlib or raw deflate data.
///
/// Damaged input yields the prefix that inflated before the damage.
pub fn decode_flate(compressed: &[u8]) -> PDFResult<Vec<u8>> {
    let mut out = Vec::new();
    let zlib_err = match ZlibDecoder::new(compressed).read_to_end(&mut out) {
        Ok(_) => return Ok(out),
        Err(e) => e,
    };
    if !out.is_empty() {
        tracing::debug!("flate stream damaged after {} bytes: {}", out.len(), zlib_err);
        return Ok(out);
    }

    // Some producers omit the zlib header.
    out.clear();
    match DeflateDecoder::new(compressed).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(_) if !out.is_empty() => Ok(out),
        Err(deflate_err) => Err(PDFError::Decode(format!(
            "FlateDecode failed: zlib ({}), raw deflate ({})",
            zlib_err, deflate_err
        ))),
    }
}

/// LZW, MSB first. `EarlyChange` 1 (the default) widens codes one entry early.
pub fn decode_lzw(data: &[u8], early_change: i64) -> Vec<u8> {
    let mut decoder = if early_change == 0 {
        LzwDecoder::new(BitOrder::Msb, 8)
    } else {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut out = Vec::new();
    let result = decoder.into_vec(&mut out).decode(data);
    if let Err(e) = result.status {
        tracing::debug!("LZW stream ended early: {:?}", e);
    }
    out
}

pub fn decode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        let value = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => continue,
        };
        match high.take() {
            Some(h) => out.push((h << 4) | value),
            None => high = Some(value),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    out
}

pub fn decode_ascii85(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0usize;

    // Optional "<~" prefix.
    let body = data.strip_prefix(b"<~").unwrap_or(data);

    for &byte in body {
        match byte {
            b'~' => break,
            b'z' if count == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    out.extend_from_slice(&ascii85_group(&group));
                    count = 0;
                }
            }
            b if b.is_ascii_whitespace() || b == 0 => {}
            other => {
                return Err(PDFError::Decode(format!(
                    "invalid ASCII85 byte 0x{:02x}",
                    other
                )));
            }
        }
    }

    if count > 1 {
        // A partial group of n digits yields n - 1 bytes; pad with 'u'.
        for slot in group.iter_mut().skip(count) {
            *slot = 84;
        }
        let bytes = ascii85_group(&group);
        out.extend_from_slice(&bytes[..count - 1]);
    }
    Ok(out)
}

fn ascii85_group(digits: &[u8; 5]) -> [u8; 4] {
    let value = digits
        .iter()
        .fold(0u64, |acc, &d| acc * 85 + u64::from(d));
    (value.min(u64::from(u32::MAX)) as u32).to_be_bytes()
}

pub fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let len = data[i];
        i += 1;
        match len {
            128 => break,
            0..=127 => {
                let end = (i + len as usize + 1).min(data.len());
                out.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let Some(&byte) = data.get(i) else { break };
                out.extend(std::iter::repeat_n(byte, 257 - len as usize));
                i += 1;
            }
        }
    }
    out
}

fn apply_predictor(data: Vec<u8>, params: &DecodeParams) -> PDFResult<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        2 => Ok(decode_tiff_predictor(
            data,
            params.colors,
            params.bits_per_component,
            params.columns,
        )),
        10..=15 => Ok(decode_png_predictor(
            &data,
            params.colors,
            params.bits_per_component,
            params.columns,
        )),
        other => Err(PDFError::Decode(format!("unknown predictor {}", other))),
    }
}

/// Bytes per row of `columns` samples, `None` when the parameters overflow.
fn row_length(colors: usize, bits_per_component: usize, columns: usize) -> Option<usize> {
    let bits = columns.checked_mul(colors)?.checked_mul(bits_per_component)?;
    Some(bits.div_ceil(8))
}

/// TIFF predictor 2: each component is stored as a difference from the
/// same component of the pixel to its left.
pub fn decode_tiff_predictor(
    mut data: Vec<u8>,
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> Vec<u8> {
    let Some(row_bytes) = row_length(colors, bits_per_component, columns) else {
        tracing::warn!("TIFF predictor parameters overflow, data left as is");
        return data;
    };
    if row_bytes == 0 {
        return data;
    }

    match bits_per_component {
        8 => {
            for row in data.chunks_mut(row_bytes) {
                for i in colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
        }
        16 => {
            let pixel = colors * 2;
            for row in data.chunks_mut(row_bytes) {
                let mut i = pixel;
                while i + 1 < row.len() {
                    let prev = u16::from_be_bytes([row[i - pixel], row[i - pixel + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    let [hi, lo] = cur.wrapping_add(prev).to_be_bytes();
                    row[i] = hi;
                    row[i + 1] = lo;
                    i += 2;
                }
            }
        }
        _ => {
            tracing::debug!(
                "TIFF predictor with {} bits per component left as is",
                bits_per_component
            );
        }
    }
    data
}

/// PNG predictors: every row starts with a tag byte selecting the filter.
///
/// A trailing partial row is decoded as far as it goes.
pub fn decode_png_predictor(
    data: &[u8],
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> Vec<u8> {
    let (Some(bpp), Some(row_bytes)) = (
        row_length(colors, bits_per_component, 1),
        row_length(colors, bits_per_component, columns),
    ) else {
        tracing::warn!("PNG predictor parameters overflow, data left as is");
        return data.to_vec();
    };
    let bpp = bpp.max(1);
    if row_bytes == 0 {
        return Vec::new();
    }

    // A row never holds more bytes than the stream does.
    let width = row_bytes.min(data.len());
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; width];
    let mut row = vec![0u8; width];

    for chunk in data.chunks(row_bytes.saturating_add(1)) {
        let tag = chunk[0];
        let raw = &chunk[1..];
        let n = raw.len();

        for i in 0..n {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match tag {
                0 => raw[i],
                1 => raw[i].wrapping_add(left),
                2 => raw[i].wrapping_add(up),
                3 => raw[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => raw[i].wrapping_add(paeth(left, up, up_left)),
                _ => raw[i],
            };
        }

        out.extend_from_slice(&row[..n]);
        std::mem::swap(&mut prev, &mut row);
    }
    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
