//! Image XObject and inline image decoding.
//!
//! Images are decoded to 8-bit RGBA with straight alpha, or to a coverage
//! map for stencil masks, which are painted with the current fill color.
//! JPEG (DCTDecode) goes through zune-jpeg; the other image codecs are
//! reported as unsupported filters.

use super::color_space::ColorSpace;
use super::decode::Filter;
use super::error::{PDFError, PDFResult};
use super::object_store::ObjectStore;
use super::parser::{PDFDict, PDFObject};

/// Images with more pixels than this are refused.
const MAX_PIXELS: u64 = 1 << 26;

/// Decoded pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePixels {
    /// Row-major RGBA, straight alpha.
    Rgba(Vec<u8>),
    /// Row-major coverage: 255 where the fill color is painted.
    Stencil(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: ImagePixels,
    /// The image asks for smoothing when scaled.
    pub interpolate: bool,
}

impl DecodedImage {
    pub fn is_stencil(&self) -> bool {
        matches!(self.pixels, ImagePixels::Stencil(_))
    }

    /// Decodes an image stream (XObject or inline image).
    ///
    /// `resources` resolves named color spaces.
    pub fn decode(
        stream: &PDFObject,
        store: &ObjectStore,
        resources: Option<&PDFDict>,
    ) -> PDFResult<Self> {
        let dict = stream
            .as_dict()
            .ok_or_else(|| PDFError::Generic(format!("image is a {}", stream.type_name())))?;
        let (width, height) = dimensions(dict, store)?;
        let interpolate = store
            .get_lenient(dict, "Interpolate")
            .and_then(|v| v.as_boolean())
            .unwrap_or(false);

        let is_mask = store
            .get_lenient(dict, "ImageMask")
            .and_then(|v| v.as_boolean())
            .unwrap_or(false);
        if is_mask {
            let coverage = decode_stencil(stream, dict, store, width, height)?;
            return Ok(DecodedImage {
                width,
                height,
                pixels: ImagePixels::Stencil(coverage),
                interpolate,
            });
        }

        let decoded = store.decode_image_stream(stream)?;
        let samples = match decoded.image_codec.map(|step| step.filter) {
            None => {
                let space = match store.get_lenient(dict, "ColorSpace") {
                    Some(space) => ColorSpace::parse(&space, store, resources)?,
                    None => ColorSpace::DeviceGray,
                };
                let bits = bits_per_component(dict, store, 8);
                Samples {
                    data: decoded.data,
                    bits,
                    decode: decode_ranges(dict, store, &space, bits),
                    space,
                }
            }
            Some(Filter::Dct) => {
                let (data, channels) = decode_jpeg(&decoded.data, width, height)?;
                let declared = store
                    .get_lenient(dict, "ColorSpace")
                    .and_then(|s| ColorSpace::parse(&s, store, resources).ok())
                    .filter(|s| s.components() == channels);
                let space = declared.unwrap_or(match channels {
                    1 => ColorSpace::DeviceGray,
                    4 => ColorSpace::DeviceCMYK,
                    _ => ColorSpace::DeviceRGB,
                });
                Samples {
                    data,
                    bits: 8,
                    decode: decode_ranges(dict, store, &space, 8),
                    space,
                }
            }
            Some(other) => return Err(PDFError::UnsupportedFilter(other.name().to_string())),
        };

        let mut rgba = samples.to_rgba(width, height);
        apply_masks(&mut rgba, &samples, dict, store, width, height);

        Ok(DecodedImage {
            width,
            height,
            pixels: ImagePixels::Rgba(rgba),
            interpolate,
        })
    }
}

fn dimensions(dict: &PDFDict, store: &ObjectStore) -> PDFResult<(u32, u32)> {
    let dim = |key: &str| {
        store
            .get_lenient(dict, key)
            .and_then(|v| v.as_usize())
            .filter(|v| *v > 0 && *v <= u32::MAX as usize)
            .map(|v| v as u32)
    };
    let (Some(width), Some(height)) = (dim("Width"), dim("Height")) else {
        return Err(PDFError::Generic("image without valid /Width and /Height".into()));
    };
    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(PDFError::Decode(format!("image of {}x{} pixels is too large", width, height)));
    }
    Ok((width, height))
}

fn bits_per_component(dict: &PDFDict, store: &ObjectStore, default: u8) -> u8 {
    match store.get_lenient(dict, "BitsPerComponent").and_then(|b| b.as_int()) {
        Some(bits @ (1 | 2 | 4 | 8 | 16)) => bits as u8,
        _ => default,
    }
}

fn decode_ranges(
    dict: &PDFDict,
    store: &ObjectStore,
    space: &ColorSpace,
    bits: u8,
) -> Vec<(f64, f64)> {
    let default = space.default_decode(bits);
    match store
        .get_lenient(dict, "Decode")
        .and_then(|d| d.as_number_array())
    {
        Some(values) if values.len() == default.len() * 2 => {
            values.chunks_exact(2).map(|p| (p[0], p[1])).collect()
        }
        _ => default,
    }
}

/// Raw image samples plus how to interpret them.
struct Samples {
    data: Vec<u8>,
    bits: u8,
    space: ColorSpace,
    decode: Vec<(f64, f64)>,
}

impl Samples {
    fn components(&self) -> usize {
        self.space.components().max(1)
    }

    fn row_bytes(&self, width: u32) -> usize {
        (width as usize * self.components() * self.bits as usize).div_ceil(8)
    }

    /// Decoded component values of pixel (x, y), before color conversion.
    fn pixel(&self, x: u32, y: u32, width: u32, out: &mut [f64]) {
        let n = self.components();
        let max = ((1u32 << self.bits) - 1) as f64;
        let row_start = y as usize * self.row_bytes(width) * 8;
        for (k, slot) in out.iter_mut().enumerate().take(n) {
            let bit = row_start + (x as usize * n + k) * self.bits as usize;
            let raw = read_bits(&self.data, bit, self.bits) as f64;
            let (lo, hi) = self.decode.get(k).copied().unwrap_or((0.0, 1.0));
            *slot = lo + raw * (hi - lo) / max;
        }
    }

    fn to_rgba(&self, width: u32, height: u32) -> Vec<u8> {
        let expected = self.row_bytes(width) * height as usize;
        if self.data.len() < expected {
            tracing::debug!(
                "image data short by {} bytes; padding",
                expected - self.data.len()
            );
        }

        let mut out = Vec::with_capacity(width as usize * height as usize * 4);
        let mut comps = vec![0.0; self.components()];

        // Indexed images convert through a palette built once.
        let palette: Option<Vec<[u8; 3]>> = match &self.space {
            ColorSpace::Indexed { hival, .. } => Some(
                (0..=*hival)
                    .map(|i| to_bytes(self.space.to_rgb(&[f64::from(i)])))
                    .collect(),
            ),
            _ => None,
        };

        for y in 0..height {
            for x in 0..width {
                self.pixel(x, y, width, &mut comps);
                let rgb = match &palette {
                    Some(palette) => {
                        let index = (comps[0].round().max(0.0) as usize).min(palette.len() - 1);
                        palette[index]
                    }
                    None => to_bytes(self.space.to_rgb(&comps)),
                };
                out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
        }
        out
    }
}

fn to_bytes(rgb: [f64; 3]) -> [u8; 3] {
    rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Reads `bits` (1..=16) bits at `bit_offset`, MSB first. Past the end reads 0.
fn read_bits(data: &[u8], bit_offset: usize, bits: u8) -> u32 {
    match bits {
        8 => u32::from(data.get(bit_offset / 8).copied().unwrap_or(0)),
        16 => {
            let i = bit_offset / 8;
            u32::from(data.get(i).copied().unwrap_or(0)) << 8
                | u32::from(data.get(i + 1).copied().unwrap_or(0))
        }
        _ => {
            let byte = u32::from(data.get(bit_offset / 8).copied().unwrap_or(0));
            let shift = 8 - (bit_offset % 8) as u32 - u32::from(bits);
            (byte >> shift) & ((1 << bits) - 1)
        }
    }
}

/// Decodes a 1-bit image mask into coverage (255 = painted).
fn decode_stencil(
    stream: &PDFObject,
    dict: &PDFDict,
    store: &ObjectStore,
    width: u32,
    height: u32,
) -> PDFResult<Vec<u8>> {
    let decoded = store.decode_image_stream(stream)?;
    if let Some(step) = decoded.image_codec {
        return Err(PDFError::UnsupportedFilter(step.filter.name().to_string()));
    }
    // Sample 0 paints unless /Decode is [1 0].
    let inverted = store
        .get_lenient(dict, "Decode")
        .and_then(|d| d.as_number_array())
        .is_some_and(|d| d.first().copied() == Some(1.0));

    let row_bytes = (width as usize).div_ceil(8);
    let mut coverage = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let bit = read_bits(&decoded.data, (y * row_bytes) * 8 + x, 1);
            let paints = (bit == 0) != inverted;
            coverage.push(if paints { 255 } else { 0 });
        }
    }
    Ok(coverage)
}

/// Applies `/SMask`, a stencil `/Mask` or a color-key `/Mask`.
fn apply_masks(
    rgba: &mut [u8],
    samples: &Samples,
    dict: &PDFDict,
    store: &ObjectStore,
    width: u32,
    height: u32,
) {
    let alpha = if let Some(smask) = store.get_lenient(dict, "SMask").filter(|s| s.is_stream()) {
        match decode_soft_mask(&smask, store) {
            Ok(mask) => Some(mask),
            Err(e) => {
                tracing::warn!("ignoring soft mask: {}", e);
                None
            }
        }
    } else {
        match store.get_lenient(dict, "Mask") {
            Some(mask) if mask.is_stream() => {
                let decoded = mask
                    .as_dict()
                    .ok_or_else(|| PDFError::Generic("mask".into()))
                    .and_then(|md| {
                        let (mw, mh) = dimensions(md, store)?;
                        Ok((mw, mh, decode_stencil(&mask, md, store, mw, mh)?))
                    });
                match decoded {
                    Ok(mask) => Some(mask),
                    Err(e) => {
                        tracing::warn!("ignoring stencil mask: {}", e);
                        None
                    }
                }
            }
            Some(mask) => {
                if let Some(ranges) = mask.as_number_array() {
                    apply_color_key(rgba, samples, &ranges, width, height);
                }
                None
            }
            None => None,
        }
    };

    if let Some((mw, mh, values)) = alpha {
        for y in 0..height {
            let my = (u64::from(y) * u64::from(mh) / u64::from(height)) as usize;
            for x in 0..width {
                let mx = (u64::from(x) * u64::from(mw) / u64::from(width)) as usize;
                let a = values.get(my * mw as usize + mx).copied().unwrap_or(255);
                rgba[(y as usize * width as usize + x as usize) * 4 + 3] = a;
            }
        }
    }
}

/// Decodes an `/SMask` image as alpha values with its own dimensions.
fn decode_soft_mask(smask: &PDFObject, store: &ObjectStore) -> PDFResult<(u32, u32, Vec<u8>)> {
    let dict = smask
        .as_dict()
        .ok_or_else(|| PDFError::Generic("soft mask is not a stream".into()))?;
    let (width, height) = dimensions(dict, store)?;
    let decoded = store.decode_image_stream(smask)?;
    let (data, bits) = match decoded.image_codec.map(|s| s.filter) {
        None => (decoded.data, bits_per_component(dict, store, 8)),
        Some(Filter::Dct) => (decode_jpeg(&decoded.data, width, height)?.0, 8),
        Some(other) => return Err(PDFError::UnsupportedFilter(other.name().to_string())),
    };
    let space = ColorSpace::DeviceGray;
    let samples = Samples {
        data,
        bits,
        decode: decode_ranges(dict, store, &space, bits),
        space,
    };
    let mut gray = [0.0];
    let mut values = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            samples.pixel(x, y, width, &mut gray);
            values.push((gray[0].clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    Ok((width, height, values))
}

/// Makes pixels whose raw samples all fall inside `ranges` transparent.
fn apply_color_key(rgba: &mut [u8], samples: &Samples, ranges: &[f64], width: u32, height: u32) {
    let n = samples.components();
    if ranges.len() < n * 2 {
        return;
    }
    let row_bits = samples.row_bytes(width) * 8;
    for y in 0..height as usize {
        for x in 0..width as usize {
            let masked = (0..n).all(|k| {
                let bit = y * row_bits + (x * n + k) * samples.bits as usize;
                let raw = f64::from(read_bits(&samples.data, bit, samples.bits));
                raw >= ranges[2 * k] && raw <= ranges[2 * k + 1]
            });
            if masked {
                rgba[(y * width as usize + x) * 4 + 3] = 0;
            }
        }
    }
}

/// Returns interleaved 8-bit samples and their channel count.
#[cfg(feature = "jpeg-decoding")]
fn decode_jpeg(data: &[u8], width: u32, height: u32) -> PDFResult<(Vec<u8>, usize)> {
    use std::io::Cursor;
    use zune_jpeg::zune_core::options::DecoderOptions;

    let options = DecoderOptions::default()
        .set_max_width(u16::MAX as usize)
        .set_max_height(u16::MAX as usize);
    let mut decoder = zune_jpeg::JpegDecoder::new_with_options(Cursor::new(data), options);
    let pixels = decoder
        .decode()
        .map_err(|e| PDFError::Decode(format!("JPEG: {:?}", e)))?;
    let info = decoder
        .info()
        .ok_or_else(|| PDFError::Decode("JPEG without frame header".into()))?;
    if info.width as u32 != width || info.height as u32 != height {
        tracing::debug!(
            "JPEG is {}x{} but the image dictionary says {}x{}",
            info.width,
            info.height,
            width,
            height
        );
    }
    let area = (info.width as usize * info.height as usize).max(1);
    let channels = (pixels.len() / area).max(1);
    Ok((pixels, channels))
}

#[cfg(not(feature = "jpeg-decoding"))]
fn decode_jpeg(_data: &[u8], _width: u32, _height: u32) -> PDFResult<(Vec<u8>, usize)> {
    Err(PDFError::UnsupportedFilter("DCTDecode".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::xref::XRefTable;
    use rustc_hash::FxHashMap;
    use std::sync::Arc;

    fn store() -> ObjectStore {
        ObjectStore::new(
            Arc::new(Vec::new()),
            XRefTable::from_parts(FxHashMap::default(), PDFDict::new()),
            false,
            false,
            32,
        )
    }

    fn image(entries: Vec<(&str, PDFObject)>, data: Vec<u8>) -> PDFObject {
        PDFObject::Stream {
            dict: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            data,
        }
    }

    fn name(n: &str) -> PDFObject {
        PDFObject::Name(n.to_string())
    }

    fn num(n: f64) -> PDFObject {
        PDFObject::Number(n)
    }

    #[test]
    fn test_rgb_image() {
        let img = image(
            vec![
                ("Width", num(2.0)),
                ("Height", num(1.0)),
                ("ColorSpace", name("DeviceRGB")),
                ("BitsPerComponent", num(8.0)),
            ],
            vec![255, 0, 0, 0, 0, 255],
        );
        let decoded = DecodedImage::decode(&img, &store(), None).unwrap();
        assert_eq!(
            decoded.pixels,
            ImagePixels::Rgba(vec![255, 0, 0, 255, 0, 0, 255, 255])
        );
    }

    #[test]
    fn test_one_bit_gray_with_row_padding() {
        // Width 3 pads each row to a byte.
        let img = image(
            vec![
                ("Width", num(3.0)),
                ("Height", num(2.0)),
                ("ColorSpace", name("DeviceGray")),
                ("BitsPerComponent", num(1.0)),
            ],
            vec![0b1010_0000, 0b0100_0000],
        );
        let decoded = DecodedImage::decode(&img, &store(), None).unwrap();
        let ImagePixels::Rgba(px) = decoded.pixels else {
            panic!("expected rgba");
        };
        let gray: Vec<u8> = px.chunks(4).map(|p| p[0]).collect();
        assert_eq!(gray, vec![255, 0, 255, 0, 255, 0]);
    }

    #[test]
    fn test_stencil_mask_and_decode_inversion() {
        let mask = image(
            vec![
                ("Width", num(4.0)),
                ("Height", num(1.0)),
                ("ImageMask", PDFObject::Boolean(true)),
            ],
            vec![0b0101_0000],
        );
        let decoded = DecodedImage::decode(&mask, &store(), None).unwrap();
        assert!(decoded.is_stencil());
        assert_eq!(decoded.pixels, ImagePixels::Stencil(vec![255, 0, 255, 0]));

        let inverted = image(
            vec![
                ("Width", num(4.0)),
                ("Height", num(1.0)),
                ("ImageMask", PDFObject::Boolean(true)),
                (
                    "Decode",
                    PDFObject::Array(vec![Box::new(num(1.0)), Box::new(num(0.0))].into()),
                ),
            ],
            vec![0b0101_0000],
        );
        let decoded = DecodedImage::decode(&inverted, &store(), None).unwrap();
        assert_eq!(decoded.pixels, ImagePixels::Stencil(vec![0, 255, 0, 255]));
    }

    #[test]
    fn test_soft_mask_sets_alpha() {
        let smask = image(
            vec![
                ("Width", num(1.0)),
                ("Height", num(1.0)),
                ("ColorSpace", name("DeviceGray")),
                ("BitsPerComponent", num(8.0)),
            ],
            vec![128],
        );
        let img = image(
            vec![
                ("Width", num(2.0)),
                ("Height", num(1.0)),
                ("ColorSpace", name("DeviceGray")),
                ("BitsPerComponent", num(8.0)),
                ("SMask", smask),
            ],
            vec![0, 255],
        );
        let decoded = DecodedImage::decode(&img, &store(), None).unwrap();
        assert_eq!(
            decoded.pixels,
            ImagePixels::Rgba(vec![0, 0, 0, 128, 255, 255, 255, 128])
        );
    }

    #[test]
    fn test_color_key_mask() {
        let img = image(
            vec![
                ("Width", num(2.0)),
                ("Height", num(1.0)),
                ("ColorSpace", name("DeviceGray")),
                ("BitsPerComponent", num(8.0)),
                (
                    "Mask",
                    PDFObject::Array(vec![Box::new(num(250.0)), Box::new(num(255.0))].into()),
                ),
            ],
            vec![10, 255],
        );
        let decoded = DecodedImage::decode(&img, &store(), None).unwrap();
        let ImagePixels::Rgba(px) = decoded.pixels else {
            panic!("expected rgba");
        };
        assert_eq!(px[3], 255);
        assert_eq!(px[7], 0);
    }

    #[test]
    fn test_unsupported_codec_and_bad_size() {
        let img = image(
            vec![
                ("Width", num(1.0)),
                ("Height", num(1.0)),
                ("Filter", name("JBIG2Decode")),
            ],
            vec![0],
        );
        assert!(matches!(
            DecodedImage::decode(&img, &store(), None),
            Err(PDFError::UnsupportedFilter(_))
        ));

        let img = image(vec![("Width", num(0.0)), ("Height", num(1.0))], vec![]);
        assert!(DecodedImage::decode(&img, &store(), None).is_err());
    }
}
