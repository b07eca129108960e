//! Color spaces and their conversion to RGB.
//!
//! Device spaces convert exactly. Calibrated and ICC spaces are treated as
//! the device space with the same number of components, and spot colors
//! (Separation, DeviceN) are approximated as gray from their tint.
//!
//! Based on PDF.js src/core/colorspace.js

use super::error::{PDFError, PDFResult};
use super::object_store::ObjectStore;
use super::parser::{PDFDict, PDFObject};

/// Nested color space definitions deeper than this are rejected.
const MAX_NESTING: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    /// CIE L*a*b* with the declared white point and ranges.
    Lab {
        white_point: [f64; 3],
        range: [f64; 4],
    },
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
    /// Separation or DeviceN, with its number of tint components.
    Spot { components: usize },
    /// Tiling or shading pattern; painted as mid gray.
    Pattern,
}

impl ColorSpace {
    /// Parses a color space operand or `/ColorSpace` entry.
    ///
    /// Names that are not device families are looked up in the
    /// `/ColorSpace` subdictionary of `resources`.
    pub fn parse(
        obj: &PDFObject,
        store: &ObjectStore,
        resources: Option<&PDFDict>,
    ) -> PDFResult<Self> {
        Self::parse_nested(obj, store, resources, 0)
    }

    fn parse_nested(
        obj: &PDFObject,
        store: &ObjectStore,
        resources: Option<&PDFDict>,
        depth: usize,
    ) -> PDFResult<Self> {
        if depth > MAX_NESTING {
            return Err(PDFError::Generic("color space nested too deeply".into()));
        }
        let obj = store.resolve_object(obj)?;
        match &*obj {
            PDFObject::Name(name) => {
                if let Some(space) = Self::from_family(name) {
                    return Ok(space);
                }
                let named = resources
                    .and_then(|r| store.get_lenient(r, "ColorSpace"))
                    .and_then(|spaces| spaces.as_dict().and_then(|d| d.get(name.as_str())).cloned())
                    .ok_or_else(|| PDFError::Generic(format!("unknown color space /{}", name)))?;
                Self::parse_nested(&named, store, resources, depth + 1)
            }
            PDFObject::Array(items) => {
                let family = items
                    .first()
                    .and_then(|f| f.as_name())
                    .ok_or_else(|| PDFError::Generic("color space array without family".into()))?;
                let arg = |i: usize| items.get(i).map(|b| &**b);

                match family {
                    "CalGray" => Ok(ColorSpace::DeviceGray),
                    "CalRGB" => Ok(ColorSpace::DeviceRGB),
                    "CalCMYK" => Ok(ColorSpace::DeviceCMYK),
                    "ICCBased" => {
                        let stream = arg(1)
                            .map(|s| store.resolve_object(s))
                            .transpose()?
                            .ok_or_else(|| PDFError::Generic("ICCBased without stream".into()))?;
                        let dict = stream.as_dict().cloned().unwrap_or_default();
                        if let Some(alternate) = dict.get("Alternate") {
                            if let Ok(space) =
                                Self::parse_nested(alternate, store, resources, depth + 1)
                            {
                                return Ok(space);
                            }
                        }
                        match store.get_lenient(&dict, "N").and_then(|n| n.as_int()) {
                            Some(1) => Ok(ColorSpace::DeviceGray),
                            Some(4) => Ok(ColorSpace::DeviceCMYK),
                            _ => Ok(ColorSpace::DeviceRGB),
                        }
                    }
                    "Lab" => {
                        let params = arg(1)
                            .map(|d| store.resolve_object(d))
                            .transpose()?
                            .and_then(|d| d.as_dict().cloned())
                            .unwrap_or_default();
                        let white = params
                            .get("WhitePoint")
                            .and_then(PDFObject::as_number_array)
                            .filter(|w| w.len() == 3)
                            .unwrap_or_else(|| vec![0.9505, 1.0, 1.089]);
                        let range = params
                            .get("Range")
                            .and_then(PDFObject::as_number_array)
                            .filter(|r| r.len() == 4)
                            .unwrap_or_else(|| vec![-100.0, 100.0, -100.0, 100.0]);
                        Ok(ColorSpace::Lab {
                            white_point: [white[0], white[1], white[2]],
                            range: [range[0], range[1], range[2], range[3]],
                        })
                    }
                    "Indexed" | "I" => {
                        let base =
                            arg(1).ok_or_else(|| PDFError::Generic("Indexed without base".into()))?;
                        let base = Self::parse_nested(base, store, resources, depth + 1)?;
                        let hival = arg(2)
                            .and_then(PDFObject::as_int)
                            .unwrap_or(0)
                            .clamp(0, 255) as u8;
                        let table = arg(3)
                            .map(|t| store.resolve_object(t))
                            .transpose()?;
                        let lookup = match table.as_deref() {
                            Some(stream @ PDFObject::Stream { .. }) => store.decode_stream(stream)?,
                            Some(other) => other.as_bytes().unwrap_or_default().to_vec(),
                            None => Vec::new(),
                        };
                        Ok(ColorSpace::Indexed {
                            base: Box::new(base),
                            hival,
                            lookup,
                        })
                    }
                    "Separation" => Ok(ColorSpace::Spot { components: 1 }),
                    "DeviceN" => {
                        let names = arg(1).map(|n| store.resolve_object(n)).transpose()?;
                        let components = names
                            .as_deref()
                            .and_then(PDFObject::as_array)
                            .map_or(1, |n| n.len().max(1));
                        Ok(ColorSpace::Spot { components })
                    }
                    "Pattern" => Ok(ColorSpace::Pattern),
                    other => Self::from_family(other).ok_or_else(|| {
                        PDFError::Generic(format!("unknown color space family /{}", other))
                    }),
                }
            }
            other => Err(PDFError::Generic(format!(
                "color space cannot be a {}",
                other.type_name()
            ))),
        }
    }

    /// Device families, including the abbreviations allowed in inline images.
    pub fn from_family(name: &str) -> Option<Self> {
        match name {
            "DeviceGray" | "G" | "CalGray" => Some(ColorSpace::DeviceGray),
            "DeviceRGB" | "RGB" | "CalRGB" => Some(ColorSpace::DeviceRGB),
            "DeviceCMYK" | "CMYK" => Some(ColorSpace::DeviceCMYK),
            "Pattern" => Some(ColorSpace::Pattern),
            _ => None,
        }
    }

    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::DeviceRGB | ColorSpace::Lab { .. } => 3,
            ColorSpace::DeviceCMYK => 4,
            ColorSpace::Spot { components } => *components,
            ColorSpace::Pattern => 0,
        }
    }

    /// Color selected when the space is set with `cs`/`CS`.
    pub fn initial_color(&self) -> Vec<f64> {
        match self {
            ColorSpace::DeviceCMYK => vec![0.0, 0.0, 0.0, 1.0],
            ColorSpace::Lab { .. } => vec![0.0, 0.0, 0.0],
            ColorSpace::Spot { components } => vec![1.0; *components],
            ColorSpace::Pattern => Vec::new(),
            other => vec![0.0; other.components()],
        }
    }

    /// Default `/Decode` ranges for an image with `bits` per component.
    pub fn default_decode(&self, bits: u8) -> Vec<(f64, f64)> {
        match self {
            ColorSpace::Indexed { .. } => vec![(0.0, f64::from((1u32 << bits.min(16)) - 1))],
            ColorSpace::Lab { range, .. } => {
                vec![(0.0, 100.0), (range[0], range[1]), (range[2], range[3])]
            }
            other => vec![(0.0, 1.0); other.components()],
        }
    }

    /// Converts a color to RGB in `0.0..=1.0`. Missing components read as 0.
    pub fn to_rgb(&self, comps: &[f64]) -> [f64; 3] {
        let c = |i: usize| comps.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0);
        match self {
            ColorSpace::DeviceGray => [c(0); 3],
            ColorSpace::DeviceRGB => [c(0), c(1), c(2)],
            ColorSpace::DeviceCMYK => cmyk_to_rgb(c(0), c(1), c(2), c(3)),
            ColorSpace::Lab { white_point, .. } => lab_to_rgb(
                comps.first().copied().unwrap_or(0.0),
                comps.get(1).copied().unwrap_or(0.0),
                comps.get(2).copied().unwrap_or(0.0),
                white_point,
            ),
            ColorSpace::Indexed { base, hival, lookup } => {
                let index = comps
                    .first()
                    .copied()
                    .unwrap_or(0.0)
                    .round()
                    .clamp(0.0, f64::from(*hival)) as usize;
                let n = base.components();
                let entry: Vec<f64> = (0..n)
                    .map(|k| f64::from(lookup.get(index * n + k).copied().unwrap_or(0)) / 255.0)
                    .collect();
                base.to_rgb(&entry)
            }
            ColorSpace::Spot { components } => {
                let tint = comps
                    .iter()
                    .take(*components)
                    .copied()
                    .fold(0.0f64, f64::max)
                    .clamp(0.0, 1.0);
                [1.0 - tint; 3]
            }
            ColorSpace::Pattern => [0.5; 3],
        }
    }
}

fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> [f64; 3] {
    [
        (1.0 - c) * (1.0 - k),
        (1.0 - m) * (1.0 - k),
        (1.0 - y) * (1.0 - k),
    ]
}

/// L*a*b* to sRGB through XYZ, with the D65 matrix.
fn lab_to_rgb(l: f64, a: f64, b: f64, white: &[f64; 3]) -> [f64; 3] {
    let g = |x: f64| {
        if x >= 6.0 / 29.0 {
            x * x * x
        } else {
            108.0 / 841.0 * (x - 4.0 / 29.0)
        }
    };
    let m = (l + 16.0) / 116.0;
    let x = white[0] * g(m + a / 500.0);
    let y = white[1] * g(m);
    let z = white[2] * g(m - b / 200.0);

    let r = 3.2406 * x - 1.5372 * y - 0.4986 * z;
    let gr = -0.9689 * x + 1.8758 * y + 0.0415 * z;
    let bl = 0.0557 * x - 0.2040 * y + 1.0570 * z;
    let encode = |v: f64| {
        let v = v.clamp(0.0, 1.0);
        if v <= 0.0031308 {
            12.92 * v
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        }
    };
    [encode(r), encode(gr), encode(bl)]
}
