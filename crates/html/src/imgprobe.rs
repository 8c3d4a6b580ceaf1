//! Header-only image probing for `data:` payloads.
//!
//! Reads just enough of PNG/JPEG/GIF/BMP headers to recover dimensions; no
//! pixel data is ever decoded. Anything truncated or unrecognized yields
//! `None`.

const PNG_SIG: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDims {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

fn be_u32(d: &[u8], o: usize) -> u32 {
    u32::from_be_bytes([d[o], d[o + 1], d[o + 2], d[o + 3]])
}

fn be_u16(d: &[u8], o: usize) -> u16 {
    u16::from_be_bytes([d[o], d[o + 1]])
}

fn le_u16(d: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([d[o], d[o + 1]])
}

fn le_u32(d: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([d[o], d[o + 1], d[o + 2], d[o + 3]])
}

// IHDR must be the first chunk: signature, length, "IHDR", then
// width/height as big-endian u32.
fn probe_png(data: &[u8]) -> Option<ImageDims> {
    if data.len() < 24 || data[..8] != PNG_SIG || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = be_u32(data, 16);
    let height = be_u32(data, 20);
    (width > 0 && height > 0).then_some(ImageDims {
        width,
        height,
        format: ImageFormat::Png,
    })
}

fn probe_gif(data: &[u8]) -> Option<ImageDims> {
    if data.len() < 10 || (&data[..6] != b"GIF87a" && &data[..6] != b"GIF89a") {
        return None;
    }
    let width = le_u16(data, 6) as u32;
    let height = le_u16(data, 8) as u32;
    (width > 0 && height > 0).then_some(ImageDims {
        width,
        height,
        format: ImageFormat::Gif,
    })
}

fn probe_bmp(data: &[u8]) -> Option<ImageDims> {
    if data.len() < 26 || &data[..2] != b"BM" {
        return None;
    }
    let width = le_u32(data, 18);
    let height = (le_u32(data, 22) as i32).unsigned_abs();
    (width > 0 && height > 0).then_some(ImageDims {
        width,
        height,
        format: ImageFormat::Bmp,
    })
}

// Walk the marker stream to the first SOFn frame header:
// [marker FF Cx][len u16][precision u8][height u16][width u16].
fn probe_jpeg(data: &[u8]) -> Option<ImageDims> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        match marker {
            // Padding and restart markers carry no length.
            0xFF => {
                i += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                i += 2;
                continue;
            }
            // SOF0..SOF15, excluding DHT (C4), JPG (C8) and DAC (CC).
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                if i + 9 > data.len() {
                    return None;
                }
                let height = be_u16(data, i + 5) as u32;
                let width = be_u16(data, i + 7) as u32;
                return (width > 0 && height > 0).then_some(ImageDims {
                    width,
                    height,
                    format: ImageFormat::Jpeg,
                });
            }
            0xD9 => return None, // EOI before any frame header
            _ => {
                let len = be_u16(data, i + 2) as usize;
                if len < 2 {
                    return None;
                }
                i += 2 + len;
            }
        }
    }
    None
}

/// Probe a decoded image payload for its dimensions.
pub fn probe(data: &[u8]) -> Option<ImageDims> {
    probe_png(data)
        .or_else(|| probe_gif(data))
        .or_else(|| probe_jpeg(data))
        .or_else(|| probe_bmp(data))
}
